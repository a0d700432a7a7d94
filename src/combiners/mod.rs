//! Many-inputs/one-output stages.
//!
//! - [`fifo`] interleaves every input into one output as items arrive.
//! - [`zip`] reads one item per input per round and emits each full round.
//! - [`zip_by`] reduces each full round with a binary function.
//!
//! Combined outputs are opened with the context's configured buffer size.

mod fifo;
mod zip;

pub use fifo::{fifo, Fifo};
pub use zip::{zip, zip_by, Zip, ZipBy};
