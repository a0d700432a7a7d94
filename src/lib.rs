//! # Concurrent pipelines over bounded streams
//!
//! This crate composes data-processing pipelines out of independent stages
//! connected by bounded streams. Every stage runs its own tokio task and every
//! stage hangs off one shared context tree, so a pipeline can be cancelled,
//! failed, or drained as a whole.
//!
//! ## Core Concepts
//!
//! - **Context**: hierarchical cancellation plus shared configuration
//! - **Stream**: bounded conduit between two stages, the source of backpressure
//! - **Transform**: one input, one output, driven by a [`Transformer`](transformers::Transformer)
//! - **Combine**: many inputs merged into one output (FIFO, zip)
//! - **Dispatch**: one input fanned out to many outputs by a predicate
//!
//! ## Example
//!
//! ```rust
//! use rivulet::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = Context::new();
//!
//!     let (mut writable, readable) = rivulet::stream::open(10);
//!     tokio::spawn(async move {
//!         for i in 1..=10 {
//!             writable.write(i).await;
//!         }
//!         let _ = writable.close();
//!     });
//!
//!     let evens = transformers::filter(|x: &i32| x % 2 == 0)
//!         .attach(&ctx)
//!         .transform(readable)?;
//!     let squares = transformers::map(|x: i32| x * x)
//!         .attach(&ctx)
//!         .transform(evens)?;
//!
//!     assert_eq!(squares.read_all().await, vec![4, 16, 36, 64, 100]);
//!     ctx.shutdown().await
//! }
//! ```

pub mod combiners;
pub mod context;
pub mod dispatchers;
pub mod error;
pub mod stream;
pub mod transformers;

mod stage;

// Re-export commonly used items
pub mod prelude {
    pub use crate::context::{Config, Context};
    pub use crate::error::{Error, Result};
    pub use crate::stream::{Emitter, Flow, Interrupt, Readable, Writable};
    pub use crate::transformers::{Batch, Transform, Transformer};
    pub use crate::{combiners, dispatchers, transformers};
}

// Re-export main error type
pub use error::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
