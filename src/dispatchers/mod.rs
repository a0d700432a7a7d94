//! One-input/many-outputs stages.
//!
//! A dispatch stage reads one input and routes every item either to a set of
//! caller-provided outputs or to a remainder stream it returns. Deliveries to
//! the outputs run as separate tasks, so a slow output holds up neither the
//! other outputs nor the remainder.
//!
//! ```rust
//! use rivulet::prelude::*;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ctx = Context::new();
//! let (mut writable, readable) = rivulet::stream::open(4);
//! for i in 1..=4 {
//!     writable.write(i).await;
//! }
//! writable.close().unwrap();
//!
//! let (evens, even_reader) = rivulet::stream::open(4);
//! let odds = dispatchers::dispatch_if(|x: &i32| x % 2 == 0)
//!     .attach(&ctx)
//!     .dispatch(readable, vec![evens])
//!     .unwrap();
//!
//! assert_eq!(odds.read_all().await, vec![1, 3]);
//! let mut evens = even_reader.read_all().await;
//! evens.sort();
//! assert_eq!(evens, vec![2, 4]);
//! # });
//! ```

mod conditional;

pub use conditional::{dispatch_if, If};
