//! Bounded streams connecting pipeline stages.
//!
//! [`open`] returns a producer handle ([`Writable`]) and a consumer handle
//! ([`Readable`]) over a bounded queue. Writes wait while the queue is full,
//! which is how backpressure travels upstream. A capacity of zero is a
//! synchronous handoff: a write completes only once the reader took the item.
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let (mut writable, readable) = rivulet::stream::open(2);
//! writable.write(1).await;
//! writable.write(2).await;
//! writable.close().unwrap();
//!
//! assert_eq!(readable.read_all().await, vec![1, 2]);
//! # });
//! ```

mod emitter;

pub use emitter::{Emitter, Flow, Interrupt};

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

struct Envelope<T> {
    item: T,
    // Present on zero-capacity streams, fired once the reader takes the item.
    ack: Option<oneshot::Sender<()>>,
}

impl<T> Envelope<T> {
    fn open(self) -> T {
        if let Some(ack) = self.ack {
            let _ = ack.send(());
        }
        self.item
    }
}

/// Open a stream with the given capacity
pub fn open<T: Send + 'static>(capacity: usize) -> (Writable<T>, Readable<T>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        Writable {
            sender: Some(sender),
            capacity,
        },
        Readable { receiver, capacity },
    )
}

/// Producer handle of a stream.
///
/// Dropping the handle ends the stream just like [`Writable::close`].
pub struct Writable<T> {
    sender: Option<mpsc::Sender<Envelope<T>>>,
    capacity: usize,
}

impl<T: Send + 'static> Writable<T> {
    /// Write an item, waiting while the stream is full.
    ///
    /// Items written after the reader went away, or after close, are dropped.
    pub async fn write(&self, item: T) {
        let Some(sender) = &self.sender else {
            tracing::warn!("write on a closed stream, item dropped");
            return;
        };

        if self.capacity == 0 {
            let (ack, acked) = oneshot::channel();
            let envelope = Envelope {
                item,
                ack: Some(ack),
            };
            if sender.send(envelope).await.is_ok() {
                let _ = acked.await;
            }
        } else {
            let _ = sender.send(Envelope { item, ack: None }).await;
        }
    }

    /// Signal end-of-data. Closing twice is an error.
    pub fn close(&mut self) -> Result<()> {
        match self.sender.take() {
            Some(_) => Ok(()),
            None => {
                tracing::warn!("stream closed twice");
                Err(Error::StreamClosed)
            }
        }
    }

    /// Whether this handle has been closed
    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    /// Whether the reader went away, so writes can no longer be delivered
    pub fn is_disconnected(&self) -> bool {
        self.sender.as_ref().is_some_and(|sender| sender.is_closed())
    }

    /// Capacity the stream was opened with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Another handle onto the same queue, for fan-out deliveries owned by
    /// the worker holding `self`. The stream ends once every handle is gone.
    pub(crate) fn share(&self) -> Option<Writable<T>> {
        self.sender.as_ref().map(|sender| Writable {
            sender: Some(sender.clone()),
            capacity: self.capacity,
        })
    }
}

/// Consumer handle of a stream
pub struct Readable<T> {
    receiver: mpsc::Receiver<Envelope<T>>,
    capacity: usize,
}

impl<T: Send + 'static> Readable<T> {
    /// Read the next item, or `None` once the stream is closed and drained
    pub async fn read(&mut self) -> Option<T> {
        self.receiver.recv().await.map(Envelope::open)
    }

    /// Read every remaining item until the stream ends
    pub async fn read_all(mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.read().await {
            items.push(item);
        }
        items
    }

    /// Capacity the stream was opened with
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Send + 'static> Stream for Readable<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver
            .poll_recv(cx)
            .map(|envelope| envelope.map(Envelope::open))
    }
}

/// A closed stream holding `items`
#[cfg(test)]
pub(crate) async fn filled<T: Send + 'static>(items: Vec<T>) -> Readable<T> {
    let (mut writable, readable) = open(items.len().max(1));
    for item in items {
        writable.write(item).await;
    }
    let _ = writable.close();
    readable
}
