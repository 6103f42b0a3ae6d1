//! Thread-safe history window over the most recent values.
//!
//! [`RingBuffer<T>`] is a fixed-capacity circular buffer that overwrites its
//! oldest value once full. It is meant for bounded in-memory histories such as
//! recent sample tracking: producers push values, readers look back from the
//! newest value at any time, and nothing ever waits for data.
//!
//! ```
//! use history_buffer::RingBuffer;
//!
//! let buf = RingBuffer::<f64>::new(3);
//! for v in [1.0, 2.0, 3.0, 4.0] {
//!     buf.push(v);
//! }
//! assert_eq!(buf.to_vec(), vec![2.0, 3.0, 4.0]);
//! assert_eq!(buf.read_from_end(0).unwrap(), 4.0);
//! ```
//!
//! # Background Ingestion
//!
//! A buffer can drain an external source on its own, keeping one value out of
//! every `sample_rate`:
//!
//! ```
//! use history_buffer::RingBuffer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let buf = RingBuffer::<i32>::new(8);
//! let handle = buf.ingest(futures::stream::iter(1..=9), 3);
//! handle.join().await.unwrap();
//!
//! assert!(buf.is_finished());
//! assert_eq!(buf.to_vec(), vec![1, 4, 7]);
//! # }
//! ```
//!
//! # Thread Safety
//!
//! All operations except [`RingBuffer::is_finished`] go through one internal
//! mutex, so every push is atomic and readers always see a whole number of
//! completed pushes. The finished flag is a relaxed atomic and only a hint.
//! `RingBuffer` is `Send + Sync` and `Clone` shares the underlying buffer.

mod error;
mod ingest;
mod ring_buffer;

pub use error::BufferError;
pub use ingest::{BlockingIngestHandle, IngestConfig, IngestHandle, IngestReport};
pub use ring_buffer::RingBuffer;

pub use tokio_util::sync::CancellationToken;
