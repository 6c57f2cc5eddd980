//! Fanning the events of one traversal out to several visitors
//!
//! During a parallel run, every registered visitor is replaced by a [`Pipeline`] that records
//! events into [`EventStamp`]s. Stamps are queued on the visitor's [`OutstandingWork`] and
//! replayed on a worker pool, so that visitors progress independently of each other (each one
//! still sees its events in order, from one thread at a time).

mod pipeline;
mod semaphore;
mod stamp;
mod work;

pub use pipeline::*;
pub use semaphore::*;
pub use stamp::*;
pub use work::*;
