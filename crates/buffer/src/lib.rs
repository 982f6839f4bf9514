//! In-memory mirrors of host editor buffers.
//!
//! * [`LineStore`]: the ordered lines of one buffer and the delta algorithm
//! * [`Buffer`]: a line store plus its lock, change counter, and project cache lease
//! * [`BufferRegistry`]: live buffers by host buffer number

#![warn(missing_docs)]

mod buffer;
pub mod lines;
mod registry;

pub use buffer::{Buffer, BufferPath, DeltaOutcome};
pub use lines::{DeltaKind, LineStore};
pub use registry::BufferRegistry;

#[cfg(test)]
mod tests;
