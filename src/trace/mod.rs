//! Dynamic side of the analysis: what actually ran
//!
//! A recorded thread is two flat sequences: the indices of the executed instructions, and the
//! object identifiers/array indices that some of those instructions touched. Everything else
//! (stack depths, occurrence numbers, payloads) is reconstructed while reading the sequences
//! backwards, which is the only direction the analyses need.

pub mod binary_format;
mod errors;
mod file;
mod instance;
mod pipelined;
mod sequence;
mod thread;

pub use errors::*;
pub use file::*;
pub use instance::*;
pub use pipelined::*;
pub use sequence::*;
pub use thread::*;
