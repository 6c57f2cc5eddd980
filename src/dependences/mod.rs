//! Backward extraction of dynamic dependences
//!
//! The [`DependencesExtractor`] walks a thread's instances backwards, keeping a reconstructed
//! [`FrameStack`] in sync and asking a [`Simulator`] what each instance read and wrote. From
//! that it reports data dependences (through the last writer and last readers of every
//! [`StorageLocation`]) and control dependences (through the per method control dependence
//! tables) to the registered [`DependencesVisitor`]s.

mod errors;
mod extractor;
mod frame;
mod index;
mod location;
mod printer;
mod simulator;
mod visitor;

pub use errors::*;
pub use extractor::*;
pub use frame::*;
pub use index::*;
pub use location::*;
pub use printer::*;
pub use simulator::*;
pub use visitor::*;
