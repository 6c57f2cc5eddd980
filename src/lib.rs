//! Backward dynamic dependence extraction and dynamic slicing over bytecode traces
//!
//! A trace records, per thread, the sequence of executed instructions of a [`program`] along
//! with the object identifiers those instructions touched. Walking such a [`trace`] backwards,
//! the [`dependences`] extractor rebuilds the call stack, works out the data and control
//! dependences between instances, and reports them to visitors (possibly fanned out to
//! several of them at once through [`fanout`]). The [`slicer`] is one such visitor.

pub mod dependences;
pub mod fanout;
pub mod program;
mod settings;
pub mod slicer;
pub mod trace;
pub mod util;

pub use settings::Settings;
