//! Dynamic slicing on top of the dependence extractor
//!
//! A [`SlicingCriterion`] names the point of interest. The [`DynamicSlicer`] visitor matches it
//! against the instances seen by the extractor and grows the slice backwards along control and
//! read-after-write dependences.

mod criterion;
mod dynamic;
mod errors;

pub use criterion::*;
pub use dynamic::*;
pub use errors::*;
