mod cancel;

pub use cancel::*;
