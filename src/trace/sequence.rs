/// A recorded sequence of integers or longs
///
/// Traces are only ever consumed backwards, so that is the only way of reading a sequence.
/// Exhausted iterators are cheap to drop.
pub trait TraceSequence<T> {
    /// Number of values in the sequence
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate from the last recorded value to the first one
    fn backward_iterator(&self) -> Box<dyn Iterator<Item = T> + Send + '_>;
}

/// Uncompressed, in-memory sequence
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PlainSequence<T> {
    values: Vec<T>,
}

impl<T> PlainSequence<T> {
    pub fn new() -> PlainSequence<T> {
        PlainSequence { values: vec![] }
    }

    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }
}

impl<T> From<Vec<T>> for PlainSequence<T> {
    fn from(values: Vec<T>) -> PlainSequence<T> {
        PlainSequence { values }
    }
}

impl<T: Copy + Send + Sync> TraceSequence<T> for PlainSequence<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn backward_iterator(&self) -> Box<dyn Iterator<Item = T> + Send + '_> {
        Box::new(self.values.iter().rev().copied())
    }
}
