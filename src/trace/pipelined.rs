use super::{BackwardInstanceIterator, Error, Instance};
use crate::program::MethodId;
use crate::util::CancellationToken;
use crate::Settings;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::Scope;

/// Instances are moved across the channel in chunks of this size
const CHUNK: usize = 1 << 10;

/// Backward iterator whose instances are produced on a background thread
///
/// The background thread pulls instances out of the wrapped iterator and pushes them into a
/// bounded buffer, so that decoding the trace overlaps with whatever the consumer does. The
/// producer blocks when the buffer is full and the consumer blocks when it is empty.
///
/// The consumer sees the end of the stream when the producer is done, either because the wrapped
/// iterator is exhausted, because it failed (the error is delivered first), or because the
/// cancellation token was signalled.
pub struct PipelinedIterator {
    receiver: Receiver<Vec<Result<Instance, Error>>>,
    current: std::vec::IntoIter<Result<Instance, Error>>,
    initial_stack: Vec<MethodId>,

    /// `f64` percentage, as bits
    progress: Arc<AtomicU64>,
}

impl PipelinedIterator {
    /// Start reading `inner` on a thread of `scope`
    pub fn spawn<'scope, 'env, I>(
        scope: &'scope Scope<'scope, 'env>,
        mut inner: I,
        settings: &Settings,
    ) -> PipelinedIterator
    where
        I: BackwardInstanceIterator + Send + 'scope,
    {
        let chunks = (settings.pipeline_capacity / CHUNK).max(1);
        let (sender, receiver) = sync_channel(chunks);
        let initial_stack = inner.initial_stack_methods().to_vec();
        let progress = Arc::new(AtomicU64::new(0f64.to_bits()));

        let producer_progress = progress.clone();
        let cancellation: CancellationToken = settings.cancellation.clone();
        let check_interval = settings.cancellation_check_interval.max(1);
        scope.spawn(move || {
            let mut produced: u64 = 0;
            let mut chunk = Vec::with_capacity(CHUNK);
            while let Some(next) = inner.next() {
                let failed = next.is_err();
                chunk.push(next);
                produced += 1;

                if produced % check_interval == 0 && cancellation.is_cancelled() {
                    log::info!("Background trace reader cancelled after {} instances", produced);
                    return;
                }
                if chunk.len() == CHUNK || failed {
                    producer_progress.store(inner.percentage_done().to_bits(), Ordering::Relaxed);
                    let full = std::mem::replace(&mut chunk, Vec::with_capacity(CHUNK));
                    if sender.send(full).is_err() || failed {
                        // Consumer hung up, or the trace is corrupted
                        return;
                    }
                }
            }
            if !chunk.is_empty() {
                let _ = sender.send(chunk);
            }
            producer_progress.store(100f64.to_bits(), Ordering::Relaxed);
            log::debug!("Background trace reader produced {} instances", produced);
        });

        PipelinedIterator {
            receiver,
            current: vec![].into_iter(),
            initial_stack,
            progress,
        }
    }
}

impl Iterator for PipelinedIterator {
    type Item = Result<Instance, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(next) = self.current.next() {
                return Some(next);
            }
            self.current = self.receiver.recv().ok()?.into_iter();
        }
    }
}

impl BackwardInstanceIterator for PipelinedIterator {
    fn initial_stack_methods(&self) -> &[MethodId] {
        &self.initial_stack
    }

    fn percentage_done(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::program::{Opcode, ProgramBuilder};
    use crate::trace::ThreadTraceBuilder;

    #[test]
    fn same_instances_as_direct_iteration() {
        let mut builder = ProgramBuilder::new();
        let mut method = builder.method("Spin", "run", 0, false, true);
        let nop = method.push(Opcode::Nop);
        let id = method.finish().unwrap();
        let program = builder.finish();

        let mut trace = ThreadTraceBuilder::new(0, "spin");
        trace.with_initial_stack(vec![id]);
        for _ in 0..5000 {
            trace.execute(nop);
        }
        let trace = trace.finish();

        let direct: Vec<Instance> = trace
            .backward_iterator(&program)
            .collect::<Result<_, _>>()
            .unwrap();

        let mut settings = Settings::new();
        settings.pipeline_capacity = 2 * CHUNK;
        let pipelined: Vec<Instance> = std::thread::scope(|scope| {
            let iter = PipelinedIterator::spawn(scope, trace.backward_iterator(&program), &settings);
            assert_eq!(iter.initial_stack_methods(), &[id]);
            iter.collect::<Result<_, _>>().unwrap()
        });

        assert_eq!(direct, pipelined);
    }

    #[test]
    fn cancellation_ends_the_stream() {
        let mut builder = ProgramBuilder::new();
        let mut method = builder.method("Spin", "run", 0, false, true);
        let nop = method.push(Opcode::Nop);
        let id = method.finish().unwrap();
        let program = builder.finish();

        let mut trace = ThreadTraceBuilder::new(0, "spin");
        trace.with_initial_stack(vec![id]);
        for _ in 0..10_000 {
            trace.execute(nop);
        }
        let trace = trace.finish();

        let mut settings = Settings::new();
        settings.cancellation_check_interval = 16;
        settings.cancellation.cancel();
        let seen = std::thread::scope(|scope| {
            PipelinedIterator::spawn(scope, trace.backward_iterator(&program), &settings).count()
        });
        assert!(seen < 10_000);
    }
}
