use super::{EventStamp, Semaphore};
use crate::dependences::DependencesVisitor;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Stamps waiting to be replayed against one visitor
///
/// Stamps are replayed in the order they were added, and by one thread at a time (whichever
/// manages to claim the work). The number of buffered events is bounded: every queued stamp
/// holds as many permits as it has events (capped at the budget), and producers that cannot get
/// permits either help draining the queue or wait for the current executor to do so.
pub struct OutstandingWork<'v> {
    queue: Mutex<VecDeque<(EventStamp, u32)>>,

    /// Permits held by the stamps in `queue`
    queued: AtomicU32,

    semaphore: Semaphore,
    executing: AtomicBool,
    visitor: Mutex<&'v mut (dyn DependencesVisitor + Send + 'v)>,
    budget: u32,
}

impl<'v> OutstandingWork<'v> {
    pub fn new(
        visitor: &'v mut (dyn DependencesVisitor + Send + 'v),
        budget: u32,
    ) -> OutstandingWork<'v> {
        let budget = budget.max(1);
        OutstandingWork {
            queue: Mutex::new(VecDeque::new()),
            queued: AtomicU32::new(0),
            semaphore: Semaphore::new(budget),
            executing: AtomicBool::new(false),
            visitor: Mutex::new(visitor),
            budget,
        }
    }

    /// Queue a stamp, blocking (or draining) while too many events are buffered
    pub fn add_work(&self, stamp: EventStamp) {
        if stamp.is_empty() {
            return;
        }
        let permits = (stamp.len().min(self.budget as usize)) as u32;
        loop {
            if self.semaphore.try_acquire(permits) {
                break;
            }
            if self.try_claim() {
                self.drain();
                self.executing.store(false, Ordering::SeqCst);
                continue;
            }
            self.semaphore.acquire(permits);
            break;
        }
        self.queue.lock().push_back((stamp, permits));
        self.queued.fetch_add(permits, Ordering::SeqCst);
    }

    /// Replay queued stamps until the queue is empty, unless someone else already is
    pub fn run(&self) {
        loop {
            if !self.try_claim() {
                return;
            }
            self.drain();
            self.executing.store(false, Ordering::SeqCst);

            // A stamp may have been queued after the last pop but before the release
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }

    /// Wait until every queued stamp was replayed
    ///
    /// Whatever is still queued is replayed on the calling thread, unless another thread is
    /// already at it, in which case this waits for the whole budget to be released.
    pub fn finish(&self) {
        self.run();
        self.semaphore.acquire(self.budget);
        self.semaphore.release(self.budget);
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    pub fn available_permits(&self) -> u32 {
        self.semaphore.available_permits()
    }

    pub fn queued_permits(&self) -> u32 {
        self.queued.load(Ordering::SeqCst)
    }

    fn try_claim(&self) -> bool {
        self.executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn drain(&self) {
        loop {
            let next = self.queue.lock().pop_front();
            let (stamp, permits) = match next {
                Some(next) => next,
                None => return,
            };
            {
                let mut visitor = self.visitor.lock();
                stamp.replay(&mut **visitor);
            }
            self.queued.fetch_sub(permits, Ordering::SeqCst);
            self.semaphore.release(permits);
        }
    }
}
