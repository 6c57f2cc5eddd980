use parking_lot::{Condvar, Mutex};

/// Counting semaphore
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<u32>,
    released: Condvar,
}

impl Semaphore {
    pub fn new(permits: u32) -> Semaphore {
        Semaphore {
            permits: Mutex::new(permits),
            released: Condvar::new(),
        }
    }

    /// Take `count` permits, waiting until enough are available
    pub fn acquire(&self, count: u32) {
        let mut permits = self.permits.lock();
        while *permits < count {
            self.released.wait(&mut permits);
        }
        *permits -= count;
    }

    /// Take `count` permits if they are available right now
    pub fn try_acquire(&self, count: u32) -> bool {
        let mut permits = self.permits.lock();
        if *permits < count {
            return false;
        }
        *permits -= count;
        true
    }

    pub fn release(&self, count: u32) {
        let mut permits = self.permits.lock();
        *permits += count;
        self.released.notify_all();
    }

    pub fn available_permits(&self) -> u32 {
        *self.permits.lock()
    }
}
