use std::cell::Cell;

/// Byte count of a budget pool. Never goes negative.
#[derive(Debug)]
pub struct Counter(Cell<u64>);

impl Counter {
    pub fn new(bytes: u64) -> Counter {
        Counter(Cell::new(bytes))
    }

    /// Takes `bytes` out of the counter if it holds that many. Leaves the counter
    /// untouched and returns `false` otherwise.
    pub fn withdraw(&self, bytes: u64) -> bool {
        match self.0.get().checked_sub(bytes) {
            Some(rest) => {
                self.0.set(rest);
                true
            }
            None => false,
        }
    }

    /// Puts `bytes` back, saturating at `u64::MAX`.
    pub fn deposit(&self, bytes: u64) {
        self.0.set(self.0.get().saturating_add(bytes));
    }

    pub fn read(&self) -> u64 {
        self.0.get()
    }
}
