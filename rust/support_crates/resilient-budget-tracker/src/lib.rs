//! Byte budgets for single-threaded containers.
//!
//! A container charges every storage block it keeps alive against a `Budget` and
//! holds the returned `Allocation` next to the block. Dropping the block returns
//! the bytes. Once the budget is spent `allocate` fails, so running out of memory
//! can be provoked and observed deterministically.

use std::rc::Rc;

use counter::Counter;

pub mod counter;

/// A shared pool of bytes. Clones draw from the same pool.
#[derive(Clone)]
pub struct Budget(Rc<Pool>);

impl Budget {
    pub fn new(bytes: u64) -> Budget {
        Budget(Rc::new(Pool {
            lender: None,
            available: Counter::new(bytes),
            borrowed: 0,
        }))
    }

    /// A budget large enough to never refuse a request.
    pub fn unlimited() -> Budget {
        Budget::new(u64::MAX)
    }

    /// Bytes that can still be allocated.
    pub fn remaining(&self) -> u64 {
        self.0.available.read()
    }

    /// Charges `bytes` against the budget. The bytes come back when the returned
    /// `Allocation` is dropped.
    pub fn allocate(&self, bytes: u64) -> Result<Allocation, BudgetExhausted> {
        if !self.0.available.withdraw(bytes) {
            return Err(self.exhausted(bytes));
        }
        Ok(Allocation {
            pool: Rc::clone(&self.0),
            bytes,
        })
    }

    /// Moves `bytes` out of this budget into a new, independent one.
    ///
    /// The bytes return to this budget when the split-off budget and every
    /// allocation charged against it are gone.
    pub fn split_off(&self, bytes: u64) -> Result<Budget, BudgetExhausted> {
        if !self.0.available.withdraw(bytes) {
            return Err(self.exhausted(bytes));
        }
        Ok(Budget(Rc::new(Pool {
            lender: Some(Rc::clone(&self.0)),
            available: Counter::new(bytes),
            borrowed: bytes,
        })))
    }

    fn exhausted(&self, requested: u64) -> BudgetExhausted {
        BudgetExhausted {
            requested,
            available: self.remaining(),
        }
    }
}

impl std::fmt::Debug for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Budget")
            .field("remaining", &self.remaining())
            .field("split_off", &self.0.lender.is_some())
            .finish()
    }
}

/// Bytes charged against a `Budget`, returned on drop.
pub struct Allocation {
    pool: Rc<Pool>,
    bytes: u64,
}

impl Allocation {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.pool.available.deposit(self.bytes);
    }
}

impl std::fmt::Debug for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Allocation({} bytes)", self.bytes)
    }
}

/// A budget could not cover a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExhausted {
    pub requested: u64,
    pub available: u64,
}

impl std::fmt::Display for BudgetExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "budget exhausted: requested {} bytes, {} available",
            self.requested, self.available
        )
    }
}

impl std::error::Error for BudgetExhausted {}

struct Pool {
    /// Pool this one was split off from.
    lender: Option<Rc<Pool>>,
    available: Counter,
    /// Bytes taken from `lender` at split time.
    borrowed: u64,
}

impl Drop for Pool {
    fn drop(&mut self) {
        if let Some(lender) = self.lender.take() {
            lender.available.deposit(self.borrowed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOT: u64 = 16;

    #[test]
    fn test_blocks_return_bytes_on_drop() {
        let budget = Budget::new(64 * SLOT);
        let dense = budget.allocate(40 * SLOT).unwrap();
        let page = budget.allocate(24 * SLOT).unwrap();
        assert_eq!(dense.bytes(), 40 * SLOT);
        assert_eq!(budget.remaining(), 0);
        drop(page);
        assert_eq!(budget.remaining(), 24 * SLOT);
        drop(dense);
        assert_eq!(budget.remaining(), 64 * SLOT);
    }

    #[test]
    fn test_refusal_reports_shortfall() {
        let budget = Budget::new(10 * SLOT);
        let _held = budget.allocate(4 * SLOT).unwrap();
        let err = budget.allocate(8 * SLOT).unwrap_err();
        assert_eq!(
            err,
            BudgetExhausted {
                requested: 8 * SLOT,
                available: 6 * SLOT
            }
        );
        assert_eq!(err.to_string(), "budget exhausted: requested 128 bytes, 96 available");
        assert_eq!(budget.remaining(), 6 * SLOT);
    }

    #[test]
    fn test_clones_draw_from_one_pool() {
        let budget = Budget::new(100);
        let config_copy = budget.clone();
        let _held = config_copy.allocate(70).unwrap();
        assert_eq!(budget.remaining(), 30);
        assert!(budget.allocate(31).is_err());
    }

    #[test]
    fn test_unlimited_survives_huge_requests() {
        let budget = Budget::unlimited();
        let a = budget.allocate(1 << 40).unwrap();
        let b = budget.allocate(u64::MAX - (1 << 40)).unwrap();
        assert!(budget.allocate(1).is_err());
        drop(a);
        drop(b);
        assert_eq!(budget.remaining(), u64::MAX);
    }

    #[test]
    fn test_split_off_is_isolated_from_lender() {
        let budget = Budget::new(100);
        let child = budget.split_off(40).unwrap();
        assert_eq!(budget.remaining(), 60);
        let held = child.allocate(40).unwrap();
        assert!(child.allocate(1).is_err());
        let _other = budget.allocate(60).unwrap();
        assert_eq!(child.remaining(), 0);
        assert!(budget.split_off(1).is_err());
        drop(held);
        assert_eq!(child.remaining(), 40);
    }

    #[test]
    fn test_split_off_returns_after_last_allocation() {
        let budget = Budget::new(100);
        let child = budget.split_off(60).unwrap();
        let held = child.allocate(25).unwrap();
        drop(child);
        assert_eq!(budget.remaining(), 40);
        drop(held);
        assert_eq!(budget.remaining(), 100);
    }
}
