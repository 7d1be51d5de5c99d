//! Per-frame cycle budget with the operator speed curve.

use std::sync::atomic::{AtomicU32, Ordering};

/// Frames per emulated second, for cycles-per-second reporting.
pub const FRAMES_PER_SECOND: u32 = 60;

/// Steps smaller than this move the budget by one cycle instead of 1/8.
const FINE_STEP_THRESHOLD: u32 = 8;

/// Result of a speed adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetChange {
    /// Budget after the adjustment.
    pub cycles: u32,
    /// Adjustment was clamped at the minimum or maximum.
    pub clamped: bool,
}

impl BudgetChange {
    /// Emulated clock rate implied by the new budget.
    #[must_use]
    pub const fn cycles_per_second(&self) -> u64 {
        self.cycles as u64 * FRAMES_PER_SECOND as u64
    }
}

/// Cycles the scheduler may spend per frame, always within `1..=max`.
///
/// The scheduler samples the budget once at the start of a frame, so
/// adjustments never alter a frame already in progress.
#[derive(Debug)]
pub struct CycleBudget {
    current: AtomicU32,
    nominal: u32,
    max: u32,
}

impl CycleBudget {
    /// Budget starting at `nominal`, clamped into `1..=max`.
    #[must_use]
    pub fn new(nominal: u32, max: u32) -> Self {
        let max = max.max(1);
        let nominal = nominal.clamp(1, max);
        Self {
            current: AtomicU32::new(nominal),
            nominal,
            max,
        }
    }

    /// Current budget.
    #[must_use]
    pub fn current(&self) -> u32 {
        self.current.load(Ordering::Acquire)
    }

    /// Nominal budget restored by [`CycleBudget::reset`].
    #[must_use]
    pub const fn nominal(&self) -> u32 {
        self.nominal
    }

    /// Upper bound.
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Sets an explicit budget, clamped into range.
    pub fn set(&self, cycles: u32) -> BudgetChange {
        self.update(|_| cycles)
    }

    /// Lowers the budget by 1/8 (or by one cycle when small); floor 1.
    pub fn slow_down(&self) -> BudgetChange {
        self.update(|cycles| {
            let step = cycles >> 3;
            if step > FINE_STEP_THRESHOLD {
                cycles - step
            } else {
                cycles.saturating_sub(1)
            }
        })
    }

    /// Raises the budget by 1/8 (or by one cycle when small); capped at max.
    pub fn speed_up(&self) -> BudgetChange {
        self.update(|cycles| {
            let step = cycles >> 3;
            if step > FINE_STEP_THRESHOLD {
                cycles.saturating_add(step)
            } else {
                cycles.saturating_add(1)
            }
        })
    }

    /// Restores the nominal budget.
    pub fn reset(&self) -> BudgetChange {
        self.set(self.nominal)
    }

    fn update(&self, adjust: impl Fn(u32) -> u32) -> BudgetChange {
        let mut clamped = false;
        let previous = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cycles| {
                let wanted = adjust(cycles);
                let next = wanted.clamp(1, self.max);
                clamped = next != wanted;
                Some(next)
            })
            .unwrap_or_else(|cycles| cycles);
        let cycles = adjust(previous).clamp(1, self.max);
        BudgetChange { cycles, clamped }
    }
}
