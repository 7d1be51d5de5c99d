//! Lock-free keyboard/timer peripheral models and the fast tick driver.
//!
//! The tick driver runs on its own thread at a sub-frame period and never
//! takes the control exclusion. Every field it touches is an independent
//! atomic holding a latch or a counter, so a concurrent reader sees either
//! the old or the new value, never a torn one.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use log::{info, trace};

use crate::keyboard::{KeyGrid, NO_INPUTS_ACTIVE};
use crate::pacing::Pacer;
use crate::state::ControlContext;

/// Keyboard scan port: driven output lines in, sensed input lines out.
#[derive(Debug)]
pub struct KeyboardPort {
    output_mask: AtomicU8,
    input_port: AtomicU16,
    pending: AtomicBool,
}

impl Default for KeyboardPort {
    fn default() -> Self {
        Self {
            output_mask: AtomicU8::new(0),
            input_port: AtomicU16::new(NO_INPUTS_ACTIVE),
            pending: AtomicBool::new(false),
        }
    }
}

impl KeyboardPort {
    /// Output lines the core currently drives (`KO`).
    #[must_use]
    pub fn output_mask(&self) -> u8 {
        self.output_mask.load(Ordering::Acquire)
    }

    /// Called by the engine when the core writes `KO`.
    pub fn set_output_mask(&self, mask: u8) {
        self.output_mask.store(mask, Ordering::Release);
    }

    /// Latched active-low input port value (`KI`).
    #[must_use]
    pub fn input_port(&self) -> u16 {
        self.input_port.load(Ordering::Acquire)
    }

    /// Re-scans the matrix and latches the result.
    ///
    /// An input line going active raises the keyboard interrupt request.
    /// Returns whether a request was raised by this scan.
    pub fn refresh(&self, keys: &KeyGrid) -> bool {
        let value = keys.resolve_inputs(self.output_mask());
        let previous = self.input_port.swap(value, Ordering::AcqRel);
        // Active-low: a 1 -> 0 change is a newly closed line.
        let fell = previous & !value & 0x00FF != 0;
        if fell {
            self.pending.store(true, Ordering::Release);
            trace!("keyboard input lines {previous:#06X} -> {value:#06X}");
        }
        fell
    }

    /// Whether a keyboard interrupt request is latched.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clears the keyboard interrupt request.
    pub fn acknowledge(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

/// Free-running timer counting peripheral ticks up to a period.
#[derive(Debug, Default)]
pub struct TimerPort {
    counter: AtomicU32,
    period: AtomicU32,
    pending: AtomicBool,
}

impl TimerPort {
    /// Sets the match period; `0` stops the timer.
    pub fn configure(&self, period: u32) {
        self.period.store(period, Ordering::Release);
        self.counter.store(0, Ordering::Release);
    }

    /// Current match period.
    #[must_use]
    pub fn period(&self) -> u32 {
        self.period.load(Ordering::Acquire)
    }

    /// Current count.
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// Advances one count; on reaching the period, wraps and raises the
    /// timer interrupt request. Returns whether the period was reached.
    pub fn tick(&self) -> bool {
        let period = self.period();
        if period == 0 {
            return false;
        }
        let previous = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(if count + 1 >= period { 0 } else { count + 1 })
            })
            .unwrap_or_else(|count| count);
        let matched = previous + 1 >= period;
        if matched {
            self.pending.store(true, Ordering::Release);
        }
        matched
    }

    /// Whether a timer interrupt request is latched.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clears the timer interrupt request.
    pub fn acknowledge(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

/// Peripheral state shared between the tick driver and the engine.
#[derive(Debug, Default)]
pub struct PeripheralPorts {
    /// Keyboard scan port.
    pub keyboard: KeyboardPort,
    /// Timer.
    pub timer: TimerPort,
}

/// Subsamples peripheral ticks for the timer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerDivider {
    count: u32,
    divisor: u32,
}

impl TimerDivider {
    /// Divider firing every `divisor` ticks; `0` is treated as `1`.
    #[must_use]
    pub const fn new(divisor: u32) -> Self {
        Self {
            count: 0,
            divisor: if divisor == 0 { 1 } else { divisor },
        }
    }

    /// Counts one tick; returns `true` and wraps to zero on reaching the divisor.
    pub const fn advance(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.divisor {
            self.count = 0;
            true
        } else {
            false
        }
    }

    /// Ticks counted since the last wrap.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }
}

/// Whether the driver should be rescheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Run again after one period.
    Continue,
    /// Termination observed; do not reschedule.
    Cancelled,
}

/// Fast periodic loop keeping keyboard and timer models current.
#[derive(Debug)]
pub struct PeripheralDriver<E> {
    ctx: Arc<ControlContext<E>>,
    divider: TimerDivider,
}

impl<E> PeripheralDriver<E> {
    /// Driver using the configured timer divider.
    #[must_use]
    pub fn new(ctx: Arc<ControlContext<E>>) -> Self {
        let divider = TimerDivider::new(ctx.config().timer_divider);
        Self { ctx, divider }
    }

    /// One tick: keyboard scan always, timer every `divisor` ticks.
    pub fn tick(&mut self) -> TickOutcome {
        if self.ctx.is_terminating() {
            info!("peripheral tick driver cancelling schedule");
            return TickOutcome::Cancelled;
        }
        let ports = self.ctx.ports();
        ports.keyboard.refresh(self.ctx.keys());
        if self.divider.advance() {
            ports.timer.tick();
        }
        TickOutcome::Continue
    }

    /// Ticks every `peripheral_period` until termination; returns the tick count.
    pub fn run(mut self, pacer: &dyn Pacer) -> u64 {
        let period = self.ctx.config().peripheral_period;
        let mut ticks = 0;
        while self.tick() == TickOutcome::Continue {
            ticks += 1;
            pacer.pause(period);
        }
        ticks
    }
}
