//! Frame-paced execution of the core.
//!
//! Each frame spends at most the current cycle budget on engine steps, then
//! offers at most one pending interrupt to the engine, then sleeps a fixed
//! frame period. Pacing is open-loop: the sleep does not shrink when steps
//! were slow.

use std::sync::Arc;

use log::{debug, error, info, trace};

use crate::engine::{CoreEngine, InterruptSource, Trap};
use crate::pacing::Pacer;
use crate::state::{ControlContext, CoreGuard, ExecutionMode};

/// Faulting location of a trapped step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapReport {
    /// Trap kind.
    pub trap: Trap,
    /// Code segment after the faulting fetch.
    pub csr: u8,
    /// Program counter after the faulting fetch.
    pub pc: u16,
    /// Code word at `CSR:PC-2`, the instruction that failed to decode.
    pub code_word: u16,
}

/// What one frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Budget sampled at the start of the frame.
    pub budget: u32,
    /// Cycles consumed by steps.
    pub cycles: u64,
    /// Steps executed.
    pub steps: u32,
    /// Trap that ended the frame, if any.
    pub trap: Option<TrapReport>,
    /// Interrupt dispatched after the inner loop, if any.
    pub interrupt: Option<InterruptSource>,
    /// Standby polls spent idling instead of stepping.
    pub idle_polls: u32,
}

impl FrameReport {
    const fn empty(budget: u32) -> Self {
        Self {
            budget,
            cycles: 0,
            steps: 0,
            trap: None,
            interrupt: None,
            idle_polls: 0,
        }
    }
}

/// Drives the engine one frame at a time until termination.
#[derive(Debug)]
pub struct FrameScheduler<E, P> {
    ctx: Arc<ControlContext<E>>,
    pacer: P,
}

impl<E: CoreEngine, P: Pacer> FrameScheduler<E, P> {
    /// Scheduler over `ctx`, sleeping through `pacer`.
    #[must_use]
    pub const fn new(ctx: Arc<ControlContext<E>>, pacer: P) -> Self {
        Self { ctx, pacer }
    }

    /// Shared context.
    #[must_use]
    pub const fn context(&self) -> &Arc<ControlContext<E>> {
        &self.ctx
    }

    /// Consumes the scheduler and returns its pacer.
    #[must_use]
    pub fn into_pacer(self) -> P {
        self.pacer
    }

    /// Runs frames until termination is observed; returns the frame count.
    ///
    /// Termination is read without the lock between frames, so shutdown may
    /// lag the request by one frame.
    pub fn run(&self) -> u64 {
        info!("scheduler started");
        let mut frames = 0;
        while !self.ctx.is_terminating() {
            let report = self.run_frame();
            trace!(
                "frame {frames}: {} cycles in {} steps of budget {}",
                report.cycles,
                report.steps,
                report.budget
            );
            frames += 1;
        }
        info!("scheduler exiting after {frames} frames");
        frames
    }

    /// Runs one frame, including its closing pacing delay.
    pub fn run_frame(&self) -> FrameReport {
        let config = self.ctx.config();
        let budget = self.ctx.budget().current();
        let idle_limit = config.idle_polls_per_frame();
        let mut report = FrameReport::empty(budget);

        while report.cycles < u64::from(budget) {
            let mut core = self.ctx.lock();
            let mode = core.mode();
            if !mode.is_stepping() {
                break;
            }
            if core.engine().is_standby() {
                // A step request spent on a sleeping core still ends in Waiting.
                let stepped = mode == ExecutionMode::SingleStep;
                if stepped {
                    let _ = core.transition(ExecutionMode::Waiting);
                }
                drop(core);
                report.idle_polls += 1;
                if stepped || report.idle_polls >= idle_limit {
                    break;
                }
                self.pacer.pause(config.idle_delay);
                continue;
            }

            let outcome = core.engine_mut().step();
            report.steps += 1;
            // A zero-cycle step still counts, so the frame always ends.
            report.cycles += u64::from(outcome.cycles.max(1));

            if let Some(trap) = outcome.trap {
                report.trap = Some(Self::halt_on_trap(&mut core, trap));
                break;
            }
            if mode == ExecutionMode::SingleStep {
                let _ = core.transition(ExecutionMode::Waiting);
                break;
            }
        }

        {
            let mut core = self.ctx.lock();
            match core.mode() {
                ExecutionMode::Running => report.interrupt = self.resolve_interrupt(&mut core),
                ExecutionMode::OneFrame => {
                    let _ = core.transition(ExecutionMode::Waiting);
                }
                _ => {}
            }
        }

        self.pacer.pause(config.frame_period);
        report
    }

    fn halt_on_trap(core: &mut CoreGuard<'_, E>, trap: Trap) -> TrapReport {
        let regs = core.engine().registers();
        let (csr, pc) = (regs.csr, regs.pc);
        let code_word = core.engine().read_code(csr, pc.wrapping_sub(2));
        error!("illegal instruction {code_word:04X} at {csr:01X}:{pc:04X}");
        // Every stepping mode may move to Waiting.
        let _ = core.transition(ExecutionMode::Waiting);
        TrapReport {
            trap,
            csr,
            pc,
            code_word,
        }
    }

    fn resolve_interrupt(&self, core: &mut CoreGuard<'_, E>) -> Option<InterruptSource> {
        let engine = core.engine_mut();
        let keyboard = engine.is_keyboard_interrupt_pending();
        let timer = engine.is_timer_interrupt_pending();
        for source in self.ctx.config().interrupt_priority.order() {
            let pending = match source {
                InterruptSource::Keyboard => keyboard,
                InterruptSource::Timer => timer,
            };
            if pending && engine.resolve_interrupt(source) {
                engine.acknowledge_interrupt(source);
                debug!("dispatched {source:?} interrupt");
                return Some(source);
            }
        }
        None
    }
}
