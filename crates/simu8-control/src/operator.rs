//! Named operator commands and their effect on the shared context.

use log::{info, warn};

use crate::budget::BudgetChange;
use crate::debug::{self, DebugConsole};
use crate::engine::CoreEngine;
use crate::error::{ControlError, DebugInputError};
use crate::snapshot;
use crate::state::{ControlContext, CoreGuard, ExecutionMode};

/// Discrete operator command, bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorCommand {
    /// Zero registers, reset the core, release every key, and run.
    Reset,
    /// Point `CSR:PC` at the profile's checksum routine.
    JumpToChecksum,
    /// Write a snapshot file.
    SaveSnapshot,
    /// Restore a snapshot file.
    LoadSnapshot,
    /// Dump memory from an operator-supplied address.
    Inspect,
    /// Patch memory from operator-supplied bytes.
    Patch,
    /// Continue running.
    Resume,
    /// Stop stepping.
    Pause,
    /// Execute one instruction, then stop.
    SingleStep,
    /// Execute one frame's budget, then stop.
    FrameStep,
    /// Lower the cycle budget.
    SlowDown,
    /// Raise the cycle budget.
    SpeedUp,
    /// Restore the nominal cycle budget.
    SpeedReset,
    /// Shut down.
    Quit,
}

impl OperatorCommand {
    /// Command bound to `key`, if any.
    #[must_use]
    pub const fn from_key(key: char) -> Option<Self> {
        Some(match key {
            'c' => Self::Reset,
            't' => Self::JumpToChecksum,
            'w' => Self::SaveSnapshot,
            'e' => Self::LoadSnapshot,
            'm' => Self::Inspect,
            'p' => Self::Patch,
            'r' => Self::Resume,
            ' ' => Self::Pause,
            's' => Self::SingleStep,
            'f' => Self::FrameStep,
            'j' => Self::SlowDown,
            'k' => Self::SpeedUp,
            'l' => Self::SpeedReset,
            'q' | '\u{1b}' => Self::Quit,
            _ => return None,
        })
    }
}

/// Whether the operator loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Keep polling input.
    Continue,
    /// Termination was requested.
    Quit,
}

/// Applies operator commands to a running context.
#[derive(Debug)]
pub struct Operator<'a, E, C> {
    ctx: &'a ControlContext<E>,
    console: C,
}

impl<'a, E: CoreEngine, C: DebugConsole> Operator<'a, E, C> {
    /// Operator over `ctx`, using `console` for inspect and patch.
    #[must_use]
    pub const fn new(ctx: &'a ControlContext<E>, console: C) -> Self {
        Self { ctx, console }
    }

    /// Executes one command.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::IllegalTransition`] when the command does
    /// not apply in the current mode, and snapshot or console failures. All
    /// of them are recoverable; the context is left consistent.
    pub fn execute(&mut self, command: OperatorCommand) -> Result<CommandOutcome, ControlError> {
        info!("operator command {command:?}");
        match command {
            OperatorCommand::Reset => self.reset()?,
            OperatorCommand::JumpToChecksum => {
                let address = self.ctx.config().profile.checksum_address();
                let mut core = self.ctx.lock();
                core.engine_mut().registers_mut().set_code_address(address);
                core.engine_mut().exit_standby();
                info!("jumped to checksum routine at {address:05X}");
            }
            OperatorCommand::SaveSnapshot => {
                snapshot::save_to_file(self.ctx, &self.ctx.config().snapshot_path)?;
            }
            OperatorCommand::LoadSnapshot => {
                snapshot::load_from_file(self.ctx, &self.ctx.config().snapshot_path)?;
            }
            OperatorCommand::Inspect => {
                self.paused(|ctx, console| debug::inspect(ctx, console).map(drop))?;
            }
            OperatorCommand::Patch => {
                let report = self.paused(debug::patch)?;
                info!(
                    "patched {} byte(s) at {:06X}h, {} token(s) rejected",
                    report.written, report.base, report.rejected
                );
            }
            OperatorCommand::Resume => {
                let mut core = self.ctx.lock();
                resume(&mut core)?;
                core.engine_mut().exit_standby();
            }
            OperatorCommand::Pause => {
                self.ctx.transition(ExecutionMode::Waiting)?;
            }
            OperatorCommand::SingleStep => {
                self.ctx.transition(ExecutionMode::SingleStep)?;
            }
            OperatorCommand::FrameStep => {
                self.ctx.transition(ExecutionMode::OneFrame)?;
            }
            OperatorCommand::SlowDown => report_speed(self.ctx.budget().slow_down(), false),
            OperatorCommand::SpeedUp => report_speed(self.ctx.budget().speed_up(), true),
            OperatorCommand::SpeedReset => report_speed(self.ctx.budget().reset(), false),
            OperatorCommand::Quit => {
                self.ctx.request_termination();
                return Ok(CommandOutcome::Quit);
            }
        }
        Ok(CommandOutcome::Continue)
    }

    fn reset(&self) -> Result<(), ControlError> {
        let mut core = self.ctx.lock();
        let engine = core.engine_mut();
        engine.zero_registers();
        engine.reset();
        engine.exit_standby();
        let regs = engine.registers();
        info!("core reset, CSR:PC = {:01X}:{:04X}", regs.csr, regs.pc);
        // Keys latched before the reset would otherwise stay down.
        self.ctx.keys().release_all();
        resume(&mut core)?;
        Ok(())
    }

    /// Runs a blocking console session with the core paused.
    ///
    /// The lock is released before the session starts; the core is resumed
    /// afterwards only if this call paused it.
    fn paused<T>(
        &mut self,
        session: impl FnOnce(&ControlContext<E>, &mut C) -> Result<T, DebugInputError>,
    ) -> Result<T, ControlError> {
        let previous = self.ctx.transition(ExecutionMode::Waiting)?;
        let result = session(self.ctx, &mut self.console);
        if previous == ExecutionMode::Running {
            self.ctx.transition(ExecutionMode::Running)?;
        }
        result.map_err(ControlError::from)
    }
}

/// Moves any paused or stepping mode back to Running.
fn resume<E>(core: &mut CoreGuard<'_, E>) -> Result<(), ControlError> {
    if matches!(core.mode(), ExecutionMode::SingleStep | ExecutionMode::OneFrame) {
        core.transition(ExecutionMode::Waiting)?;
    }
    core.transition(ExecutionMode::Running)?;
    Ok(())
}

fn report_speed(change: BudgetChange, raising: bool) {
    if change.clamped && raising {
        warn!("maximum speed reached");
    }
    info!(
        "cycle budget {} per frame, {} cycles per second",
        change.cycles,
        change.cycles_per_second()
    );
}
