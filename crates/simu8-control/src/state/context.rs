use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::budget::CycleBudget;
use crate::error::ControlError;
use crate::keyboard::KeyGrid;
use crate::peripheral::PeripheralPorts;
use crate::profile::ControlConfig;

use super::ExecutionMode;

/// State guarded by the single control exclusion.
#[derive(Debug)]
struct Core<E> {
    engine: E,
    mode: ExecutionMode,
}

/// Everything the scheduler, tick driver, and operator share.
///
/// The engine and the execution mode sit behind one mutex, so at most one
/// thread steps or inspects the engine at a time. Termination is mirrored
/// into an atomic that outer loops read without the lock: the flag only ever
/// moves toward `true`, so a stale read delays shutdown by at most one
/// frame. Key state, the cycle budget, and the peripheral ports are atomics
/// and are never guarded by the mutex.
#[derive(Debug)]
pub struct ControlContext<E> {
    core: Mutex<Core<E>>,
    terminating: AtomicBool,
    budget: CycleBudget,
    keys: KeyGrid,
    ports: Arc<PeripheralPorts>,
    config: ControlConfig,
}

impl<E> ControlContext<E> {
    /// Wraps `engine` in Running mode with the profile's nominal budget.
    ///
    /// `ports` must be the same instance the engine reads its keyboard and
    /// timer lines from.
    #[must_use]
    pub fn new(engine: E, ports: Arc<PeripheralPorts>, config: ControlConfig) -> Self {
        let budget = CycleBudget::new(
            config.profile.nominal_cycles_per_frame(),
            config.max_cycles_per_frame,
        );
        Self {
            core: Mutex::new(Core {
                engine,
                mode: ExecutionMode::Running,
            }),
            terminating: AtomicBool::new(false),
            budget,
            keys: KeyGrid::new(),
            ports,
            config,
        }
    }

    /// Acquires the control exclusion.
    ///
    /// A panic on another thread while it held the guard does not make the
    /// context unusable; the guarded state is taken over as it was left.
    #[must_use]
    pub fn lock(&self) -> CoreGuard<'_, E> {
        CoreGuard {
            core: self.core.lock().unwrap_or_else(PoisonError::into_inner),
            terminating: &self.terminating,
        }
    }

    /// Current mode, read under a brief lock.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.lock().mode()
    }

    /// Moves to `to` under a brief lock; see [`CoreGuard::transition`].
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::IllegalTransition`] if the table forbids it.
    pub fn transition(&self, to: ExecutionMode) -> Result<ExecutionMode, ControlError> {
        self.lock().transition(to)
    }

    /// Requests shutdown. Always succeeds; Terminating is reachable from
    /// every mode and absorbing.
    pub fn request_termination(&self) {
        // Self-transition and every other source are accepted.
        let _ = self.lock().transition(ExecutionMode::Terminating);
    }

    /// Tears the context down and hands back the engine.
    #[must_use]
    pub fn into_engine(self) -> E {
        self.core
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .engine
    }

    /// Lock-free termination check for outer loops.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    /// Per-frame cycle budget.
    #[must_use]
    pub const fn budget(&self) -> &CycleBudget {
        &self.budget
    }

    /// Shared key grid.
    #[must_use]
    pub const fn keys(&self) -> &KeyGrid {
        &self.keys
    }

    /// Keyboard and timer peripheral ports.
    #[must_use]
    pub fn ports(&self) -> &PeripheralPorts {
        &self.ports
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }
}

/// Exclusive access to the engine and the execution mode.
#[derive(Debug)]
pub struct CoreGuard<'a, E> {
    core: MutexGuard<'a, Core<E>>,
    terminating: &'a AtomicBool,
}

impl<E> CoreGuard<'_, E> {
    /// Authoritative execution mode.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.core.mode
    }

    /// Applies a transition from the table and returns the previous mode.
    ///
    /// Requesting the current mode is a no-op. Entering Terminating also
    /// raises the lock-free termination flag.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::IllegalTransition`] and leaves the mode
    /// unchanged when the table forbids `from -> to`.
    pub fn transition(&mut self, to: ExecutionMode) -> Result<ExecutionMode, ControlError> {
        let from = self.core.mode;
        if from == to {
            return Ok(from);
        }
        if !from.can_transition_to(to) {
            warn!("rejected execution-mode transition {from:?} -> {to:?}");
            return Err(ControlError::IllegalTransition { from, to });
        }
        self.core.mode = to;
        if to == ExecutionMode::Terminating {
            self.terminating.store(true, Ordering::Release);
        }
        debug!("execution mode {from:?} -> {to:?} ({})", to.label());
        Ok(from)
    }

    /// Guarded engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.core.engine
    }

    /// Guarded engine, writable.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.core.engine
    }
}
