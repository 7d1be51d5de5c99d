//! Process-lifetime wiring of the scheduler and peripheral threads.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::info;

use crate::debug::DebugConsole;
use crate::engine::CoreEngine;
use crate::error::ControlError;
use crate::operator::Operator;
use crate::pacing::{Pacer, SleepPacer};
use crate::peripheral::{PeripheralDriver, PeripheralPorts};
use crate::profile::{ControlConfig, DATA_WINDOW_SIZE};
use crate::scheduler::FrameScheduler;
use crate::state::ControlContext;

const SCHEDULER_THREAD: &str = "simu8-core";
const PERIPHERAL_THREAD: &str = "simu8-peripheral";

/// Running scheduler and peripheral threads over one shared context.
///
/// Dropping the runtime requests termination and joins both threads;
/// [`Runtime::shutdown`] does the same and hands back the engine.
#[derive(Debug)]
pub struct Runtime<E> {
    ctx: Arc<ControlContext<E>>,
    scheduler: Option<JoinHandle<u64>>,
    peripherals: Option<JoinHandle<u64>>,
}

impl<E: CoreEngine + 'static> Runtime<E> {
    /// Starts both loops with real-time pacing.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Initialization`] if the engine's data window
    /// does not match the profile or a thread cannot be spawned. No loop is
    /// left running on error.
    pub fn start(
        engine: E,
        ports: Arc<PeripheralPorts>,
        config: ControlConfig,
    ) -> Result<Self, ControlError> {
        Self::start_with_pacer(engine, ports, config, Arc::new(SleepPacer))
    }

    /// Starts both loops, sleeping through `pacer`.
    ///
    /// # Errors
    ///
    /// As [`Runtime::start`].
    pub fn start_with_pacer<P: Pacer + 'static>(
        engine: E,
        ports: Arc<PeripheralPorts>,
        config: ControlConfig,
        pacer: Arc<P>,
    ) -> Result<Self, ControlError> {
        let window = engine.data_window().len();
        if window != DATA_WINDOW_SIZE {
            return Err(ControlError::Initialization {
                reason: format!(
                    "engine data window is {window} bytes, {:?} expects {DATA_WINDOW_SIZE}",
                    config.profile
                ),
            });
        }
        info!(
            "starting {:?} at {} cycles per frame",
            config.profile,
            config.profile.nominal_cycles_per_frame()
        );
        let ctx = Arc::new(ControlContext::new(engine, ports, config));

        let scheduler = {
            let ctx = Arc::clone(&ctx);
            let pacer = Arc::clone(&pacer);
            spawn(SCHEDULER_THREAD, move || {
                FrameScheduler::new(ctx, pacer).run()
            })?
        };
        let mut runtime = Self {
            ctx,
            scheduler: Some(scheduler),
            peripherals: None,
        };
        let driver = PeripheralDriver::new(Arc::clone(&runtime.ctx));
        // On failure `runtime` drops here, which stops the scheduler thread.
        runtime.peripherals = Some(spawn(PERIPHERAL_THREAD, move || driver.run(&*pacer))?);
        Ok(runtime)
    }
}

impl<E: CoreEngine> Runtime<E> {
    /// Shared context for presentation and operator input.
    #[must_use]
    pub fn context(&self) -> &ControlContext<E> {
        &self.ctx
    }

    /// Operator bound to this runtime's context.
    #[must_use]
    pub fn operator<C: DebugConsole>(&self, console: C) -> Operator<'_, E, C> {
        Operator::new(&self.ctx, console)
    }

    /// Requests termination, joins both threads, and returns the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Shutdown`] if a worker thread panicked.
    pub fn shutdown(mut self) -> Result<E, ControlError> {
        let failed = self.stop();
        let ctx = Arc::clone(&self.ctx);
        drop(self);
        if let Some(name) = failed {
            return Err(ControlError::Shutdown {
                reason: format!("{name} thread panicked"),
            });
        }
        Arc::try_unwrap(ctx)
            .map(ControlContext::into_engine)
            .map_err(|_| ControlError::Shutdown {
                reason: "control context still shared".to_owned(),
            })
    }
}

impl<E> Runtime<E> {
    /// Requests termination and joins whatever is still running. Returns the
    /// name of a thread that panicked, if any.
    fn stop(&mut self) -> Option<&'static str> {
        self.ctx.request_termination();
        let mut failed = None;
        for (name, handle) in [
            (SCHEDULER_THREAD, self.scheduler.take()),
            (PERIPHERAL_THREAD, self.peripherals.take()),
        ] {
            if let Some(handle) = handle {
                match handle.join() {
                    Ok(count) => info!("{name} thread joined after {count} iterations"),
                    Err(_) => failed = Some(name),
                }
            }
        }
        failed
    }
}

impl<E> Drop for Runtime<E> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn spawn(
    name: &'static str,
    body: impl FnOnce() -> u64 + Send + 'static,
) -> Result<JoinHandle<u64>, ControlError> {
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(body)
        .map_err(|err| ControlError::Initialization {
            reason: format!("cannot spawn {name} thread: {err}"),
        })
}
