//! Scripted engine double shared by the integration suites.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use simu8_control::{
    ControlConfig, ControlContext, CoreEngine, DataWidth, DeviceProfile, InterruptSource,
    LineConsole, Pacer, PeripheralPorts, RegisterFile, StepOutcome, DATA_WINDOW_SIZE,
    ROM_WINDOW_SIZE,
};

/// Engine whose steps follow a script, then fall back to `default_step`.
#[derive(Debug)]
pub struct ScriptedEngine {
    pub regs: RegisterFile,
    pub window: Vec<u8>,
    pub script: VecDeque<StepOutcome>,
    pub default_step: StepOutcome,
    pub steps: u32,
    pub standby: bool,
    pub code_word: u16,
    pub ports: Arc<PeripheralPorts>,
    pub masked: Vec<InterruptSource>,
    pub dispatched: Vec<InterruptSource>,
    /// After this many steps, set the context's budget to the given value.
    pub budget_hook: Option<(u32, u32)>,
    pub context: Arc<OnceLock<Weak<ControlContext<ScriptedEngine>>>>,
}

impl ScriptedEngine {
    pub fn new(ports: Arc<PeripheralPorts>) -> Self {
        Self {
            regs: RegisterFile::default(),
            window: vec![0; DATA_WINDOW_SIZE],
            script: VecDeque::new(),
            default_step: StepOutcome::retired(1),
            steps: 0,
            standby: false,
            code_word: 0xFFFF,
            ports,
            masked: Vec::new(),
            dispatched: Vec::new(),
            budget_hook: None,
            context: Arc::new(OnceLock::new()),
        }
    }

    fn slot(segment: u8, offset: u16) -> Option<usize> {
        let offset = usize::from(offset);
        (segment == 0 && offset >= ROM_WINDOW_SIZE).then(|| offset - ROM_WINDOW_SIZE)
    }
}

impl CoreEngine for ScriptedEngine {
    fn step(&mut self) -> StepOutcome {
        self.steps += 1;
        self.regs.pc = self.regs.pc.wrapping_add(2);
        if let Some((after, cycles)) = self.budget_hook {
            if self.steps == after {
                if let Some(ctx) = self.context.get().and_then(Weak::upgrade) {
                    ctx.budget().set(cycles);
                }
            }
        }
        self.script.pop_front().unwrap_or(self.default_step)
    }

    fn reset(&mut self) {
        self.regs.sp = 0x8E00;
        self.regs.pc = 0x0200;
    }

    fn zero_registers(&mut self) {
        self.regs = RegisterFile::default();
    }

    fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    fn read_data(&self, segment: u8, offset: u16, width: DataWidth) -> u32 {
        let mut value = 0;
        for idx in 0..width.bytes() {
            let at = offset.wrapping_add(u16::try_from(idx).expect("width fits"));
            let byte = Self::slot(segment, at).map_or(0, |slot| self.window[slot]);
            value |= u32::from(byte) << (8 * idx);
        }
        value
    }

    fn write_data(&mut self, segment: u8, offset: u16, width: DataWidth, value: u32) {
        for idx in 0..width.bytes() {
            let at = offset.wrapping_add(u16::try_from(idx).expect("width fits"));
            if let Some(slot) = Self::slot(segment, at) {
                self.window[slot] = value.to_le_bytes()[idx];
            }
        }
    }

    fn read_code(&self, _segment: u8, _offset: u16) -> u16 {
        self.code_word
    }

    fn data_window(&self) -> &[u8] {
        &self.window
    }

    fn data_window_mut(&mut self) -> &mut [u8] {
        &mut self.window
    }

    fn is_keyboard_interrupt_pending(&mut self) -> bool {
        self.ports.keyboard.is_pending()
    }

    fn is_timer_interrupt_pending(&mut self) -> bool {
        self.ports.timer.is_pending()
    }

    fn resolve_interrupt(&mut self, source: InterruptSource) -> bool {
        if self.masked.contains(&source) {
            return false;
        }
        self.dispatched.push(source);
        true
    }

    fn acknowledge_interrupt(&mut self, source: InterruptSource) {
        match source {
            InterruptSource::Keyboard => self.ports.keyboard.acknowledge(),
            InterruptSource::Timer => self.ports.timer.acknowledge(),
        }
    }

    fn is_standby(&self) -> bool {
        self.standby
    }

    fn exit_standby(&mut self) {
        self.standby = false;
    }
}

/// Pacer that never sleeps.
#[derive(Debug, Default)]
pub struct InstantPacer {
    pauses: AtomicU32,
}

impl InstantPacer {
    pub fn pauses(&self) -> u32 {
        self.pauses.load(Ordering::Relaxed)
    }
}

impl Pacer for InstantPacer {
    fn pause(&self, _duration: Duration) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn config() -> ControlConfig {
    ControlConfig::for_profile(DeviceProfile::Esp)
}

/// Context over a fresh scripted engine, customised by `setup`.
pub fn context_with(
    config: ControlConfig,
    setup: impl FnOnce(&mut ScriptedEngine),
) -> Arc<ControlContext<ScriptedEngine>> {
    let ports = Arc::new(PeripheralPorts::default());
    let mut engine = ScriptedEngine::new(Arc::clone(&ports));
    setup(&mut engine);
    let slot = Arc::clone(&engine.context);
    let ctx = Arc::new(ControlContext::new(engine, ports, config));
    slot.set(Arc::downgrade(&ctx)).expect("context set once");
    ctx
}

pub fn context() -> Arc<ControlContext<ScriptedEngine>> {
    context_with(config(), |_| {})
}

/// Console fed from a fixed transcript, capturing output.
pub fn console(input: &str) -> LineConsole<Cursor<Vec<u8>>, Vec<u8>> {
    LineConsole::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
}

pub fn output(console: LineConsole<Cursor<Vec<u8>>, Vec<u8>>) -> String {
    String::from_utf8(console.into_output()).expect("console output is utf-8")
}
