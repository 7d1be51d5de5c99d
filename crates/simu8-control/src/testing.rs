//! Unit-test doubles.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::engine::{CoreEngine, DataWidth, InterruptSource, RegisterFile, StepOutcome};
use crate::pacing::Pacer;
use crate::profile::{DATA_WINDOW_SIZE, ROM_WINDOW_SIZE};

/// Engine whose every step retires in one cycle.
#[derive(Debug, Clone)]
pub struct NullEngine {
    pub steps: u32,
    pub standby: bool,
    pub regs: RegisterFile,
    pub window: Vec<u8>,
    pub lcd: Option<Vec<u8>>,
}

impl Default for NullEngine {
    fn default() -> Self {
        Self {
            steps: 0,
            standby: false,
            regs: RegisterFile::default(),
            window: vec![0; DATA_WINDOW_SIZE],
            lcd: None,
        }
    }
}

impl NullEngine {
    fn slot(segment: u8, offset: u16) -> Option<usize> {
        let offset = usize::from(offset);
        (segment == 0 && offset >= ROM_WINDOW_SIZE).then(|| offset - ROM_WINDOW_SIZE)
    }
}

impl CoreEngine for NullEngine {
    fn step(&mut self) -> StepOutcome {
        self.steps += 1;
        StepOutcome::retired(1)
    }

    fn reset(&mut self) {
        self.regs.sp = 0x8E00;
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
        (0..width.bytes()).fold(0, |acc, idx| {
            let byte = Self::slot(segment, offset.wrapping_add(u16::try_from(idx).unwrap_or(0)))
                .map_or(0, |slot| self.window[slot]);
            acc | (u32::from(byte) << (8 * idx))
        })
    }

    fn write_data(&mut self, segment: u8, offset: u16, width: DataWidth, value: u32) {
        for idx in 0..width.bytes() {
            let at = offset.wrapping_add(u16::try_from(idx).unwrap_or(0));
            if let Some(slot) = Self::slot(segment, at) {
                self.window[slot] = value.to_le_bytes()[idx];
            }
        }
    }

    fn read_code(&self, _segment: u8, _offset: u16) -> u16 {
        0xFFFF
    }

    fn data_window(&self) -> &[u8] {
        &self.window
    }

    fn data_window_mut(&mut self) -> &mut [u8] {
        &mut self.window
    }

    fn is_keyboard_interrupt_pending(&mut self) -> bool {
        false
    }

    fn is_timer_interrupt_pending(&mut self) -> bool {
        false
    }

    fn resolve_interrupt(&mut self, _source: InterruptSource) -> bool {
        false
    }

    fn acknowledge_interrupt(&mut self, _source: InterruptSource) {}

    fn is_standby(&self) -> bool {
        self.standby
    }

    fn exit_standby(&mut self) {
        self.standby = false;
    }

    fn lcd_buffer(&self) -> Option<&[u8]> {
        self.lcd.as_deref()
    }
}

/// Pacer that returns immediately and counts calls.
#[derive(Debug, Default)]
pub struct CountingPacer {
    pauses: AtomicU32,
}

impl CountingPacer {
    pub fn pauses(&self) -> u32 {
        self.pauses.load(Ordering::Relaxed)
    }
}

impl Pacer for CountingPacer {
    fn pause(&self, _duration: Duration) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }
}
