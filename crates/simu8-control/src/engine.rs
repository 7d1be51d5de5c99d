//! Contract between the control layer and the instruction-execution engine.
//!
//! The engine is opaque: the control layer only steps it, resolves interrupts
//! on it, and inspects its registers and data memory.

/// Size in bytes of the serialized register file.
pub const REGISTER_FILE_BYTES: usize = 40;

/// Number of 8-bit general registers (`R0..R15`).
pub const GENERAL_REGISTER_COUNT: usize = 16;

/// Number of exception-level register banks (`ELR/ECSR/EPSW 1..3`).
pub const EXCEPTION_LEVELS: usize = 3;

/// Architectural register file of the stepped core.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    /// General registers `R0..R15`.
    pub gr: [u8; GENERAL_REGISTER_COUNT],
    /// Program counter.
    pub pc: u16,
    /// Code segment register.
    pub csr: u8,
    /// Link register.
    pub lr: u16,
    /// Link code segment register.
    pub lcsr: u8,
    /// Exception link registers, levels 1..3.
    pub elr: [u16; EXCEPTION_LEVELS],
    /// Exception code segment registers, levels 1..3.
    pub ecsr: [u8; EXCEPTION_LEVELS],
    /// Program status word.
    pub psw: u8,
    /// Saved program status words, levels 1..3.
    pub epsw: [u8; EXCEPTION_LEVELS],
    /// Stack pointer.
    pub sp: u16,
    /// Effective address register.
    pub ea: u16,
    /// Data segment register.
    pub dsr: u8,
}

impl RegisterFile {
    /// Serializes into the fixed little-endian snapshot layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; REGISTER_FILE_BYTES] {
        let mut out = [0u8; REGISTER_FILE_BYTES];
        let mut cursor = ByteCursor::new(&mut out);
        cursor.put_slice(&self.gr);
        cursor.put_u16(self.pc);
        cursor.put_u8(self.csr);
        cursor.put_u16(self.lr);
        cursor.put_u8(self.lcsr);
        for elr in self.elr {
            cursor.put_u16(elr);
        }
        cursor.put_slice(&self.ecsr);
        cursor.put_u8(self.psw);
        cursor.put_slice(&self.epsw);
        cursor.put_u16(self.sp);
        cursor.put_u16(self.ea);
        cursor.put_u8(self.dsr);
        out
    }

    /// Rebuilds a register file from [`RegisterFile::to_bytes`] output.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; REGISTER_FILE_BYTES]) -> Self {
        let mut reader = ByteReader { buf: bytes, at: 0 };
        let mut regs = Self::default();
        regs.gr.copy_from_slice(reader.take(GENERAL_REGISTER_COUNT));
        regs.pc = reader.u16();
        regs.csr = reader.u8();
        regs.lr = reader.u16();
        regs.lcsr = reader.u8();
        for elr in &mut regs.elr {
            *elr = reader.u16();
        }
        regs.ecsr.copy_from_slice(reader.take(EXCEPTION_LEVELS));
        regs.psw = reader.u8();
        regs.epsw.copy_from_slice(reader.take(EXCEPTION_LEVELS));
        regs.sp = reader.u16();
        regs.ea = reader.u16();
        regs.dsr = reader.u8();
        regs
    }

    /// Full 20-bit code address `CSR:PC`.
    #[must_use]
    pub const fn code_address(&self) -> u32 {
        ((self.csr as u32) << 16) | self.pc as u32
    }

    /// Points `CSR:PC` at a 20-bit code address.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn set_code_address(&mut self, address: u32) {
        self.csr = (address >> 16) as u8 & 0x0F;
        self.pc = (address & 0xFFFF) as u16;
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, len: usize) -> &'a [u8] {
        let chunk = &self.buf[self.at..self.at + len];
        self.at += len;
        chunk
    }

    fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn u16(&mut self) -> u16 {
        let chunk = self.take(2);
        u16::from_le_bytes([chunk[0], chunk[1]])
    }
}

struct ByteCursor<'a> {
    buf: &'a mut [u8],
    at: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, at: 0 }
    }

    fn put_slice(&mut self, bytes: &[u8]) {
        self.buf[self.at..self.at + bytes.len()].copy_from_slice(bytes);
        self.at += bytes.len();
    }

    fn put_u8(&mut self, value: u8) {
        self.put_slice(&[value]);
    }

    fn put_u16(&mut self, value: u16) {
        self.put_slice(&value.to_le_bytes());
    }
}

/// Synchronous trap reported by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trap {
    /// Fetched word does not decode to a legal instruction.
    IllegalInstruction,
}

/// Result of one engine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepOutcome {
    /// Clock cycles the step consumed.
    pub cycles: u32,
    /// Trap raised by the step, if any.
    pub trap: Option<Trap>,
}

impl StepOutcome {
    /// A step that retired normally.
    #[must_use]
    pub const fn retired(cycles: u32) -> Self {
        Self { cycles, trap: None }
    }

    /// A step that hit an illegal instruction.
    #[must_use]
    pub const fn illegal(cycles: u32) -> Self {
        Self {
            cycles,
            trap: Some(Trap::IllegalInstruction),
        }
    }
}

/// Maskable interrupt sources the control layer arbitrates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InterruptSource {
    /// Key input line went active.
    Keyboard,
    /// Timer reached its period.
    Timer,
}

/// Width of a data-memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataWidth {
    /// 8-bit access.
    Byte,
    /// 16-bit access.
    Word,
}

impl DataWidth {
    /// Access size in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
        }
    }
}

/// Splits a 24-bit data address into `(segment, offset)`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn split_data_address(address: u32) -> (u8, u16) {
    ((address >> 16) as u8, (address & 0xFFFF) as u16)
}

/// Stepping primitive and memory/interrupt interface of the emulated core.
///
/// Every method is called with the control layer's exclusion held, so
/// implementations need no internal locking of their own.
pub trait CoreEngine: Send {
    /// Executes one instruction.
    fn step(&mut self) -> StepOutcome;

    /// Applies the core's reset sequence (vector fetch into `CSR:PC`, `SP`).
    fn reset(&mut self);

    /// Clears every register to zero.
    fn zero_registers(&mut self);

    /// Register file, read-only.
    fn registers(&self) -> &RegisterFile;

    /// Register file, writable.
    fn registers_mut(&mut self) -> &mut RegisterFile;

    /// Reads data memory through the core's bus, including SFR side effects.
    fn read_data(&self, segment: u8, offset: u16, width: DataWidth) -> u32;

    /// Writes data memory through the core's bus, including SFR side effects.
    fn write_data(&mut self, segment: u8, offset: u16, width: DataWidth, value: u32);

    /// Reads a code word, used for diagnostics.
    fn read_code(&self, segment: u8, offset: u16) -> u16;

    /// Raw addressable data window (segment 0 above the ROM code window).
    fn data_window(&self) -> &[u8];

    /// Raw addressable data window, writable.
    fn data_window_mut(&mut self) -> &mut [u8];

    /// Samples the keyboard interrupt request.
    fn is_keyboard_interrupt_pending(&mut self) -> bool;

    /// Samples the timer interrupt request.
    fn is_timer_interrupt_pending(&mut self) -> bool;

    /// Attempts to vector into `source`'s handler.
    ///
    /// Returns `false` when the core refuses the source (masked, or a
    /// higher-level handler is active); nothing is dispatched in that case.
    fn resolve_interrupt(&mut self, source: InterruptSource) -> bool;

    /// Clears the request flag of a source that was dispatched.
    fn acknowledge_interrupt(&mut self, source: InterruptSource);

    /// Whether the core is in a STOP/HALT standby state.
    fn is_standby(&self) -> bool;

    /// Leaves standby unconditionally.
    fn exit_standby(&mut self);

    /// Frame buffer held by the LCD controller outside data memory.
    ///
    /// Panels whose VRAM is mapped into the data window return `None`.
    fn lcd_buffer(&self) -> Option<&[u8]> {
        None
    }
}
