//! Control, timing, and peripheral-simulation layer for a cycle-stepped
//! nX-U8 calculator core.
//!
//! The instruction engine itself is opaque behind [`CoreEngine`]. This crate
//! paces it against real time, lets an operator pause, step, inspect, and
//! patch it without corrupting shared state, simulates the calculator's
//! diode-less key matrix, and decodes display memory into pixel grids.

/// Error taxonomy.
pub mod error;
pub use error::{ControlError, DebugInputError, DisplayError, SnapshotError};

/// Contract with the instruction-execution engine.
pub mod engine;
pub use engine::{
    split_data_address, CoreEngine, DataWidth, InterruptSource, RegisterFile, StepOutcome, Trap,
    EXCEPTION_LEVELS, GENERAL_REGISTER_COUNT, REGISTER_FILE_BYTES,
};

/// Target-device profiles and runtime configuration.
pub mod profile;
pub use profile::{
    ControlConfig, DeviceProfile, InterruptPriority, Rgba, DATA_WINDOW_SIZE, FRAME_PERIOD,
    IDLE_DELAY, MAX_CYCLES_PER_FRAME, PERIPHERAL_PERIOD, ROM_WINDOW_SIZE, SNAPSHOT_LEN,
};

/// Execution mode, transition table, and the shared control context.
pub mod state;
pub use state::{ControlContext, CoreGuard, ExecutionMode};

/// Per-frame cycle budget.
pub mod budget;
pub use budget::{BudgetChange, CycleBudget};

/// Real-time delay abstraction.
pub mod pacing;
pub use pacing::{Pacer, SleepPacer};

/// Frame-paced execution scheduler.
pub mod scheduler;
pub use scheduler::{FrameReport, FrameScheduler, TrapReport};

/// Key matrix ghosting simulation and keypad geometry.
pub mod keyboard;
pub use keyboard::{
    encode_input_port, CellIndex, KeyCell, KeyGrid, KeypadLayout, MatrixLines, MatrixWiring,
    PointerButton, MATRIX_LINES, NO_INPUTS_ACTIVE,
};

/// Keyboard/timer peripheral models and the fast tick driver.
pub mod peripheral;
pub use peripheral::{
    KeyboardPort, PeripheralDriver, PeripheralPorts, TickOutcome, TimerDivider, TimerPort,
};

/// Display memory decoding.
pub mod display;
pub use display::{
    decode_frame, render_regions, DecodeMode, DisplayRegion, FrameGrid, FrameLayout, Placement,
    RegionSource, Shade, SurfaceRect,
};

/// Snapshot save and restore.
pub mod snapshot;
pub use snapshot::SnapshotBlob;

/// Operator memory inspection and patching.
pub mod debug;
pub use debug::{DebugConsole, DumpRow, LineConsole, PatchReport};

/// Operator command dispatch.
pub mod operator;
pub use operator::{CommandOutcome, Operator, OperatorCommand};

/// Thread wiring for a running emulation.
pub mod runtime;
pub use runtime::Runtime;

#[cfg(test)]
mod testing;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use tempfile as _;
