//! Passive 8x8 key matrix with ghosting, plus pointer-driven key state.
//!
//! The matrix has no isolation diodes: a closed key shorts its output line
//! (`KO`) to its input line (`KI`). Driving one output therefore reaches every
//! input that shares a closed key with it, and from those inputs every other
//! output sharing a closed key, and so on. Three closed keys on the corners of
//! a rectangle make the fourth corner read as pressed.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::display::SurfaceRect;
use crate::profile::{DeviceProfile, LCD_ORIGIN, REGION_GAP};

/// Lines on each axis of the matrix.
pub const MATRIX_LINES: usize = 8;

/// Keys in the matrix.
pub const MATRIX_KEYS: usize = MATRIX_LINES * MATRIX_LINES;

/// Port value reported when no output line is driven.
pub const NO_INPUTS_ACTIVE: u16 = 0xFFFF;

/// Upper port byte: the unused `KIH` lines always read as disabled.
const KIH_DISABLED: u16 = 0xFF00;

/// State of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum KeyCell {
    /// Open.
    #[default]
    Idle = 0,
    /// Closed while the pointer holds it down.
    Pressed = 1,
    /// Latched closed until toggled off.
    Held = 3,
}

impl KeyCell {
    /// Whether the key currently closes its contacts.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Pressed | Self::Held)
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Pressed,
            3 => Self::Held,
            _ => Self::Idle,
        }
    }
}

/// Position of a key: `row` is its input line, `col` its output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellIndex {
    /// Input line (`KI`), `0..8`.
    pub row: u8,
    /// Output line (`KO`), `0..8`.
    pub col: u8,
}

impl CellIndex {
    /// Builds an index, rejecting lines outside the matrix.
    #[must_use]
    pub const fn new(row: u8, col: u8) -> Option<Self> {
        if (row as usize) < MATRIX_LINES && (col as usize) < MATRIX_LINES {
            Some(Self { row, col })
        } else {
            None
        }
    }

    const fn slot(self) -> usize {
        self.row as usize * MATRIX_LINES + self.col as usize
    }
}

/// Pointer button asserted during an interaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PointerButton {
    /// Pointer moving with no button.
    #[default]
    None,
    /// Press-while-hovering button.
    Primary,
    /// Hold-toggle button; deliver once per click, not every frame.
    Secondary,
}

/// Asserted output and input lines, one bit per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MatrixLines {
    /// Driven (or back-driven) output lines.
    pub outputs: u8,
    /// Input lines reached through closed keys.
    pub inputs: u8,
}

/// Closed-key adjacency sampled from a [`KeyGrid`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatrixWiring {
    /// For each output line, the input lines it shorts to.
    inputs_of_output: [u8; MATRIX_LINES],
    /// For each input line, the output lines it shorts to.
    outputs_of_input: [u8; MATRIX_LINES],
}

impl MatrixWiring {
    /// One propagation round: outputs reach inputs, then inputs reach outputs.
    #[must_use]
    pub fn propagate(&self, lines: MatrixLines) -> MatrixLines {
        let inputs = lines.inputs | fan_out(lines.outputs, &self.inputs_of_output);
        let outputs = lines.outputs | fan_out(inputs, &self.outputs_of_input);
        MatrixLines { outputs, inputs }
    }

    /// Propagates from `outputs` until nothing changes.
    ///
    /// Each round only adds lines, so the sets grow monotonically. A round
    /// that adds no input line cannot add an output line either (every
    /// asserted input was already fanned out in the previous round), so each
    /// round before the fixed point adds at least one of the eight inputs.
    /// The loop therefore settles within [`MATRIX_LINES`] rounds.
    #[must_use]
    pub fn settle(&self, outputs: u8) -> MatrixLines {
        let mut lines = MatrixLines { outputs, inputs: 0 };
        for _ in 0..MATRIX_LINES {
            let next = self.propagate(lines);
            if next == lines {
                break;
            }
            lines = next;
        }
        lines
    }
}

fn fan_out(asserted: u8, adjacency: &[u8; MATRIX_LINES]) -> u8 {
    adjacency
        .iter()
        .enumerate()
        .filter(|(line, _)| asserted & (1 << line) != 0)
        .fold(0, |acc, (_, reached)| acc | reached)
}

/// Encodes settled input lines as the active-low `KI` port value.
///
/// Input line 0 is wired to the port's bit 7, line 7 to bit 0.
#[must_use]
pub const fn encode_input_port(inputs: u8) -> u16 {
    !(inputs.reverse_bits() as u16) | KIH_DISABLED
}

/// Shared 8x8 key state.
///
/// Written by the operator thread, read by the peripheral tick driver and
/// the interrupt path without taking the control exclusion; each cell is an
/// independent atomic so readers never observe a torn value.
#[derive(Debug)]
pub struct KeyGrid {
    cells: [AtomicU8; MATRIX_KEYS],
}

impl Default for KeyGrid {
    fn default() -> Self {
        Self {
            cells: std::array::from_fn(|_| AtomicU8::new(KeyCell::Idle as u8)),
        }
    }
}

impl KeyGrid {
    /// All keys idle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State of one key.
    #[must_use]
    pub fn cell(&self, index: CellIndex) -> KeyCell {
        KeyCell::from_u8(self.cells[index.slot()].load(Ordering::Acquire))
    }

    /// Overwrites one key.
    pub fn set_cell(&self, index: CellIndex, cell: KeyCell) {
        self.cells[index.slot()].store(cell as u8, Ordering::Release);
    }

    /// Opens every key.
    pub fn release_all(&self) {
        for cell in &self.cells {
            cell.store(KeyCell::Idle as u8, Ordering::Release);
        }
    }

    /// Row-major copy of every key.
    #[must_use]
    pub fn cells(&self) -> [KeyCell; MATRIX_KEYS] {
        std::array::from_fn(|slot| KeyCell::from_u8(self.cells[slot].load(Ordering::Acquire)))
    }

    /// Closed-key adjacency at this instant.
    #[must_use]
    pub fn wiring(&self) -> MatrixWiring {
        let mut wiring = MatrixWiring::default();
        for (slot, cell) in self.cells().iter().enumerate() {
            if cell.is_closed() {
                let (row, col) = (slot / MATRIX_LINES, slot % MATRIX_LINES);
                wiring.inputs_of_output[col] |= 1 << row;
                wiring.outputs_of_input[row] |= 1 << col;
            }
        }
        wiring
    }

    /// Input port value seen while driving `output_mask`, ghosting included.
    ///
    /// Returns [`NO_INPUTS_ACTIVE`] when no output line is driven.
    #[must_use]
    pub fn resolve_inputs(&self, output_mask: u8) -> u16 {
        if output_mask == 0 {
            return NO_INPUTS_ACTIVE;
        }
        encode_input_port(self.wiring().settle(output_mask).inputs)
    }

    /// Applies one frame of pointer interaction.
    ///
    /// `hovered` is the key under the pointer, if any. The hovered key becomes
    /// Pressed with [`PointerButton::Primary`] (Held keys stay Held), toggles
    /// Held with [`PointerButton::Secondary`], and drops back to Idle from
    /// Pressed with no button. Every other Pressed key is released.
    pub fn update_cell_interaction(&self, hovered: Option<CellIndex>, button: PointerButton) {
        for slot in 0..MATRIX_KEYS {
            let current = KeyCell::from_u8(self.cells[slot].load(Ordering::Acquire));
            let is_hovered = hovered.is_some_and(|index| index.slot() == slot);
            let next = if is_hovered {
                match (button, current) {
                    (PointerButton::Primary | PointerButton::None, KeyCell::Held)
                    | (PointerButton::Secondary, KeyCell::Idle | KeyCell::Pressed) => KeyCell::Held,
                    (PointerButton::Primary, _) => KeyCell::Pressed,
                    (PointerButton::Secondary, KeyCell::Held) | (PointerButton::None, _) => {
                        KeyCell::Idle
                    }
                }
            } else if current == KeyCell::Pressed {
                KeyCell::Idle
            } else {
                current
            };
            if next != current {
                self.cells[slot].store(next as u8, Ordering::Release);
            }
        }
    }
}

/// Surface geometry of the on-screen keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeypadLayout {
    /// Top-left corner of key (0, 0).
    pub origin_x: u32,
    /// Top-left corner of key (0, 0).
    pub origin_y: u32,
    /// Key width.
    pub key_w: u32,
    /// Key height.
    pub key_h: u32,
    /// Horizontal gap between keys.
    pub gap_w: u32,
    /// Vertical gap between keys.
    pub gap_h: u32,
}

impl KeypadLayout {
    /// Keypad placed below the profile's LCD.
    #[must_use]
    pub const fn for_profile(profile: DeviceProfile) -> Self {
        let (_, lcd_h) = profile.lcd_extent();
        Self {
            origin_x: 0,
            origin_y: LCD_ORIGIN.y + lcd_h + REGION_GAP,
            key_w: 32,
            key_h: 20,
            gap_w: 8,
            gap_h: 8,
        }
    }

    /// Surface rectangle of a key.
    #[must_use]
    pub const fn cell_rect(&self, index: CellIndex) -> SurfaceRect {
        SurfaceRect {
            x: self.origin_x + (self.key_w + self.gap_w) * index.col as u32,
            y: self.origin_y + (self.key_h + self.gap_h) * index.row as u32,
            w: self.key_w,
            h: self.key_h,
        }
    }

    /// Key under surface point `(x, y)`; gaps hit nothing.
    #[must_use]
    pub fn hit_test(&self, x: i32, y: i32) -> Option<CellIndex> {
        let x = u32::try_from(x).ok()?.checked_sub(self.origin_x)?;
        let y = u32::try_from(y).ok()?.checked_sub(self.origin_y)?;
        let (col, dx) = (x / (self.key_w + self.gap_w), x % (self.key_w + self.gap_w));
        let (row, dy) = (y / (self.key_h + self.gap_h), y % (self.key_h + self.gap_h));
        if dx >= self.key_w || dy >= self.key_h {
            return None;
        }
        CellIndex::new(u8::try_from(row).ok()?, u8::try_from(col).ok()?)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        encode_input_port, CellIndex, KeyCell, KeyGrid, KeypadLayout, PointerButton,
        NO_INPUTS_ACTIVE,
    };
    use crate::profile::DeviceProfile;

    fn at(row: u8, col: u8) -> CellIndex {
        CellIndex::new(row, col).expect("inside matrix")
    }

    fn hold(grid: &KeyGrid, keys: &[(u8, u8)]) {
        for &(row, col) in keys {
            grid.set_cell(at(row, col), KeyCell::Held);
        }
    }

    #[test]
    fn undriven_matrix_reports_no_inputs() {
        let grid = KeyGrid::new();
        hold(&grid, &[(0, 0), (3, 4)]);
        assert_eq!(grid.resolve_inputs(0), NO_INPUTS_ACTIVE);
    }

    #[test]
    fn single_key_pulls_its_input_low() {
        let grid = KeyGrid::new();
        hold(&grid, &[(2, 5)]);
        // Input line 2 sits on port bit 5.
        assert_eq!(grid.resolve_inputs(1 << 5), 0xFFFF & !(1 << 5));
        assert_eq!(grid.resolve_inputs(1 << 4), 0xFFFF);
    }

    #[test]
    fn rectangle_corners_ghost_the_fourth_key() {
        let grid = KeyGrid::new();
        // (0,0), (0,1), (1,1) closed; driving output 0 reaches input 0,
        // back-drives output 1 through (0,1), which reaches input 1 via (1,1).
        hold(&grid, &[(0, 0), (0, 1), (1, 1)]);
        let settled = grid.wiring().settle(0b0000_0001);
        assert_eq!(settled.inputs, 0b0000_0011);
        assert_eq!(settled.outputs, 0b0000_0011);
    }

    #[test]
    fn pressed_and_held_both_close_the_contact() {
        let grid = KeyGrid::new();
        grid.set_cell(at(7, 7), KeyCell::Pressed);
        assert_eq!(grid.resolve_inputs(0x80), encode_input_port(0x80));
        assert_eq!(encode_input_port(0x80), 0xFFFE);
    }

    #[test]
    fn primary_press_then_move_away_releases() {
        let grid = KeyGrid::new();
        grid.update_cell_interaction(Some(at(1, 2)), PointerButton::Primary);
        assert_eq!(grid.cell(at(1, 2)), KeyCell::Pressed);

        grid.update_cell_interaction(Some(at(4, 4)), PointerButton::None);
        assert_eq!(grid.cell(at(1, 2)), KeyCell::Idle);
    }

    #[test]
    fn primary_press_keeps_held_keys_held() {
        let grid = KeyGrid::new();
        grid.set_cell(at(0, 0), KeyCell::Held);
        grid.update_cell_interaction(Some(at(0, 0)), PointerButton::Primary);
        assert_eq!(grid.cell(at(0, 0)), KeyCell::Held);
        grid.update_cell_interaction(None, PointerButton::None);
        assert_eq!(grid.cell(at(0, 0)), KeyCell::Held);
    }

    #[test]
    fn secondary_toggles_hold() {
        let grid = KeyGrid::new();
        grid.update_cell_interaction(Some(at(3, 3)), PointerButton::Secondary);
        assert_eq!(grid.cell(at(3, 3)), KeyCell::Held);
        grid.update_cell_interaction(Some(at(3, 3)), PointerButton::Secondary);
        assert_eq!(grid.cell(at(3, 3)), KeyCell::Idle);
    }

    #[test]
    fn hovering_without_button_releases_pressed_key() {
        let grid = KeyGrid::new();
        grid.update_cell_interaction(Some(at(5, 1)), PointerButton::Primary);
        grid.update_cell_interaction(Some(at(5, 1)), PointerButton::None);
        assert_eq!(grid.cell(at(5, 1)), KeyCell::Idle);
    }

    #[test]
    fn keypad_hit_test_matches_cell_rects_and_skips_gaps() {
        let layout = KeypadLayout::for_profile(DeviceProfile::Esp);
        assert_eq!(layout.origin_y, 16 + 96 + 16);
        let rect = layout.cell_rect(at(2, 3));
        let hit = layout.hit_test(
            i32::try_from(rect.x + 1).expect("fits"),
            i32::try_from(rect.y + 1).expect("fits"),
        );
        assert_eq!(hit, Some(at(2, 3)));

        let gap_x = i32::try_from(rect.x + rect.w).expect("fits");
        assert_eq!(layout.hit_test(gap_x, i32::try_from(rect.y).expect("fits")), None);
        assert_eq!(layout.hit_test(-1, 200), None);
        assert_eq!(layout.hit_test(8 * 40, i32::try_from(rect.y).expect("fits")), None);
    }
}
