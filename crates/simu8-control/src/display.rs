//! Display frame decoding from raw emulated memory.
//!
//! Two pixel formats exist, chosen per device at runtime:
//!
//! * [`DecodeMode::Mono`]: one bit per pixel, MSB first, set or clear.
//! * [`DecodeMode::DualPlane`]: two equally sized bit-planes stored back to
//!   back; a pixel's level is `4 - plane0 - 2 * plane1`, giving four shades.
//!
//! Rows may be padded: [`FrameLayout::stride`] is the number of pixels a row
//! occupies in memory, of which only [`FrameLayout::width`] are visible.

use crate::engine::{split_data_address, CoreEngine, DataWidth};
use crate::error::DisplayError;
use crate::profile::{DeviceProfile, Rgba};
use crate::state::CoreGuard;

/// Number of discrete shades produced by [`DecodeMode::DualPlane`].
pub const DUAL_PLANE_LEVELS: u8 = 4;

/// Pixel format of a display region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DecodeMode {
    /// One bit-plane, two intensities.
    Mono,
    /// Two bit-planes, four intensities.
    DualPlane,
}

impl DecodeMode {
    /// Number of bit-planes read per frame.
    #[must_use]
    pub const fn planes(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::DualPlane => 2,
        }
    }
}

/// Logical rectangle over display memory, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FrameLayout {
    /// Visible pixels per row.
    pub width: u16,
    /// Rows.
    pub height: u16,
    /// Pixels per row in memory, `>= width`.
    pub stride: u16,
}

impl FrameLayout {
    /// Unpadded layout: stride equals width.
    #[must_use]
    pub const fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            stride: width,
        }
    }

    /// Same layout with a wider in-memory row.
    #[must_use]
    pub const fn with_stride(self, stride: u16) -> Self {
        Self { stride, ..self }
    }

    /// Bytes per row in memory.
    #[must_use]
    pub const fn row_bytes(&self) -> usize {
        (self.stride as usize).div_ceil(8)
    }

    /// Bytes per bit-plane.
    #[must_use]
    pub const fn plane_bytes(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    /// Bytes a full frame occupies in `mode`.
    #[must_use]
    pub const fn buffer_len(&self, mode: DecodeMode) -> usize {
        self.plane_bytes() * mode.planes()
    }

    fn validate(&self, mode: DecodeMode, actual: usize) -> Result<(), DisplayError> {
        if self.stride < self.width {
            return Err(DisplayError::StrideTooNarrow {
                width: self.width,
                stride: self.stride,
            });
        }
        let needed = self.buffer_len(mode);
        if actual < needed {
            return Err(DisplayError::BufferTooShort { needed, actual });
        }
        Ok(())
    }
}

/// Top-left corner of a region on the presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Placement {
    /// Horizontal offset in surface pixels.
    pub x: u32,
    /// Vertical offset in surface pixels.
    pub y: u32,
}

impl Placement {
    /// Placement shifted right by `dx` and down by `dy`.
    #[must_use]
    pub const fn offset(self, dx: u32, dy: u32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Axis-aligned surface rectangle, half-open on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub w: u32,
    /// Height.
    pub h: u32,
}

impl SurfaceRect {
    /// Whether the two rectangles share at least one surface pixel.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// Decoded intensity of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shade {
    /// Mono pixel with its bit set.
    Set,
    /// Mono pixel with its bit clear.
    Clear,
    /// Dual-plane level, `1..=4`, 4 being lightest.
    Level(u8),
}

impl Shade {
    /// Surface colour: mono pixels use the panel colours, levels a grey ramp.
    #[must_use]
    pub const fn color(self, profile: DeviceProfile) -> Rgba {
        let (set, clear) = profile.mono_colors();
        match self {
            Self::Set => set,
            Self::Clear => clear,
            Self::Level(level) => {
                let level = if level > DUAL_PLANE_LEVELS {
                    DUAL_PLANE_LEVELS
                } else {
                    level
                };
                let grey = (255 / DUAL_PLANE_LEVELS) * level;
                Rgba(grey, grey, grey, 255)
            }
        }
    }
}

/// Decoded pixel grid for one region, positioned on the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameGrid {
    width: u16,
    height: u16,
    scale: u32,
    placement: Placement,
    shades: Vec<Shade>,
}

impl FrameGrid {
    /// Visible width in pixels.
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// Shade at `(x, y)`, or `None` outside the grid.
    #[must_use]
    pub fn shade(&self, x: u16, y: u16) -> Option<Shade> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.shades
            .get(usize::from(y) * usize::from(self.width) + usize::from(x))
            .copied()
    }

    /// Row-major shades.
    #[must_use]
    pub fn shades(&self) -> &[Shade] {
        &self.shades
    }

    /// Surface rectangle the scaled grid covers.
    #[must_use]
    pub const fn bounds(&self) -> SurfaceRect {
        region_bounds(self.placement, self.width, self.height, self.scale)
    }

    /// Surface rectangle of pixel `(x, y)`, for presenters that fill rects.
    #[must_use]
    pub const fn pixel_rect(&self, x: u16, y: u16) -> SurfaceRect {
        SurfaceRect {
            x: self.placement.x + x as u32 * self.scale,
            y: self.placement.y + y as u32 * self.scale,
            w: self.scale,
            h: self.scale,
        }
    }
}

const fn region_bounds(placement: Placement, width: u16, height: u16, scale: u32) -> SurfaceRect {
    SurfaceRect {
        x: placement.x,
        y: placement.y,
        w: width as u32 * scale,
        h: height as u32 * scale,
    }
}

const fn bit_at(row: &[u8], x: usize) -> bool {
    row[x / 8] & (0x80 >> (x % 8)) != 0
}

/// Decodes `bytes` as one frame of `layout` in `mode`.
///
/// # Errors
///
/// Returns [`DisplayError`] when the stride is narrower than the visible
/// width or `bytes` does not cover every plane.
pub fn decode_frame(
    mode: DecodeMode,
    layout: FrameLayout,
    scale: u32,
    placement: Placement,
    bytes: &[u8],
) -> Result<FrameGrid, DisplayError> {
    layout.validate(mode, bytes.len())?;
    let row_bytes = layout.row_bytes();
    let plane_bytes = layout.plane_bytes();
    let mut shades = Vec::with_capacity(usize::from(layout.width) * usize::from(layout.height));
    for y in 0..usize::from(layout.height) {
        let start = y * row_bytes;
        let plane0 = &bytes[start..start + row_bytes];
        match mode {
            DecodeMode::Mono => {
                shades.extend((0..usize::from(layout.width)).map(|x| {
                    if bit_at(plane0, x) {
                        Shade::Set
                    } else {
                        Shade::Clear
                    }
                }));
            }
            DecodeMode::DualPlane => {
                let plane1 = &bytes[plane_bytes + start..plane_bytes + start + row_bytes];
                shades.extend((0..usize::from(layout.width)).map(|x| {
                    let level = DUAL_PLANE_LEVELS
                        - u8::from(bit_at(plane0, x))
                        - 2 * u8::from(bit_at(plane1, x));
                    Shade::Level(level)
                }));
            }
        }
    }
    Ok(FrameGrid {
        width: layout.width,
        height: layout.height,
        scale,
        placement,
        shades,
    })
}

/// Where a region's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionSource {
    /// Data memory starting at this 24-bit address, planes back to back.
    Data(u32),
    /// The LCD controller's own buffer, see [`CoreEngine::lcd_buffer`].
    LcdBuffer,
}

/// A display-memory region rendered onto the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayRegion {
    /// Short name shown by presenters.
    pub label: &'static str,
    /// Backing memory of the first plane.
    pub source: RegionSource,
    /// Pixel format.
    pub mode: DecodeMode,
    /// Geometry in memory.
    pub layout: FrameLayout,
    /// Surface pixels per region pixel.
    pub scale: u32,
    /// Surface position.
    pub placement: Placement,
}

impl DisplayRegion {
    /// Surface rectangle this region occupies.
    #[must_use]
    pub const fn bounds(&self) -> SurfaceRect {
        region_bounds(
            self.placement,
            self.layout.width,
            self.layout.height,
            self.scale,
        )
    }

    /// Copies the region's bytes out of the engine.
    ///
    /// Data-memory regions go through the engine's data accessor and stay
    /// within segment 0 of the profiles shipped here. An LCD buffer shorter
    /// than the layout yields a short copy, which [`DisplayRegion::decode`]
    /// rejects.
    pub fn read<E: CoreEngine + ?Sized>(&self, engine: &E) -> Vec<u8> {
        let len = self.layout.buffer_len(self.mode);
        match self.source {
            RegionSource::Data(base) => (0..len)
                .zip(base..)
                .map(|(_, address)| {
                    let (segment, offset) = split_data_address(address);
                    engine.read_data(segment, offset, DataWidth::Byte).to_le_bytes()[0]
                })
                .collect(),
            RegionSource::LcdBuffer => engine
                .lcd_buffer()
                .map(|buffer| buffer[..len.min(buffer.len())].to_vec())
                .unwrap_or_default(),
        }
    }

    /// Decodes the region from raw bytes already read.
    ///
    /// # Errors
    ///
    /// See [`decode_frame`].
    pub fn decode(&self, bytes: &[u8]) -> Result<FrameGrid, DisplayError> {
        decode_frame(self.mode, self.layout, self.scale, self.placement, bytes)
    }
}

/// Reads and decodes every region of `profile` under one guard, so all
/// regions come from the same instant of emulated time.
///
/// # Errors
///
/// Propagates the first region that fails to decode.
pub fn render_regions<E: CoreEngine>(
    core: &CoreGuard<'_, E>,
    profile: DeviceProfile,
) -> Result<Vec<FrameGrid>, DisplayError> {
    let engine = core.engine();
    profile
        .display_regions()
        .iter()
        .map(|region| region.decode(&region.read(engine)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        decode_frame, render_regions, DecodeMode, FrameLayout, Placement, Shade, SurfaceRect,
    };
    use crate::error::DisplayError;
    use crate::peripheral::PeripheralPorts;
    use crate::profile::{ControlConfig, DeviceProfile, Rgba, ROM_WINDOW_SIZE};
    use crate::state::ControlContext;
    use crate::testing::NullEngine;

    const ORIGIN: Placement = Placement { x: 0, y: 0 };

    #[test]
    fn mono_reads_msb_first() {
        let grid = decode_frame(
            DecodeMode::Mono,
            FrameLayout::new(8, 1),
            1,
            ORIGIN,
            &[0b1000_0001],
        )
        .expect("decode");
        assert_eq!(grid.shade(0, 0), Some(Shade::Set));
        assert_eq!(grid.shade(1, 0), Some(Shade::Clear));
        assert_eq!(grid.shade(7, 0), Some(Shade::Set));
        assert_eq!(grid.shade(8, 0), None);
    }

    #[test]
    fn stride_skips_reserved_columns() {
        // 8 visible pixels per 16-pixel row; the second byte of each row is padding.
        let layout = FrameLayout::new(8, 2).with_stride(16);
        let bytes = [0x00, 0xFF, 0x80, 0xFF];
        let grid = decode_frame(DecodeMode::Mono, layout, 1, ORIGIN, &bytes).expect("decode");
        assert!(grid.shades()[..8].iter().all(|s| *s == Shade::Clear));
        assert_eq!(grid.shade(0, 1), Some(Shade::Set));
        assert_eq!(grid.shade(1, 1), Some(Shade::Clear));
    }

    #[test]
    fn dual_plane_maps_bit_pairs_to_four_levels() {
        // plane0 row: 1 0 1 0 ..., plane1 row: 1 1 0 0 ...
        let layout = FrameLayout::new(4, 1).with_stride(8);
        let bytes = [0b1010_0000, 0b1100_0000];
        let grid = decode_frame(DecodeMode::DualPlane, layout, 1, ORIGIN, &bytes).expect("decode");
        assert_eq!(
            grid.shades(),
            &[
                Shade::Level(1),
                Shade::Level(2),
                Shade::Level(3),
                Shade::Level(4)
            ]
        );
    }

    #[test]
    fn dual_plane_second_plane_follows_first_plane_of_full_stride() {
        let layout = FrameLayout::new(8, 2).with_stride(16);
        let mut bytes = vec![0u8; layout.buffer_len(DecodeMode::DualPlane)];
        assert_eq!(bytes.len(), 8);
        // Row 1 of plane 1 starts at plane_bytes (4) + row_bytes (2).
        bytes[6] = 0x80;
        let grid = decode_frame(DecodeMode::DualPlane, layout, 1, ORIGIN, &bytes).expect("decode");
        assert_eq!(grid.shade(0, 1), Some(Shade::Level(2)));
        assert_eq!(grid.shade(0, 0), Some(Shade::Level(4)));
    }

    #[test]
    fn short_buffer_and_narrow_stride_are_rejected() {
        let layout = FrameLayout::new(16, 2);
        assert_eq!(
            decode_frame(DecodeMode::DualPlane, layout, 1, ORIGIN, &[0; 4]),
            Err(DisplayError::BufferTooShort {
                needed: 8,
                actual: 4
            })
        );
        assert_eq!(
            decode_frame(DecodeMode::Mono, layout.with_stride(8), 1, ORIGIN, &[0; 4]),
            Err(DisplayError::StrideTooNarrow {
                width: 16,
                stride: 8
            })
        );
    }

    #[test]
    fn placement_and_scale_position_pixels() {
        let placement = Placement { x: 304, y: 16 };
        let grid = decode_frame(DecodeMode::Mono, FrameLayout::new(8, 1), 3, placement, &[0])
            .expect("decode");
        assert_eq!(
            grid.bounds(),
            SurfaceRect {
                x: 304,
                y: 16,
                w: 24,
                h: 3
            }
        );
        assert_eq!(grid.pixel_rect(2, 0).x, 310);
    }

    #[test]
    fn shades_resolve_to_profile_colours_and_grey_ramp() {
        assert_eq!(
            Shade::Set.color(DeviceProfile::Esp),
            Rgba(127, 100, 180, 255)
        );
        assert_eq!(Shade::Level(4).color(DeviceProfile::Cwii), Rgba(252, 252, 252, 255));
        assert_eq!(Shade::Level(1).color(DeviceProfile::Cwii), Rgba(63, 63, 63, 255));
    }

    #[test]
    fn out_of_range_levels_clamp_to_lightest() {
        assert_eq!(
            Shade::Level(9).color(DeviceProfile::Cwii),
            Shade::Level(4).color(DeviceProfile::Cwii)
        );
    }

    fn window_slot(address: usize) -> usize {
        address - ROM_WINDOW_SIZE
    }

    #[test]
    fn esp_vram_read_covers_f800_through_f9ff() {
        let mut engine = NullEngine::default();
        engine.window[window_slot(0xF800)] = 0xA5;
        engine.window[window_slot(0xF9FF)] = 0x5A;
        engine.window[window_slot(0xFA00)] = 0xEE;

        let vram = DeviceProfile::Esp.display_regions()[0];
        let bytes = vram.read(&engine);
        assert_eq!(bytes.len(), 512);
        assert_eq!(bytes[0], 0xA5);
        assert_eq!(bytes[511], 0x5A);
    }

    #[test]
    fn cwii_vram_reads_both_planes_from_lcd_buffer() {
        let mut lcd = vec![0u8; 4096];
        lcd[0] = 0x80;
        lcd[2048] = 0x80;
        let mut engine = NullEngine {
            lcd: Some(lcd.clone()),
            ..NullEngine::default()
        };
        // Data memory at the mono VRAM address must not leak into the panel.
        engine.window[window_slot(0xF800)] = 0xFF;

        let vram = DeviceProfile::Cwii.display_regions()[0];
        let bytes = vram.read(&engine);
        assert_eq!(bytes, lcd);
        let grid = vram.decode(&bytes).expect("decode");
        assert_eq!(grid.shade(0, 0), Some(Shade::Level(1)));
        assert_eq!(grid.shade(1, 0), Some(Shade::Level(4)));
    }

    #[test]
    fn render_regions_reads_every_region_under_one_guard() {
        let mut engine = NullEngine {
            lcd: Some(vec![0; 4096]),
            ..NullEngine::default()
        };
        // First pixel of the screen buffer's plane 0.
        engine.window[window_slot(0xCA54)] = 0x80;
        let ctx = ControlContext::new(
            engine,
            Arc::new(PeripheralPorts::default()),
            ControlConfig::for_profile(DeviceProfile::Cwii),
        );

        let grids = render_regions(&ctx.lock(), DeviceProfile::Cwii).expect("render");
        assert_eq!(grids.len(), 3);
        assert_eq!(grids[0].shade(0, 0), Some(Shade::Level(4)));
        assert_eq!(grids[1].shade(0, 0), Some(Shade::Level(3)));
        assert_eq!(grids[2].shade(0, 0), Some(Shade::Level(4)));
    }

    #[test]
    fn missing_lcd_buffer_fails_to_render() {
        let ctx = ControlContext::new(
            NullEngine::default(),
            Arc::new(PeripheralPorts::default()),
            ControlConfig::for_profile(DeviceProfile::Cwii),
        );
        assert_eq!(
            render_regions(&ctx.lock(), DeviceProfile::Cwii),
            Err(DisplayError::BufferTooShort {
                needed: 4096,
                actual: 0
            })
        );
    }
}
