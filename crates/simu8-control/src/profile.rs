//! Target-device profiles and runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::display::{DecodeMode, DisplayRegion, FrameLayout, Placement, RegionSource};
use crate::engine::{InterruptSource, REGISTER_FILE_BYTES};

/// Upper bound on the per-frame cycle budget (300 MHz at 60 frames/s).
pub const MAX_CYCLES_PER_FRAME: u32 = 5_000_000;

/// Nominal frame cadence of the scheduler.
pub const FRAME_PERIOD: Duration = Duration::from_millis(16);

/// Delay between polls while the core idles.
pub const IDLE_DELAY: Duration = Duration::from_millis(2);

/// Period of the peripheral tick driver.
pub const PERIPHERAL_PERIOD: Duration = Duration::from_millis(1);

/// Peripheral ticks per timer update.
pub const DEFAULT_TIMER_DIVIDER: u32 = 1;

/// Size of the ROM code window mapped over the bottom of segment 0.
pub const ROM_WINDOW_SIZE: usize = 0x8000;

/// Bytes of data memory above the code window.
pub const DATA_WINDOW_SIZE: usize = 0x1_0000 - ROM_WINDOW_SIZE;

/// Fixed length of every snapshot blob.
pub const SNAPSHOT_LEN: usize = DATA_WINDOW_SIZE + REGISTER_FILE_BYTES;

/// Top-left corner of the LCD on the presentation surface.
pub const LCD_ORIGIN: Placement = Placement { x: 0, y: 16 };

/// Gap left between tiled display regions and below the LCD.
pub const REGION_GAP: u32 = 16;

/// Base address of the on-chip LCD controller VRAM.
const VRAM_ADDRESS: u32 = 0x00_F800;

/// RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

/// Calculator family being emulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DeviceProfile {
    /// ES PLUS series, 512 kHz, 96x32 STN panel.
    #[default]
    Esp,
    /// ClassWiz first generation, 1 MHz, 192x64 FSTN panel.
    Cwi,
    /// ClassWiz second generation, 2 MHz, 192x64 four-level panel.
    Cwii,
}

impl DeviceProfile {
    /// Cycles per frame at nominal clock speed.
    #[must_use]
    pub const fn nominal_cycles_per_frame(self) -> u32 {
        match self {
            Self::Esp => 524_088 / 60,
            Self::Cwi => 1_048_576 / 60,
            Self::Cwii => 2_097_152 / 60,
        }
    }

    /// Code address of the ROM self-check routine.
    #[must_use]
    pub const fn checksum_address(self) -> u32 {
        match self {
            Self::Esp => 0x0_4A9E,
            Self::Cwi => 0x2_22D4,
            // Not yet located for this family.
            Self::Cwii => 0,
        }
    }

    /// Default snapshot file name.
    #[must_use]
    pub const fn snapshot_file(self) -> &'static str {
        match self {
            Self::Esp => "state_esp.sav",
            Self::Cwi => "state_cwi.sav",
            Self::Cwii => "state_cwii.sav",
        }
    }

    /// Default ROM image name.
    #[must_use]
    pub const fn rom_file(self) -> &'static str {
        match self {
            Self::Esp => "rom_esp.bin",
            Self::Cwi => "rom_cwi.bin",
            Self::Cwii => "rom_cwii.bin",
        }
    }

    /// Pixel format of this family's display memory.
    #[must_use]
    pub const fn decode_mode(self) -> DecodeMode {
        match self {
            Self::Esp | Self::Cwi => DecodeMode::Mono,
            Self::Cwii => DecodeMode::DualPlane,
        }
    }

    /// Visible LCD geometry, including the VRAM row stride.
    #[must_use]
    pub const fn lcd_layout(self) -> FrameLayout {
        match self {
            Self::Esp => FrameLayout::new(96, 32).with_stride(128),
            Self::Cwi | Self::Cwii => FrameLayout::new(192, 64).with_stride(256),
        }
    }

    /// Surface pixels per LCD pixel.
    #[must_use]
    pub const fn pixel_scale(self) -> u32 {
        match self {
            Self::Esp => 3,
            Self::Cwi | Self::Cwii => 2,
        }
    }

    /// Mono-panel colours as `(set, clear)`.
    #[must_use]
    pub const fn mono_colors(self) -> (Rgba, Rgba) {
        match self {
            Self::Esp => (Rgba(127, 100, 180, 255), Rgba(192, 204, 180, 255)),
            Self::Cwi | Self::Cwii => (Rgba(64, 30, 64, 255), Rgba(216, 225, 204, 255)),
        }
    }

    /// Surface footprint of the scaled LCD as `(width, height)`.
    #[must_use]
    pub const fn lcd_extent(self) -> (u32, u32) {
        let layout = self.lcd_layout();
        let scale = self.pixel_scale();
        (layout.width as u32 * scale, layout.height as u32 * scale)
    }

    /// Display regions rendered for this family, tiled without overlap.
    ///
    /// The first region is always the LCD VRAM; the rest are firmware
    /// buffers worth watching while debugging.
    #[must_use]
    pub fn display_regions(self) -> Vec<DisplayRegion> {
        let mode = self.decode_mode();
        let scale = self.pixel_scale();
        let (lcd_w, lcd_h) = self.lcd_extent();
        let column = lcd_w + REGION_GAP;
        let lcd = self.lcd_layout();
        let vram = match self {
            Self::Esp | Self::Cwi => RegionSource::Data(VRAM_ADDRESS),
            // Both bit-planes live in the LCD controller, not in data memory.
            Self::Cwii => RegionSource::LcdBuffer,
        };
        let mut regions = vec![DisplayRegion {
            label: "vram",
            source: vram,
            mode,
            layout: lcd,
            scale,
            placement: LCD_ORIGIN,
        }];
        let visible = FrameLayout::new(lcd.width, lcd.height);
        let place = |x: u32, y: u32| LCD_ORIGIN.offset(x, y);
        match self {
            Self::Esp => {
                regions.push(DisplayRegion {
                    label: "screen buffer",
                    source: RegionSource::Data(0x00_87D0),
                    mode,
                    layout: visible,
                    scale,
                    placement: place(column, 0),
                });
                let page_bytes = u32::from(visible.width).div_ceil(8) * u32::from(visible.height);
                // Pages walk up from the bottom of RAM.
                let mut address = 0x00_8000;
                for page_column in 0..2u32 {
                    for page_row in 0..5u32 {
                        regions.push(DisplayRegion {
                            label: "stack page",
                            source: RegionSource::Data(address),
                            mode,
                            layout: visible,
                            scale,
                            placement: place(
                                column * (page_column + 1),
                                lcd_h + REGION_GAP + lcd_h * page_row,
                            ),
                        });
                        address += page_bytes;
                    }
                }
            }
            Self::Cwi | Self::Cwii => {
                let (first, second) = match self {
                    Self::Cwi => (0x00_DDD4, 0x00_E3D4),
                    _ => (0x00_CA54, 0x00_D654),
                };
                regions.push(DisplayRegion {
                    label: "screen buffer",
                    source: RegionSource::Data(first),
                    mode,
                    layout: visible,
                    scale,
                    placement: place(column, 0),
                });
                regions.push(DisplayRegion {
                    label: "back buffer",
                    source: RegionSource::Data(second),
                    mode,
                    layout: visible,
                    scale,
                    placement: place(column, lcd_h + REGION_GAP),
                });
            }
        }
        regions
    }
}

/// Which source wins when keyboard and timer are pending in the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InterruptPriority {
    /// Keyboard before timer; keeps key response at one frame.
    #[default]
    KeyboardFirst,
    /// Timer before keyboard.
    TimerFirst,
}

impl InterruptPriority {
    /// Sources in the order they are offered to the engine.
    #[must_use]
    pub const fn order(self) -> [InterruptSource; 2] {
        match self {
            Self::KeyboardFirst => [InterruptSource::Keyboard, InterruptSource::Timer],
            Self::TimerFirst => [InterruptSource::Timer, InterruptSource::Keyboard],
        }
    }
}

/// Runtime configuration for the control layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ControlConfig {
    /// Emulated calculator family.
    pub profile: DeviceProfile,
    /// Ceiling for speed-up requests.
    pub max_cycles_per_frame: u32,
    /// Peripheral ticks per timer update.
    pub timer_divider: u32,
    /// Real-time delay concluding each scheduler frame.
    pub frame_period: Duration,
    /// Delay per poll while the core idles.
    pub idle_delay: Duration,
    /// Period of the peripheral tick driver.
    pub peripheral_period: Duration,
    /// Arbitration between simultaneously pending interrupts.
    pub interrupt_priority: InterruptPriority,
    /// Snapshot file used by save/load commands.
    pub snapshot_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::for_profile(DeviceProfile::default())
    }
}

impl ControlConfig {
    /// Defaults for a given device family.
    #[must_use]
    pub fn for_profile(profile: DeviceProfile) -> Self {
        Self {
            profile,
            max_cycles_per_frame: MAX_CYCLES_PER_FRAME,
            timer_divider: DEFAULT_TIMER_DIVIDER,
            frame_period: FRAME_PERIOD,
            idle_delay: IDLE_DELAY,
            peripheral_period: PERIPHERAL_PERIOD,
            interrupt_priority: InterruptPriority::default(),
            snapshot_path: PathBuf::from(profile.snapshot_file()),
        }
    }

    /// Idle polls tolerated in one frame before the frame gives up stepping.
    #[must_use]
    pub fn idle_polls_per_frame(&self) -> u32 {
        if self.idle_delay.is_zero() {
            return 1;
        }
        let polls = self.frame_period.as_nanos() / self.idle_delay.as_nanos();
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{ControlConfig, DeviceProfile, InterruptPriority, ROM_WINDOW_SIZE, SNAPSHOT_LEN};
    use crate::display::{DecodeMode, RegionSource};
    use crate::engine::InterruptSource;

    #[rstest]
    #[case(DeviceProfile::Esp, 8734, 0x0_4A9E, DecodeMode::Mono)]
    #[case(DeviceProfile::Cwi, 17476, 0x2_22D4, DecodeMode::Mono)]
    #[case(DeviceProfile::Cwii, 34952, 0, DecodeMode::DualPlane)]
    fn profile_constants_match_device_families(
        #[case] profile: DeviceProfile,
        #[case] cycles: u32,
        #[case] checksum: u32,
        #[case] mode: DecodeMode,
    ) {
        assert_eq!(profile.nominal_cycles_per_frame(), cycles);
        assert_eq!(profile.checksum_address(), checksum);
        assert_eq!(profile.decode_mode(), mode);
    }

    #[rstest]
    #[case(DeviceProfile::Esp)]
    #[case(DeviceProfile::Cwi)]
    #[case(DeviceProfile::Cwii)]
    fn display_regions_never_overlap(#[case] profile: DeviceProfile) {
        let regions = profile.display_regions();
        assert_eq!(regions[0].label, "vram");
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                assert!(
                    !a.bounds().overlaps(&b.bounds()),
                    "{} at {:?} overlaps {} at {:?}",
                    a.label,
                    a.placement,
                    b.label,
                    b.placement
                );
            }
        }
    }

    #[rstest]
    #[case(DeviceProfile::Esp)]
    #[case(DeviceProfile::Cwi)]
    #[case(DeviceProfile::Cwii)]
    fn data_regions_stay_inside_the_segment_zero_window(#[case] profile: DeviceProfile) {
        for region in profile.display_regions() {
            if let RegionSource::Data(base) = region.source {
                let end = base as usize + region.layout.buffer_len(region.mode);
                assert!(
                    base as usize >= ROM_WINDOW_SIZE && end <= 0x1_0000,
                    "{} spans {base:06X}..{end:06X}",
                    region.label
                );
            }
        }
    }

    #[rstest]
    #[case(DeviceProfile::Esp, RegionSource::Data(0xF800), 512)]
    #[case(DeviceProfile::Cwi, RegionSource::Data(0xF800), 2048)]
    #[case(DeviceProfile::Cwii, RegionSource::LcdBuffer, 4096)]
    fn vram_region_source_and_size(
        #[case] profile: DeviceProfile,
        #[case] source: RegionSource,
        #[case] len: usize,
    ) {
        let vram = profile.display_regions()[0];
        assert_eq!(vram.source, source);
        assert_eq!(vram.layout.buffer_len(vram.mode), len);
    }

    #[test]
    fn esp_tiles_two_columns_of_stack_pages() {
        let regions = DeviceProfile::Esp.display_regions();
        let pages: Vec<_> = regions.iter().filter(|r| r.label == "stack page").collect();
        assert_eq!(pages.len(), 10);
        assert_eq!(pages[0].source, RegionSource::Data(0x8000));
        assert_eq!(pages[1].source, RegionSource::Data(0x8000 + 96 * 32 / 8));
    }

    #[test]
    fn default_config_uses_profile_snapshot_and_keyboard_priority() {
        let config = ControlConfig::default();
        assert_eq!(config.profile, DeviceProfile::Esp);
        assert_eq!(config.snapshot_path.to_str(), Some("state_esp.sav"));
        assert_eq!(config.interrupt_priority, InterruptPriority::KeyboardFirst);
        assert_eq!(config.idle_polls_per_frame(), 8);
        assert_eq!(SNAPSHOT_LEN, 0x8000 + 40);
    }

    #[test]
    fn priority_order_lists_both_sources() {
        assert_eq!(
            InterruptPriority::TimerFirst.order(),
            [InterruptSource::Timer, InterruptSource::Keyboard]
        );
    }
}
