// THEORY (single-pixel color math):
// The `pixel` module is the smallest unit of the engine: one RGB triple read out of a
// raw buffer, plus the handful of 1-dimensional transforms the diff kernels compare.
// Nothing here knows about neighbours, cells or time. Anything that needs two pixels
// lives in the delta kernels of `diff_algorithm`.
//
// Transforms offered:
// - Sum:           r + g + b, the cheapest brightness proxy (0..=765)
// - Grayscale:     Rec. 601 weighted luma, each term truncated before summing
// - HSV:           hue normalized to [0, 1), saturation and value in [0, 1]
// - Chromaticity:  each channel divided by the channel sum, rescaled to 0..256
//
// All channel values are plain `u8`. Floating point only appears in HSV and
// chromaticity, and both guard their division: an achromatic pixel has hue 0 and
// saturation 0, and a black pixel has no chromaticity at all.

use crate::core_modules::frame::ChannelOffsets;

pub type Channel = u8;
/// Sum of three 8-bit channels, 0..=765.
pub type ChannelSum = u16;
/// Hue as a fraction of a full turn, [0, 1).
pub type Hue = f32;

const RED_WEIGHT: f32 = 0.2989;
const GREEN_WEIGHT: f32 = 0.587;
const BLUE_WEIGHT: f32 = 0.114;
const CHROMATICITY_SCALE: f32 = 255.999;

/// A single pixel's color channels, independent of the buffer's byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
}

/// Hue, saturation and value, each normalized to `[0, 1]` (hue to `[0, 1)`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Hsv {
    pub hue: Hue,
    pub saturation: f32,
    pub value: f32,
}

impl Rgb {
    pub const fn new(red: Channel, green: Channel, blue: Channel) -> Self {
        Self { red, green, blue }
    }

    /// Reads the pixel starting at `offset` using the layout's channel order.
    #[inline]
    pub fn read(data: &[u8], offset: usize, channels: ChannelOffsets) -> Self {
        Self {
            red: data[offset + channels.red],
            green: data[offset + channels.green],
            blue: data[offset + channels.blue],
        }
    }

    #[inline]
    pub fn sum(self) -> ChannelSum {
        self.red as ChannelSum + self.green as ChannelSum + self.blue as ChannelSum
    }

    #[inline]
    pub fn is_black(self) -> bool {
        self.sum() == 0
    }

    /// Rec. 601 luma with each weighted term truncated, so pure white maps to 254.
    #[inline]
    pub fn grayscale(self) -> Channel {
        let red = (self.red as f32 * RED_WEIGHT) as u32;
        let green = (self.green as f32 * GREEN_WEIGHT) as u32;
        let blue = (self.blue as f32 * BLUE_WEIGHT) as u32;
        (red + green + blue) as Channel
    }

    /// Standard max/min HSV conversion.
    pub fn hsv(self) -> Hsv {
        let red = self.red as f32 / 255.0;
        let green = self.green as f32 / 255.0;
        let blue = self.blue as f32 / 255.0;

        let maximum_channel = red.max(green.max(blue));
        let minimum_channel = red.min(green.min(blue));

        if maximum_channel == minimum_channel {
            return Hsv {
                hue: 0.0,
                saturation: 0.0,
                value: maximum_channel,
            };
        }

        let chroma = maximum_channel - minimum_channel;
        let (base_difference, sector_offset) = if maximum_channel == red {
            (green - blue, 0.0)
        } else if maximum_channel == green {
            (blue - red, 2.0)
        } else {
            (red - green, 4.0)
        };

        let mut hue = ((base_difference / chroma + sector_offset) / 6.0).rem_euclid(1.0);
        if hue >= 1.0 {
            hue = 0.0;
        }

        Hsv {
            hue,
            saturation: chroma / maximum_channel,
            value: maximum_channel,
        }
    }

    /// Channel proportions rescaled to 0..256. Black has no chromaticity and maps
    /// to all zeros.
    pub fn chromaticity(self) -> [f32; 3] {
        let sum = self.sum() as f32;
        if sum == 0.0 {
            return [0.0; 3];
        }
        [
            self.red as f32 / sum * CHROMATICITY_SCALE,
            self.green as f32 / sum * CHROMATICITY_SCALE,
            self.blue as f32 / sum * CHROMATICITY_SCALE,
        ]
    }
}

impl Hsv {
    /// Shortest distance between two hues around the color wheel, in `[0, 0.5]`.
    pub fn hue_distance(&self, other: &Hsv) -> Hue {
        let direct = (self.hue - other.hue).abs();
        direct.min(1.0 - direct)
    }
}
