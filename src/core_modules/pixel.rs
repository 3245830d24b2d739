// THEORY:
// The `Pixel` module is the smallest unit of the vision system: a "dumb" value type
// for one colour sample as the camera delivers it, in blue-green-red byte order.
//
// Key architectural principles:
// 1.  **Sensor Order**: Channels are stored as B, G, R because that is how the sensor
//     buffer is laid out. Nothing here reorders bytes behind the caller's back.
// 2.  **Single-Pixel Scope**: Every method is computed from this pixel alone
//     (luma, luma/chroma conversion) or against one reference colour (distance).
//     Neighbourhood logic belongs to the morphology and region modules.
// 3.  **Wide Arithmetic**: Distances are summed in `i32`, so the worst case of
//     255 per channel over three channels can never overflow.

pub mod pixel {
    pub type Channel = u8;
    pub type Luminance = f64;
    pub type ColorDistance = i32;

    pub const CHANNELS: usize = 3;

    /// A single BGR sample.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Pixel {
        pub blue: Channel,
        pub green: Channel,
        pub red: Channel,
    }

    impl Pixel {
        pub const fn new(blue: Channel, green: Channel, red: Channel) -> Self {
            Self { blue, green, red }
        }

        /// Channels in buffer order.
        pub const fn to_array(self) -> [Channel; CHANNELS] {
            [self.blue, self.green, self.red]
        }

        /// Luminance estimate (Rec. 601 luma) on the 0..255 scale.
        pub fn luminance(&self) -> Luminance {
            0.299_f64 * self.red as f64 + 0.587_f64 * self.green as f64 + 0.114_f64 * self.blue as f64
        }

        /// Full-range luma/blue-difference/red-difference conversion.
        ///
        /// The result is packed into a `Pixel` so that it can live in a 3-channel
        /// buffer: slot 0 is Y, slot 1 is Cb, slot 2 is Cr.
        pub fn to_ycbcr(&self) -> Pixel {
            let (b, g, r) = (self.blue as f64, self.green as f64, self.red as f64);
            let y = 0.299 * r + 0.587 * g + 0.114 * b;
            let cb = 128.0 - 0.169 * r - 0.331 * g + 0.500 * b;
            let cr = 128.0 + 0.500 * r - 0.419 * g - 0.081 * b;
            Pixel::new(saturate(y), saturate(cb), saturate(cr))
        }

        /// Sum of absolute per-channel differences.
        pub fn color_distance(&self, other: &Pixel) -> ColorDistance {
            self.to_array()
                .iter()
                .zip(other.to_array().iter())
                .map(|(&a, &b)| (a as ColorDistance - b as ColorDistance).abs())
                .sum()
        }
    }

    impl From<&[Channel]> for Pixel {
        /// Reads the first three bytes of a sensor-ordered slice.
        fn from(bytes: &[Channel]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2])
        }
    }

    impl From<[Channel; CHANNELS]> for Pixel {
        fn from(bytes: [Channel; CHANNELS]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2])
        }
    }

    #[inline]
    fn saturate(value: f64) -> Channel {
        value.round().clamp(0.0, 255.0) as Channel
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;

    #[test]
    fn distance_is_zero_for_identical_pixels() {
        let p = Pixel::new(111, 80, 30);
        assert_eq!(p.color_distance(&p), 0);
    }

    #[test]
    fn distance_covers_full_byte_range_without_overflow() {
        let black = Pixel::new(0, 0, 0);
        let white = Pixel::new(255, 255, 255);
        assert_eq!(black.color_distance(&white), 765);
        assert_eq!(white.color_distance(&black), 765);
    }

    #[test]
    fn luminance_of_gray_is_its_level() {
        let gray = Pixel::new(100, 100, 100);
        assert!((gray.luminance() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn ycbcr_of_gray_has_neutral_chroma() {
        let ycc = Pixel::new(200, 200, 200).to_ycbcr();
        assert_eq!(ycc.blue, 200);
        assert!((ycc.green as i32 - 128).abs() <= 1);
        assert!((ycc.red as i32 - 128).abs() <= 1);
    }

    #[test]
    fn ycbcr_saturates_instead_of_wrapping() {
        // Pure blue pushes Cb above 255 before clamping.
        let ycc = Pixel::new(255, 0, 0).to_ycbcr();
        assert_eq!(ycc.green, 255);
    }
}
