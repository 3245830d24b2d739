// THEORY:
// The palette is the list of colours the camera is looking for. It is compiled in,
// fixed for the life of the process, and comes in two flavours that match the two
// colour spaces change detection can run in. Selecting a `ColorSpace` selects both
// the input buffer (raw sensor vs. converted) and the palette values; the
// classification algorithm itself is the same for both.

use crate::core_modules::pixel::pixel::{ColorDistance, Pixel};
use serde::{Deserialize, Serialize};

/// Which colour space change detection compares in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    /// Raw sensor order (B, G, R).
    #[default]
    Bgr,
    /// Y, Cb, Cr computed from the sensor frame in a separate pass.
    YCbCr,
}

/// Reference colours of the two target materials, in sensor order.
const BGR_PALETTE: [Pixel; 2] = [Pixel::new(111, 80, 30), Pixel::new(27, 13, 138)];

/// The same materials measured in luma/chroma space (Y, Cb, Cr).
const YCBCR_PALETTE: [Pixel; 2] = [Pixel::new(60, 115, 165), Pixel::new(70, 145, 105)];

/// An ordered, immutable set of reference colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    colors: &'static [Pixel],
}

/// The closest palette entry to a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub index: usize,
    pub color: Pixel,
    pub distance: ColorDistance,
}

impl Palette {
    pub const fn for_color_space(space: ColorSpace) -> Self {
        match space {
            ColorSpace::Bgr => Self {
                colors: &BGR_PALETTE,
            },
            ColorSpace::YCbCr => Self {
                colors: &YCBCR_PALETTE,
            },
        }
    }

    pub const fn from_static(colors: &'static [Pixel]) -> Self {
        Self { colors }
    }

    pub fn colors(&self) -> &'static [Pixel] {
        self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Nearest reference colour. On equal distance the earlier entry wins.
    pub fn nearest(&self, pixel: &Pixel) -> Option<Match> {
        let mut best: Option<Match> = None;
        for (index, color) in self.colors.iter().enumerate() {
            let distance = pixel.color_distance(color);
            // strict `<` keeps the first minimum
            if best.is_none_or(|b| distance < b.distance) {
                best = Some(Match {
                    index,
                    color: *color,
                    distance,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_follows_color_space() {
        assert_eq!(Palette::for_color_space(ColorSpace::Bgr).colors(), &BGR_PALETTE);
        assert_eq!(Palette::for_color_space(ColorSpace::YCbCr).colors(), &YCBCR_PALETTE);
    }

    #[test]
    fn exact_colour_matches_its_entry() {
        let palette = Palette::for_color_space(ColorSpace::Bgr);
        let m = palette.nearest(&Pixel::new(27, 13, 138)).unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.distance, 0);
    }

    #[test]
    fn equidistant_pixel_resolves_to_first_entry() {
        static TWINS: [Pixel; 2] = [Pixel::new(10, 0, 0), Pixel::new(30, 0, 0)];
        let palette = Palette::from_static(&TWINS);
        for _ in 0..10 {
            let m = palette.nearest(&Pixel::new(20, 0, 0)).unwrap();
            assert_eq!(m.index, 0);
            assert_eq!(m.distance, 10);
        }
    }

    #[test]
    fn empty_palette_has_no_match() {
        let palette = Palette::from_static(&[]);
        assert!(palette.nearest(&Pixel::default()).is_none());
    }
}
