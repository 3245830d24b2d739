// THEORY:
// Change detection is the first pixel-level stage. Every pixel is compared against
// each reference colour, the nearest one wins, and if it is close enough the pixel
// becomes foreground. Two outputs are produced in the same pass:
// - a binary mask (255 foreground, 0 background) for morphology and labeling;
// - a false-colour visualization where each foreground pixel is painted with the
//   reference colour it matched.
//
// Both outputs are fully overwritten, so no state leaks between frames. The stage
// never reads any buffer other than its input.

use crate::core_modules::frame_buffer::{BufferRole, Image};
use crate::core_modules::palette::{ColorSpace, Palette};
use crate::core_modules::pixel::pixel::{CHANNELS, ColorDistance, Pixel};
use crate::error::Result;

/// Mask value for foreground pixels.
pub const FOREGROUND: u8 = 255;

/// Classifies pixels by nearest reference colour.
#[derive(Debug, Clone, Copy)]
pub struct ColorClassifier {
    color_space: ColorSpace,
    palette: Palette,
}

impl ColorClassifier {
    pub fn new(color_space: ColorSpace) -> Self {
        Self {
            color_space,
            palette: Palette::for_color_space(color_space),
        }
    }

    /// Same comparison with a caller-supplied palette.
    pub fn with_palette(color_space: ColorSpace, palette: Palette) -> Self {
        Self {
            color_space,
            palette,
        }
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Whether the input has to be converted to luma/chroma first.
    pub fn needs_conversion(&self) -> bool {
        self.color_space == ColorSpace::YCbCr
    }

    /// Writes the mask and visualization for `input` and returns the number of
    /// foreground pixels. A pixel is foreground iff its minimum palette distance is
    /// strictly below `threshold`.
    pub fn classify(
        &self,
        input: &Image,
        threshold: ColorDistance,
        mask: &mut Image,
        visualization: &mut Image,
    ) -> Result<usize> {
        let geometry = input.geometry();
        let color = geometry.with_channels(CHANNELS as u8);
        input.expect_geometry(BufferRole::Sensor, color)?;
        mask.expect_geometry(BufferRole::ChangeMask, color.with_channels(1))?;
        visualization.expect_geometry(BufferRole::Visualization, color)?;

        mask.fill(0);
        visualization.fill(0);

        let mut foreground = 0;
        let pixels = input.as_bytes().chunks_exact(CHANNELS);
        let painted = visualization.as_bytes_mut().chunks_exact_mut(CHANNELS);
        for ((src, flag), out) in pixels.zip(mask.as_bytes_mut().iter_mut()).zip(painted) {
            let Some(best) = self.palette.nearest(&Pixel::from(src)) else {
                continue;
            };
            if best.distance < threshold {
                *flag = FOREGROUND;
                out.copy_from_slice(&best.color.to_array());
                foreground += 1;
            }
        }
        Ok(foreground)
    }
}

/// Full-frame colour space conversion pass into `converted`.
pub fn convert_to_ycbcr(sensor: &Image, converted: &mut Image) -> Result<()> {
    let color = sensor.geometry().with_channels(CHANNELS as u8);
    sensor.expect_geometry(BufferRole::Sensor, color)?;
    converted.expect_geometry(BufferRole::Converted, color)?;

    for (src, dst) in sensor
        .as_bytes()
        .chunks_exact(CHANNELS)
        .zip(converted.as_bytes_mut().chunks_exact_mut(CHANNELS))
    {
        dst.copy_from_slice(&Pixel::from(src).to_ycbcr().to_array());
    }
    Ok(())
}

/// Writes the luma of every sensor pixel into a 1-channel image.
pub fn to_intensity(sensor: &Image, intensity: &mut Image) -> Result<()> {
    let color = sensor.geometry().with_channels(CHANNELS as u8);
    sensor.expect_geometry(BufferRole::Sensor, color)?;
    intensity.expect_geometry(BufferRole::Intensity, color.with_channels(1))?;

    for (src, dst) in sensor
        .as_bytes()
        .chunks_exact(CHANNELS)
        .zip(intensity.as_bytes_mut().iter_mut())
    {
        *dst = Pixel::from(src).luminance().round().clamp(0.0, 255.0) as u8;
    }
    Ok(())
}
