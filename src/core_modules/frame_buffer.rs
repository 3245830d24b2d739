// THEORY:
// The frame buffer set is the foundation the whole pipeline stands on. Every stage
// reads and writes flat byte buffers that describe the same `width x height` grid;
// only the channel count differs (3 for colour, 1 for masks and intensity).
//
// Key architectural principles:
// 1.  **One Geometry**: `Image` owns its width, height and channel count, and every
//     index computation goes through `offset`. Row stride and channel stride are
//     derived in exactly one place instead of at each call site.
// 2.  **Allocate Once**: `FrameBuffers` is built at start-up and overwritten every
//     frame. Nothing in the per-frame path resizes or reallocates a buffer.
// 3.  **Named Roles**: Buffers are addressed by a `BufferRole`, which is also what
//     geometry errors report, so a mismatch says which buffer is wrong.
// 4.  **Published Output**: The visualization is double buffered. Stages write into
//     the back buffer; the pipeline swaps it to the front only once a frame has
//     fully succeeded.

use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};
use crate::error::{PipelineError, Result};
use image::{GrayImage, RgbImage};
use std::fmt;

/// The logical role a buffer plays in one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Raw BGR frame written by the host.
    Sensor,
    /// Luma/chroma copy of the sensor frame.
    Converted,
    /// Foreground mask produced by change detection.
    ChangeMask,
    /// Scratch mask between erosion and dilation.
    Eroded,
    /// Cleaned foreground mask.
    Threshold,
    /// Strictly 0/1 copy of the cleaned mask for the region extractor.
    Labels,
    /// Grayscale image for the histogram threshold.
    Intensity,
    /// False-colour output shown to the user.
    Visualization,
}

/// Width, height and channel count of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl Geometry {
    pub const fn new(width: u32, height: u32, channels: u8) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn byte_len(&self) -> usize {
        self.pixel_count() * self.channels as usize
    }

    /// Same grid, different channel count.
    pub const fn with_channels(self, channels: u8) -> Self {
        Self::new(self.width, self.height, channels)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// A flat, row-major, channel-interleaved image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    geometry: Geometry,
    data: Vec<u8>,
}

impl Image {
    /// Allocates a zeroed image. Fails for empty grids or unusable channel counts.
    pub fn new(width: u32, height: u32, channels: u8) -> Result<Self> {
        let geometry = Geometry::new(width, height, channels);
        if width == 0 || height == 0 || channels == 0 || channels as usize > CHANNELS {
            return Err(PipelineError::InvalidGeometry {
                width,
                height,
                channels,
            });
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .ok_or(PipelineError::InvalidGeometry {
                width,
                height,
                channels,
            })?;
        Ok(Self {
            geometry,
            data: vec![0; geometry.byte_len()],
        })
    }

    /// Wraps an existing buffer, checking that its length matches the geometry.
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        let mut image = Self::new(width, height, channels)?;
        if data.len() != image.data.len() {
            return Err(PipelineError::InvalidGeometry {
                width,
                height,
                channels,
            });
        }
        image.data = data;
        Ok(image)
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn channels(&self) -> u8 {
        self.geometry.channels
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte offset of channel 0 of pixel `(x, y)`, or `None` outside the grid.
    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        Some((y as usize * self.geometry.width as usize + x as usize) * self.geometry.channels as usize)
    }

    /// All channels of pixel `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        let start = self.offset(x, y)?;
        self.data.get(start..start + self.geometry.channels as usize)
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> Option<&mut [u8]> {
        let start = self.offset(x, y)?;
        let channels = self.geometry.channels as usize;
        self.data.get_mut(start..start + channels)
    }

    /// A 3-channel pixel as a `Pixel`.
    pub fn color_at(&self, x: u32, y: u32) -> Option<Pixel> {
        if self.geometry.channels as usize != CHANNELS {
            return None;
        }
        self.pixel(x, y).map(Pixel::from)
    }

    /// First channel of pixel `(x, y)`; the whole value for 1-channel images.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        self.offset(x, y).map(|i| self.data[i])
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if let Some(i) = self.offset(x, y) {
            self.data[i] = value;
        }
    }

    /// One row of bytes.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let stride = self.geometry.width as usize * self.geometry.channels as usize;
        let start = self.offset(0, y)?;
        self.data.get(start..start + stride)
    }

    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    /// Zeroes every pixel within `margin` of an edge.
    pub fn clear_border(&mut self, margin: u32) {
        let Geometry { width, height, channels } = self.geometry;
        let stride = width as usize * channels as usize;
        let edge = margin.min(width) as usize * channels as usize;
        let (height, margin) = (height as usize, margin as usize);
        for (y, row) in self.data.chunks_exact_mut(stride).enumerate() {
            if y < margin || y + margin >= height {
                row.fill(0);
            } else {
                row[..edge].fill(0);
                row[stride - edge..].fill(0);
            }
        }
    }

    /// Number of pixels whose first channel is nonzero.
    pub fn count_nonzero(&self) -> usize {
        self.data
            .chunks_exact(self.geometry.channels as usize)
            .filter(|p| p[0] != 0)
            .count()
    }

    /// Fails with `GeometryMismatch` unless this image has the expected geometry.
    pub fn expect_geometry(&self, role: BufferRole, expected: Geometry) -> Result<()> {
        if self.geometry != expected {
            return Err(PipelineError::GeometryMismatch {
                role,
                expected,
                found: self.geometry,
            });
        }
        Ok(())
    }

    /// Copies an RGB image into sensor (BGR) order.
    pub fn from_rgb_image(rgb: &RgbImage) -> Result<Self> {
        let mut image = Self::new(rgb.width(), rgb.height(), 3)?;
        image.copy_from_rgb_image(rgb)?;
        Ok(image)
    }

    /// Overwrites this 3-channel image with an RGB image of the same size.
    pub fn copy_from_rgb_image(&mut self, rgb: &RgbImage) -> Result<()> {
        let expected = Geometry::new(rgb.width(), rgb.height(), 3);
        self.expect_geometry(BufferRole::Sensor, expected)?;
        for (dst, src) in self.data.chunks_exact_mut(3).zip(rgb.pixels()) {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
        }
        Ok(())
    }

    /// Converts back to RGB order. 1-channel images are expanded to gray.
    pub fn to_rgb_image(&self) -> RgbImage {
        let channels = self.geometry.channels as usize;
        let mut rgb = RgbImage::new(self.geometry.width, self.geometry.height);
        for (dst, src) in rgb.pixels_mut().zip(self.data.chunks_exact(channels)) {
            dst.0 = if channels == 3 {
                [src[2], src[1], src[0]]
            } else {
                [src[0]; 3]
            };
        }
        rgb
    }

    pub fn from_gray_image(gray: &GrayImage) -> Result<Self> {
        Self::from_raw(gray.width(), gray.height(), 1, gray.as_raw().clone())
    }

    pub fn to_gray_image(&self) -> Option<GrayImage> {
        if self.geometry.channels != 1 {
            return None;
        }
        GrayImage::from_raw(self.geometry.width, self.geometry.height, self.data.clone())
    }
}

/// The fixed set of buffers one pipeline run works on.
#[derive(Debug, Clone)]
pub struct FrameBuffers {
    pub sensor: Image,
    pub converted: Image,
    pub change_mask: Image,
    pub eroded: Image,
    pub threshold: Image,
    pub labels: Image,
    pub intensity: Image,
    visualization: Image,
    visualization_back: Image,
}

impl FrameBuffers {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let color = || Image::new(width, height, 3);
        let mask = || Image::new(width, height, 1);
        Ok(Self {
            sensor: color()?,
            converted: color()?,
            change_mask: mask()?,
            eroded: mask()?,
            threshold: mask()?,
            labels: mask()?,
            intensity: mask()?,
            visualization: color()?,
            visualization_back: color()?,
        })
    }

    /// Geometry of the colour buffers.
    pub fn geometry(&self) -> Geometry {
        self.visualization.geometry()
    }

    /// The last fully processed visualization.
    pub fn visualization(&self) -> &Image {
        &self.visualization
    }

    /// Back buffer the current frame renders into.
    pub fn visualization_back_mut(&mut self) -> &mut Image {
        &mut self.visualization_back
    }

    /// Makes the back buffer the visible one.
    pub fn publish_visualization(&mut self) {
        std::mem::swap(&mut self.visualization, &mut self.visualization_back);
    }

    /// Borrows what change detection needs at once: its input (the sensor frame or
    /// its luma/chroma copy), the change mask and the back visualization.
    pub fn classification_views(&mut self, converted: bool) -> (&Image, &mut Image, &mut Image) {
        let input = if converted { &self.converted } else { &self.sensor };
        (input, &mut self.change_mask, &mut self.visualization_back)
    }

    /// Checks every buffer against the expected geometry. The host can replace
    /// `sensor` wholesale, so this runs at the start of each frame.
    pub fn validate(&self) -> Result<()> {
        let color = self.geometry().with_channels(3);
        let mask = color.with_channels(1);
        self.sensor.expect_geometry(BufferRole::Sensor, color)?;
        self.converted.expect_geometry(BufferRole::Converted, color)?;
        self.change_mask.expect_geometry(BufferRole::ChangeMask, mask)?;
        self.eroded.expect_geometry(BufferRole::Eroded, mask)?;
        self.threshold.expect_geometry(BufferRole::Threshold, mask)?;
        self.labels.expect_geometry(BufferRole::Labels, mask)?;
        self.intensity.expect_geometry(BufferRole::Intensity, mask)?;
        self.visualization_back
            .expect_geometry(BufferRole::Visualization, color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_geometry() {
        assert!(matches!(
            Image::new(0, 10, 1),
            Err(PipelineError::InvalidGeometry { .. })
        ));
        assert!(Image::new(10, 10, 0).is_err());
        assert!(Image::new(10, 10, 4).is_err());
    }

    #[test]
    fn accessors_are_bounds_checked() {
        let mut image = Image::new(4, 3, 3).unwrap();
        assert!(image.pixel(3, 2).is_some());
        assert!(image.pixel(4, 0).is_none());
        assert!(image.pixel(0, 3).is_none());
        image.set(10, 10, 7);
        assert_eq!(image.count_nonzero(), 0);
    }

    #[test]
    fn offset_accounts_for_channel_stride() {
        let mut image = Image::new(5, 4, 3).unwrap();
        image.pixel_mut(2, 1).unwrap().copy_from_slice(&[1, 2, 3]);
        let start = (1 * 5 + 2) * 3;
        assert_eq!(&image.as_bytes()[start..start + 3], &[1, 2, 3]);
        assert_eq!(image.color_at(2, 1), Some(Pixel::new(1, 2, 3)));
    }

    #[test]
    fn clear_border_leaves_interior() {
        let mut image = Image::new(6, 6, 1).unwrap();
        image.fill(255);
        image.clear_border(2);
        assert_eq!(image.count_nonzero(), 4);
        assert_eq!(image.get(2, 2), Some(255));
        assert_eq!(image.get(1, 2), Some(0));
        assert_eq!(image.get(4, 3), Some(0));
    }

    #[test]
    fn clear_border_touches_every_channel_and_clamps_wide_margins() {
        let mut image = Image::new(5, 4, 3).unwrap();
        image.fill(9);
        image.clear_border(1);
        assert_eq!(image.pixel(4, 2), Some(&[0, 0, 0][..]));
        assert_eq!(image.pixel(2, 3), Some(&[0, 0, 0][..]));
        assert_eq!(image.pixel(1, 1), Some(&[9, 9, 9][..]));
        assert_eq!(image.count_nonzero(), 6);

        image.fill(9);
        image.clear_border(10);
        assert_eq!(image.count_nonzero(), 0);
    }

    #[test]
    fn gray_round_trip_keeps_values() {
        let mut gray = GrayImage::new(3, 2);
        gray.put_pixel(2, 1, image::Luma([42]));
        let image = Image::from_gray_image(&gray).unwrap();
        assert_eq!(image.channels(), 1);
        assert_eq!(image.get(2, 1), Some(42));
        assert_eq!(image.to_gray_image(), Some(gray));
        assert!(Image::new(3, 2, 3).unwrap().to_gray_image().is_none());
    }

    #[test]
    fn rgb_round_trip_swaps_to_sensor_order() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        let image = Image::from_rgb_image(&rgb).unwrap();
        assert_eq!(image.pixel(0, 0), Some(&[30, 20, 10][..]));
        assert_eq!(image.to_rgb_image().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn validate_reports_the_offending_role() {
        let mut buffers = FrameBuffers::new(8, 8).unwrap();
        assert!(buffers.validate().is_ok());
        buffers.sensor = Image::new(8, 7, 3).unwrap();
        match buffers.validate() {
            Err(PipelineError::GeometryMismatch { role, .. }) => assert_eq!(role, BufferRole::Sensor),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn publish_swaps_front_and_back() {
        let mut buffers = FrameBuffers::new(2, 2).unwrap();
        buffers.visualization_back_mut().fill(9);
        assert_eq!(buffers.visualization().count_nonzero(), 0);
        buffers.publish_visualization();
        assert_eq!(buffers.visualization().count_nonzero(), 4);
    }
}
