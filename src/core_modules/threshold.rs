// THEORY:
// Two things decide how strict change detection is: the operator's fixed threshold
// and an automatic one derived from the image itself. This module owns both halves:
//
// 1.  **Mode Controller**: `ThresholdController` is a two-state machine
//     (`Automatic`, `Manual`). The reset button flips it unconditionally; the first
//     frame of a run forces it back to `Automatic`. The state lives in the
//     controller, not in a global, so the transitions can be driven and tested
//     on their own.
// 2.  **Asynchronous Reset**: The button may be pressed from another thread while a
//     frame is in flight. `ResetHandle` only counts presses; the controller applies
//     them at the next frame boundary, one flip per press.
// 3.  **Histogram Threshold**: `otsu_threshold` builds a 256-bin intensity histogram
//     and picks the split `K` that maximizes the between-class variance
//     `w0 * w1 * (mu0 - mu1)^2`, where class 0 holds intensities below `K`.
//     Candidates with an empty class are skipped; on ties the smallest `K` wins.

use crate::core_modules::color_classifier::FOREGROUND;
use crate::core_modules::frame_buffer::{BufferRole, Image};
use crate::error::Result;
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub type Histogram = [u32; 256];

/// Which threshold change detection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdMode {
    /// Histogram threshold computed from the current frame.
    #[default]
    Automatic,
    /// The operator's fixed value.
    Manual,
}

impl ThresholdMode {
    pub fn toggled(self) -> Self {
        match self {
            ThresholdMode::Automatic => ThresholdMode::Manual,
            ThresholdMode::Manual => ThresholdMode::Automatic,
        }
    }

    /// Status text shown on the visualization.
    pub fn label(self) -> &'static str {
        match self {
            ThresholdMode::Manual => "manual threshold",
            ThresholdMode::Automatic => " Otsu's threshold",
        }
    }
}

/// Thread-safe handle for requesting a mode toggle from outside the frame loop.
#[derive(Debug, Clone, Default)]
pub struct ResetHandle {
    pending: Arc<AtomicU32>,
}

impl ResetHandle {
    /// Records one press of the reset button.
    pub fn request(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    fn take(&self) -> u32 {
        self.pending.swap(0, Ordering::AcqRel)
    }
}

/// Owns the threshold mode and its transition rules.
#[derive(Debug, Default)]
pub struct ThresholdController {
    mode: ThresholdMode,
    resets: ResetHandle,
}

impl ThresholdController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ThresholdMode {
        self.mode
    }

    /// A handle whose presses are applied at the next `begin_frame`.
    pub fn reset_handle(&self) -> ResetHandle {
        self.resets.clone()
    }

    /// Flips the mode immediately.
    pub fn toggle(&mut self) -> ThresholdMode {
        self.mode = self.mode.toggled();
        info!("threshold mode switched to {:?}", self.mode);
        self.mode
    }

    /// Frame boundary: applies pending resets (plus `reset_requested`), then the
    /// run-start rule. Returns the mode in force for this frame.
    pub fn begin_frame(&mut self, frame_counter: u64, reset_requested: bool) -> ThresholdMode {
        let presses = self.resets.take() + reset_requested as u32;
        for _ in 0..presses {
            self.toggle();
        }
        if frame_counter == 1 && self.mode != ThresholdMode::Automatic {
            info!("frame 1: threshold mode forced to Automatic");
            self.mode = ThresholdMode::Automatic;
        }
        self.mode
    }

    /// The threshold change detection should use this frame. The histogram
    /// threshold is only computed in `Automatic` mode.
    pub fn active_threshold(&self, manual: u16, intensity: impl FnOnce() -> Result<u8>) -> Result<u16> {
        match self.mode {
            ThresholdMode::Manual => Ok(manual),
            ThresholdMode::Automatic => intensity().map(u16::from),
        }
    }
}

/// 256-bin histogram over the first channel of every pixel.
pub fn histogram(image: &Image) -> Histogram {
    let mut bins = [0u32; 256];
    for pixel in image.as_bytes().chunks_exact(image.channels() as usize) {
        bins[pixel[0] as usize] += 1;
    }
    bins
}

/// Otsu's method over an intensity image. Returns 0 when no split has two
/// non-empty classes (a flat image).
pub fn otsu_threshold(intensity: &Image) -> Result<u8> {
    let geometry = intensity.geometry().with_channels(1);
    intensity.expect_geometry(BufferRole::Intensity, geometry)?;
    Ok(otsu_from_histogram(&histogram(intensity)))
}

/// Otsu's method on a prepared histogram. Class 0 is `[0, K)`, class 1 is `[K, 255]`.
pub fn otsu_from_histogram(hist: &Histogram) -> u8 {
    let total_weight: f64 = hist.iter().map(|&h| h as f64).sum();
    let total_moment: f64 = hist.iter().enumerate().map(|(i, &h)| i as f64 * h as f64).sum();

    let mut best = 0.0f64;
    let mut best_k = 0u8;
    let mut w0 = 0.0f64;
    let mut m0 = 0.0f64;

    for k in 0..=255usize {
        // class 0 holds [0, k)
        if k > 0 {
            w0 += hist[k - 1] as f64;
            m0 += (k - 1) as f64 * hist[k - 1] as f64;
        }
        let w1 = total_weight - w0;
        if w0 == 0.0 || w1 == 0.0 {
            continue;
        }
        let mu0 = m0 / w0;
        let mu1 = (total_moment - m0) / w1;
        let between = w0 * w1 * (mu0 - mu1) * (mu0 - mu1);
        if between > best {
            best = between;
            best_k = k as u8;
        }
    }

    debug!("otsu threshold {} (between-class variance {:.1})", best_k, best);
    best_k
}

/// Grayscale segmentation: interior pixels darker than `threshold` become
/// foreground. Everything else, including the border, is background.
pub fn binarize(intensity: &Image, threshold: u8, border: u32, output: &mut Image) -> Result<()> {
    let geometry = intensity.geometry().with_channels(1);
    intensity.expect_geometry(BufferRole::Intensity, geometry)?;
    output.expect_geometry(BufferRole::Threshold, geometry)?;

    output.fill(0);
    let (width, height) = (geometry.width, geometry.height);
    for y in border..height.saturating_sub(border) {
        for x in border..width.saturating_sub(border) {
            if intensity.get(x, y).is_some_and(|v| v < threshold) {
                output.set(x, y, FOREGROUND);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn starts_automatic() {
        assert_eq!(ThresholdController::new().mode(), ThresholdMode::Automatic);
    }

    #[test]
    fn two_resets_round_trip() {
        let mut controller = ThresholdController::new();
        assert_eq!(controller.begin_frame(2, true), ThresholdMode::Manual);
        assert_eq!(controller.begin_frame(3, true), ThresholdMode::Automatic);
        assert_eq!(controller.begin_frame(4, false), ThresholdMode::Automatic);
    }

    #[test]
    fn first_frame_forces_automatic() {
        let mut controller = ThresholdController::new();
        controller.toggle();
        assert_eq!(controller.mode(), ThresholdMode::Manual);
        assert_eq!(controller.begin_frame(1, false), ThresholdMode::Automatic);

        // A press on frame 1 is overridden as well.
        assert_eq!(controller.begin_frame(1, true), ThresholdMode::Automatic);
    }

    #[test]
    fn mode_persists_without_reset() {
        let mut controller = ThresholdController::new();
        controller.begin_frame(5, true);
        for frame in 6..20 {
            assert_eq!(controller.begin_frame(frame, false), ThresholdMode::Manual);
        }
    }

    #[test]
    fn handle_presses_apply_at_frame_boundary() {
        let mut controller = ThresholdController::new();
        let handle = controller.reset_handle();
        handle.request();
        assert_eq!(controller.mode(), ThresholdMode::Automatic);
        assert_eq!(controller.begin_frame(2, false), ThresholdMode::Manual);

        let remote = handle.clone();
        std::thread::spawn(move || {
            remote.request();
            remote.request();
        })
        .join()
        .unwrap();
        assert_eq!(controller.begin_frame(3, false), ThresholdMode::Manual);
        handle.request();
        assert_eq!(controller.begin_frame(4, false), ThresholdMode::Automatic);
    }

    #[test]
    fn labels_follow_mode() {
        assert_eq!(ThresholdMode::Manual.label(), "manual threshold");
        assert_eq!(ThresholdMode::Automatic.label(), " Otsu's threshold");
    }

    #[test]
    fn active_threshold_only_computes_histogram_when_automatic() {
        let mut controller = ThresholdController::new();
        assert_eq!(controller.active_threshold(40, || Ok(99)).unwrap(), 99);
        controller.toggle();
        let manual = controller.active_threshold(40, || panic!("histogram not needed"));
        assert_eq!(manual.unwrap(), 40);
    }

    #[test]
    fn bimodal_histogram_splits_between_modes() {
        let mut hist = [0u32; 256];
        hist[10] = 1000;
        hist[200] = 1000;
        let k = otsu_from_histogram(&hist);
        assert!(k > 10 && k < 200, "k = {}", k);
        assert_eq!(k, 11);
    }

    #[test]
    fn flat_histogram_never_divides_by_zero() {
        let mut hist = [0u32; 256];
        hist[128] = 500;
        assert_eq!(otsu_from_histogram(&hist), 0);
        assert_eq!(otsu_from_histogram(&[0u32; 256]), 0);
    }

    #[test]
    fn unequal_modes_pick_a_split_between_them() {
        let mut hist = [0u32; 256];
        for i in 20..40 {
            hist[i] = 50;
        }
        for i in 150..180 {
            hist[i] = 80;
        }
        let k = otsu_from_histogram(&hist);
        assert!(k >= 40 && k <= 150, "k = {}", k);
    }

    #[test]
    fn otsu_on_image_matches_histogram_version() {
        let mut data = vec![10u8; 50];
        data.extend(std::iter::repeat(200u8).take(50));
        let image = Image::from_raw(10, 10, 1, data).unwrap();
        assert_eq!(histogram(&image)[10], 50);
        assert_eq!(otsu_threshold(&image).unwrap(), 11);
    }

    #[test]
    fn otsu_rejects_colour_input() {
        let image = Image::new(4, 4, 3).unwrap();
        assert!(matches!(otsu_threshold(&image), Err(PipelineError::GeometryMismatch { .. })));
    }

    #[test]
    fn binarize_marks_dark_interior_pixels() {
        let mut intensity = Image::new(6, 6, 1).unwrap();
        intensity.fill(200);
        intensity.set(2, 2, 5);
        intensity.set(0, 0, 5);
        let mut output = Image::new(6, 6, 1).unwrap();
        output.fill(1);
        binarize(&intensity, 100, 2, &mut output).unwrap();
        assert_eq!(output.count_nonzero(), 1);
        assert_eq!(output.get(2, 2), Some(255));
    }
}
