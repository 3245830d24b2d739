// THEORY:
// The `pipeline` module is the top-level API of the engine. One call to
// `process_frame` takes the sensor frame the host has already written and runs it
// through every stage, strictly in order:
//
//   threshold mode -> (intensity + Otsu) -> (luma/chroma conversion)
//   -> change detection -> erode -> dilate -> 0/1 mask -> region extraction
//   -> classification and annotation -> status label -> publish visualization
//
// Key architectural principles:
// 1.  **Sequential Stages**: No stage starts before the previous one has finished
//     writing its buffer. There are no locks because there is nothing to race.
// 2.  **All or Nothing Output**: Change detection paints into the back
//     visualization buffer. It is published only after the last stage succeeds,
//     so a frame that aborts leaves the previous frame's visualization in place.
// 3.  **Collaborators at the Seams**: The region extractor is a type parameter and
//     the drawing surface an argument. The pipeline owns the buffers and the
//     threshold mode; everything else is borrowed per frame.

use crate::core_modules::color_classifier::{ColorClassifier, convert_to_ycbcr, to_intensity};
use crate::core_modules::drawing::{DisplayColor, DrawingSurface, TextSize};
use crate::core_modules::frame_buffer::{FrameBuffers, Image};
use crate::core_modules::morphology::morphology::{open_3x3, to_unit_mask};
use crate::core_modules::region::{Point, RegionExtractor};
use crate::core_modules::region_annotator::RegionAnnotator;
use crate::core_modules::region_labeler::RunLengthLabeler;
use crate::core_modules::threshold::{ResetHandle, ThresholdController, otsu_threshold};
use crate::error::{PipelineError, Result};
use image::RgbImage;
use log::debug;
use serde::{Deserialize, Serialize};

// Re-export key data structures for the public API.
pub use crate::core_modules::palette::ColorSpace;
pub use crate::core_modules::region_annotator::{AnnotatedRegion, ClassificationStrategy, RegionCategory};
pub use crate::core_modules::threshold::ThresholdMode;

/// Sensor maximum resolution.
pub const DEFAULT_WIDTH: u32 = 752;
pub const DEFAULT_HEIGHT: u32 = 480;

/// Configuration for the VisionPipeline. Fixed for the life of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub image_width: u32,
    pub image_height: u32,
    /// Rows and columns at each edge that morphology leaves as background.
    pub border: u32,
    /// Regions smaller than this are not annotated.
    pub min_region_area: u32,
    /// Half length of each arm of the centroid cross.
    pub cross_half_length: i32,
    pub color_space: ColorSpace,
    pub classification: ClassificationStrategy,
    /// Where the threshold mode text is drawn.
    pub label_x: i32,
    pub label_y: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_width: DEFAULT_WIDTH,
            image_height: DEFAULT_HEIGHT,
            border: 2,
            min_region_area: 500,
            cross_half_length: 10,
            color_space: ColorSpace::default(),
            classification: ClassificationStrategy::default(),
            label_x: 20,
            label_y: 20,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(PipelineError::InvalidGeometry {
                width: self.image_width,
                height: self.image_height,
                channels: 3,
            });
        }
        Ok(())
    }
}

/// Per-frame inputs supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameContext {
    /// Increases by one per captured frame; 1 marks the start of a run.
    pub frame_counter: u64,
    /// Distance threshold used while in `Manual` mode.
    pub manual_threshold: u16,
    /// Edge-triggered reset button.
    pub reset_requested: bool,
}

/// What happened during one processed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_counter: u64,
    pub mode: ThresholdMode,
    /// The distance threshold change detection compared against.
    pub threshold: u16,
    pub foreground_pixels: usize,
    pub regions_extracted: usize,
    pub annotated: Vec<AnnotatedRegion>,
    pub below_min_area: usize,
    pub malformed: usize,
}

/// The primary output of the vision pipeline for a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// First frame of a run: the threshold mode was reset and nothing else ran.
    Initialized,
    Processed(FrameReport),
}

/// The main, top-level struct for the vision engine.
#[derive(Debug)]
pub struct VisionPipeline<E: RegionExtractor = RunLengthLabeler> {
    config: PipelineConfig,
    buffers: FrameBuffers,
    classifier: ColorClassifier,
    annotator: RegionAnnotator,
    controller: ThresholdController,
    extractor: E,
}

impl VisionPipeline<RunLengthLabeler> {
    /// Pipeline with the built-in run-length labeler.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_extractor(config, RunLengthLabeler::new())
    }
}

impl<E: RegionExtractor> VisionPipeline<E> {
    pub fn with_extractor(config: PipelineConfig, extractor: E) -> Result<Self> {
        config.validate()?;
        let buffers = FrameBuffers::new(config.image_width, config.image_height)?;
        Ok(Self {
            classifier: ColorClassifier::new(config.color_space),
            annotator: RegionAnnotator::new(
                config.classification,
                config.min_region_area,
                config.cross_half_length,
            ),
            controller: ThresholdController::new(),
            buffers,
            extractor,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn buffers(&self) -> &FrameBuffers {
        &self.buffers
    }

    pub fn sensor(&self) -> &Image {
        &self.buffers.sensor
    }

    /// The host writes each captured frame here (BGR) before `process_frame`.
    pub fn sensor_mut(&mut self) -> &mut Image {
        &mut self.buffers.sensor
    }

    /// Copies an RGB frame into the sensor buffer.
    pub fn load_rgb_frame(&mut self, rgb: &RgbImage) -> Result<()> {
        self.buffers.sensor.copy_from_rgb_image(rgb)
    }

    /// Visualization of the last frame that completed.
    pub fn visualization(&self) -> &Image {
        self.buffers.visualization()
    }

    pub fn mode(&self) -> ThresholdMode {
        self.controller.mode()
    }

    /// Flips the threshold mode now, between frames.
    pub fn reset(&mut self) -> ThresholdMode {
        self.controller.toggle()
    }

    /// A handle another thread can use to press reset; applied at the next frame.
    pub fn reset_handle(&self) -> ResetHandle {
        self.controller.reset_handle()
    }

    pub fn process_frame(&mut self, ctx: &FrameContext, surface: &mut dyn DrawingSurface) -> Result<FrameOutcome> {
        // Stage 0: Threshold mode for this frame
        let mode = self.controller.begin_frame(ctx.frame_counter, ctx.reset_requested);
        if ctx.frame_counter == 1 {
            debug!("frame 1: threshold mode reset, frame not processed");
            return Ok(FrameOutcome::Initialized);
        }
        self.buffers.validate()?;

        // Stage 1: Active threshold (histogram threshold only when automatic)
        let buffers = &mut self.buffers;
        let threshold = self.controller.active_threshold(ctx.manual_threshold, || {
            to_intensity(&buffers.sensor, &mut buffers.intensity)?;
            otsu_threshold(&buffers.intensity)
        })?;

        // Stage 2: Change detection into the back visualization
        let converted = self.classifier.needs_conversion();
        if converted {
            convert_to_ycbcr(&buffers.sensor, &mut buffers.converted)?;
        }
        let (input, mask, visualization) = buffers.classification_views(converted);
        let foreground_pixels = self.classifier.classify(input, i32::from(threshold), mask, visualization)?;

        // Stage 3: Morphology, then the strictly 0/1 copy for extraction
        open_3x3(
            &buffers.change_mask,
            &mut buffers.eroded,
            &mut buffers.threshold,
            self.config.border,
        )?;
        to_unit_mask(&buffers.threshold, &mut buffers.labels)?;

        // Stage 4: Region extraction (external collaborator)
        let mut regions = self.extractor.label(&buffers.labels)?;
        self.extractor.compute_properties(&mut regions)?;

        // Stage 5: Classification, annotation and status label
        let summary = self.annotator.annotate(&regions, &buffers.sensor, surface);
        surface.draw_text(
            Point::new(self.config.label_x, self.config.label_y),
            TextSize::Small,
            DisplayColor::Cyan,
            mode.label(),
        );

        buffers.publish_visualization();

        debug!(
            "frame {}: {:?} threshold {}, {} foreground px, {} regions, {} annotated, {} small, {} malformed",
            ctx.frame_counter,
            mode,
            threshold,
            foreground_pixels,
            regions.len(),
            summary.annotated.len(),
            summary.below_min_area,
            summary.malformed
        );

        Ok(FrameOutcome::Processed(FrameReport {
            frame_counter: ctx.frame_counter,
            mode,
            threshold,
            foreground_pixels,
            regions_extracted: regions.len(),
            annotated: summary.annotated,
            below_min_area: summary.below_min_area,
            malformed: summary.malformed,
        }))
    }
}
