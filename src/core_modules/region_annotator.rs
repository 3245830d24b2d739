// THEORY:
// The annotator turns extracted regions into something a person (or a controller)
// can act on. For every region large enough to matter it decides which of the two
// target materials it is, then asks the drawing surface for a bounding box in that
// material's colour and a cross on the centroid.
//
// Key architectural principles:
// 1.  **One Strategy per Pipeline**: `ClassificationStrategy` is fixed at
//     construction. `CentroidSample` reads a single sensor pixel; `MajorityVote`
//     walks every run of the region and lets each pixel vote. Both compare the
//     blue and red channels of the same pixel, indexed the same way.
// 2.  **Bounded Traversal**: Voting is a fold over a `RunWalk`, which cannot follow
//     a chain forever. A chain that is cut short is reported and the region skipped.
// 3.  **Distrust External Data**: Statistics that cannot belong to this frame
//     (bounding box outside it, area larger than the box) skip the region with a
//     warning rather than driving reads or draws off the edge.

use crate::core_modules::drawing::{DisplayColor, DrawingSurface};
use crate::core_modules::frame_buffer::Image;
use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::region::{BoundingBox, Point, Region, RegionSet};
use crate::error::{PipelineError, Result};
use log::warn;
use serde::{Deserialize, Serialize};

/// Colour of the centroid cross, whatever the category.
pub const MARKER_COLOR: DisplayColor = DisplayColor::Red;

/// How a region's category is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStrategy {
    /// Sample the sensor pixel under the centroid.
    #[default]
    CentroidSample,
    /// Every pixel of every run votes; the sign of the sum decides.
    MajorityVote,
}

/// The two display categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionCategory {
    /// Blue channel dominates.
    Blue,
    /// Red channel dominates, or ties.
    Red,
}

impl RegionCategory {
    pub fn of_pixel(pixel: &Pixel) -> Self {
        if pixel.blue > pixel.red {
            RegionCategory::Blue
        } else {
            RegionCategory::Red
        }
    }

    /// +1 for blue, -1 for red.
    fn vote(self) -> i64 {
        match self {
            RegionCategory::Blue => 1,
            RegionCategory::Red => -1,
        }
    }

    pub fn color(self) -> DisplayColor {
        match self {
            RegionCategory::Blue => DisplayColor::Blue,
            RegionCategory::Red => DisplayColor::Red,
        }
    }
}

/// A region that was classified and drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotatedRegion {
    pub id: u32,
    pub category: RegionCategory,
    pub area: u32,
    pub centroid: Point,
    pub bbox: BoundingBox,
}

/// What the annotator did with one frame's regions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub annotated: Vec<AnnotatedRegion>,
    pub below_min_area: usize,
    pub malformed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RegionAnnotator {
    strategy: ClassificationStrategy,
    min_area: u32,
    cross_half_length: i32,
}

impl RegionAnnotator {
    pub fn new(strategy: ClassificationStrategy, min_area: u32, cross_half_length: i32) -> Self {
        Self {
            strategy,
            min_area,
            cross_half_length,
        }
    }

    pub fn strategy(&self) -> ClassificationStrategy {
        self.strategy
    }

    /// Classifies and draws every region with `area >= min_area`.
    pub fn annotate(
        &self,
        regions: &RegionSet,
        sensor: &Image,
        surface: &mut dyn DrawingSurface,
    ) -> AnnotationSummary {
        let mut summary = AnnotationSummary::default();
        for region in &regions.regions {
            if region.area < self.min_area {
                summary.below_min_area += 1;
                continue;
            }
            let category = region
                .validate(sensor.geometry())
                .and_then(|_| self.classify(region, regions, sensor));
            let category = match category {
                Ok(category) => category,
                Err(e) => {
                    warn!("skipping region {}: {}", region.id, e);
                    summary.malformed += 1;
                    continue;
                }
            };

            self.draw(region, category, surface);
            summary.annotated.push(AnnotatedRegion {
                id: region.id,
                category,
                area: region.area,
                centroid: region.centroid,
                bbox: region.bbox,
            });
        }
        summary
    }

    /// Category of one region under the configured strategy.
    pub fn classify(&self, region: &Region, regions: &RegionSet, sensor: &Image) -> Result<RegionCategory> {
        match self.strategy {
            ClassificationStrategy::CentroidSample => {
                let c = region.centroid;
                sample(sensor, c.x as i64, c.y as i64, region.id).map(|p| RegionCategory::of_pixel(&p))
            }
            ClassificationStrategy::MajorityVote => {
                if region.root.is_none() {
                    return Err(PipelineError::InconsistentRegion {
                        region: region.id,
                        reason: "no run data".into(),
                    });
                }
                let mut walk = regions.runs_of(region);
                let (votes, pixels) = walk.by_ref().try_fold((0i64, 0u64), |(votes, pixels), run| {
                    let votes = run.columns().try_fold(votes, |acc, column| {
                        let p = sample(sensor, column as i64, run.row as i64, region.id)?;
                        Ok::<_, PipelineError>(acc + RegionCategory::of_pixel(&p).vote())
                    })?;
                    Ok::<_, PipelineError>((votes, pixels + run.len() as u64))
                })?;
                walk.finish()?;
                if pixels != u64::from(region.area) {
                    return Err(PipelineError::InconsistentRegion {
                        region: region.id,
                        reason: format!("runs cover {} pixels, area is {}", pixels, region.area),
                    });
                }
                Ok(if votes > 0 {
                    RegionCategory::Blue
                } else {
                    RegionCategory::Red
                })
            }
        }
    }

    fn draw(&self, region: &Region, category: RegionCategory, surface: &mut dyn DrawingSurface) {
        let c = region.centroid;
        let h = self.cross_half_length;
        surface.draw_bounding_box(region.bbox, false, category.color());
        surface.draw_line(c.offset(-h, 0), c.offset(h, 0), MARKER_COLOR);
        surface.draw_line(c.offset(0, -h), c.offset(0, h), MARKER_COLOR);
    }
}

fn sample(sensor: &Image, x: i64, y: i64, region: u32) -> Result<Pixel> {
    u32::try_from(x)
        .ok()
        .zip(u32::try_from(y).ok())
        .and_then(|(x, y)| sensor.color_at(x, y))
        .ok_or_else(|| PipelineError::InconsistentRegion {
            region,
            reason: format!("pixel ({}, {}) is outside the sensor frame", x, y),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::drawing::{DrawCommand, DrawCommandLog};
    use crate::core_modules::region::Run;

    const BLUE: [u8; 3] = [200, 10, 20];
    const RED: [u8; 3] = [20, 10, 200];

    /// 10x4 sensor: columns 0..6 blue, 6..10 red.
    fn sensor() -> Image {
        let mut image = Image::new(10, 4, 3).unwrap();
        for y in 0..4 {
            for x in 0..10 {
                let p = if x < 6 { BLUE } else { RED };
                image.pixel_mut(x, y).unwrap().copy_from_slice(&p);
            }
        }
        image
    }

    /// One region: rows 0..4, columns 3..=8, chained row by row.
    fn region_set(centroid_x: i32) -> RegionSet {
        let runs = (0..4)
            .map(|row| Run {
                row,
                start_column: 3,
                end_column: 8,
                next: if row < 3 { Some(row as usize + 1) } else { None },
            })
            .collect();
        RegionSet {
            regions: vec![Region {
                id: 0,
                area: 24,
                centroid: Point::new(centroid_x, 1),
                bbox: BoundingBox::new(3, 0, 8, 3),
                root: Some(0),
            }],
            runs,
        }
    }

    #[test]
    fn region_below_min_area_draws_nothing() {
        let mut log = DrawCommandLog::new();
        let annotator = RegionAnnotator::new(ClassificationStrategy::CentroidSample, 25, 10);
        let summary = annotator.annotate(&region_set(5), &sensor(), &mut log);
        assert!(log.commands.is_empty());
        assert_eq!(summary.below_min_area, 1);
        assert!(summary.annotated.is_empty());
    }

    #[test]
    fn region_at_min_area_draws_one_box_and_two_lines() {
        let mut log = DrawCommandLog::new();
        let annotator = RegionAnnotator::new(ClassificationStrategy::CentroidSample, 24, 10);
        let summary = annotator.annotate(&region_set(5), &sensor(), &mut log);
        assert_eq!(log.boxes(), 1);
        assert_eq!(log.lines(), 2);
        assert_eq!(summary.annotated.len(), 1);

        assert_eq!(
            log.commands[0],
            DrawCommand::BoundingBox {
                bbox: BoundingBox::new(3, 0, 8, 3),
                filled: false,
                color: DisplayColor::Blue,
            }
        );
        assert_eq!(
            log.commands[1],
            DrawCommand::Line {
                from: Point::new(-5, 1),
                to: Point::new(15, 1),
                color: MARKER_COLOR,
            }
        );
        assert_eq!(
            log.commands[2],
            DrawCommand::Line {
                from: Point::new(5, -9),
                to: Point::new(5, 11),
                color: MARKER_COLOR,
            }
        );
    }

    #[test]
    fn centroid_sampling_reads_the_pixel_under_the_centroid() {
        let annotator = RegionAnnotator::new(ClassificationStrategy::CentroidSample, 1, 10);
        let set = region_set(7);
        let category = annotator.classify(&set.regions[0], &set, &sensor()).unwrap();
        assert_eq!(category, RegionCategory::Red);
    }

    #[test]
    fn majority_vote_counts_every_pixel() {
        // columns 3..=5 blue (3 per row), 6..=8 red (3 per row): a tie goes red
        let annotator = RegionAnnotator::new(ClassificationStrategy::MajorityVote, 1, 10);
        let mut set = region_set(5);
        assert_eq!(
            annotator.classify(&set.regions[0], &set, &sensor()).unwrap(),
            RegionCategory::Red
        );

        // shift the runs one column left: 4 blue vs 2 red per row
        for run in &mut set.runs {
            run.start_column = 2;
            run.end_column = 7;
        }
        assert_eq!(
            annotator.classify(&set.regions[0], &set, &sensor()).unwrap(),
            RegionCategory::Blue
        );
    }

    #[test]
    fn cyclic_run_chain_skips_the_region() {
        let mut set = region_set(5);
        set.runs[3].next = Some(0);
        let mut log = DrawCommandLog::new();
        let annotator = RegionAnnotator::new(ClassificationStrategy::MajorityVote, 1, 10);
        let summary = annotator.annotate(&set, &sensor(), &mut log);
        assert_eq!(summary.malformed, 1);
        assert!(log.commands.is_empty());
    }

    #[test]
    fn region_without_runs_is_reported_not_drawn() {
        let mut set = region_set(5);
        set.regions[0].root = None;
        set.runs.clear();
        let mut log = DrawCommandLog::new();
        let annotator = RegionAnnotator::new(ClassificationStrategy::MajorityVote, 1, 10);
        let summary = annotator.annotate(&set, &sensor(), &mut log);
        assert_eq!(summary.malformed, 1);
        assert!(summary.annotated.is_empty());
        assert!(log.commands.is_empty());
    }

    #[test]
    fn runs_disagreeing_with_area_are_reported() {
        // the chain covers 24 pixels
        let mut set = region_set(5);
        set.regions[0].area = 20;
        let annotator = RegionAnnotator::new(ClassificationStrategy::MajorityVote, 1, 10);
        let err = annotator.classify(&set.regions[0], &set, &sensor()).unwrap_err();
        assert!(matches!(err, PipelineError::InconsistentRegion { region: 0, .. }));

        let mut log = DrawCommandLog::new();
        let summary = annotator.annotate(&set, &sensor(), &mut log);
        assert_eq!(summary.malformed, 1);
        assert!(log.commands.is_empty());
    }

    #[test]
    fn inconsistent_statistics_skip_the_region() {
        let mut set = region_set(5);
        set.regions[0].bbox = BoundingBox::new(3, 0, 30, 3);
        let mut log = DrawCommandLog::new();
        let annotator = RegionAnnotator::new(ClassificationStrategy::CentroidSample, 1, 10);
        let summary = annotator.annotate(&set, &sensor(), &mut log);
        assert_eq!(summary.malformed, 1);
        assert!(log.commands.is_empty());
    }

    #[test]
    fn run_outside_the_frame_is_reported() {
        let mut set = region_set(5);
        set.runs[2].end_column = 40;
        let annotator = RegionAnnotator::new(ClassificationStrategy::MajorityVote, 1, 10);
        let err = annotator.classify(&set.regions[0], &set, &sensor()).unwrap_err();
        assert!(matches!(err, PipelineError::InconsistentRegion { region: 0, .. }));
    }
}
