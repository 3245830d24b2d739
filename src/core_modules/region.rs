// THEORY:
// Regions are produced outside the core, by whatever connected-component labeler the
// host links in. This module defines the shape of that data and the interface the
// pipeline calls, and nothing about how labeling is done.
//
// A region is described by its statistics (area, centroid, bounding box) and by the
// horizontal runs that make it up. Runs are stored once per frame in a flat table
// and chained through `next` indices, the same way a labeler naturally emits them.
// Walking a chain is the one place where bad external data could hang the pipeline,
// so `RunWalk` is bounded: a chain can never be longer than the run table, and a
// walk that reaches that cap or a dangling index stops and reports it.

use crate::core_modules::frame_buffer::{Geometry, Image};
use crate::error::{PipelineError, Result};

/// A pixel coordinate. Signed so that marker geometry may extend past the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Inclusive, axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i64 {
        self.right as i64 - self.left as i64 + 1
    }

    pub fn height(&self) -> i64 {
        self.bottom as i64 - self.top as i64 + 1
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }

    /// Grows the box to include `p`.
    pub fn include(&mut self, p: Point) {
        self.left = self.left.min(p.x);
        self.top = self.top.min(p.y);
        self.right = self.right.max(p.x);
        self.bottom = self.bottom.max(p.y);
    }
}

pub type RunId = usize;

/// A horizontal span `[start_column, end_column]` of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub row: u32,
    pub start_column: u32,
    pub end_column: u32,
    /// Next run of the same region, `None` at the end of the chain.
    pub next: Option<RunId>,
}

impl Run {
    pub fn len(&self) -> u32 {
        if self.is_empty() {
            return 0;
        }
        self.end_column - self.start_column + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end_column < self.start_column
    }

    /// Columns covered by the run.
    pub fn columns(&self) -> std::ops::RangeInclusive<u32> {
        self.start_column..=self.end_column
    }
}

/// One connected component and its statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: u32,
    pub area: u32,
    pub centroid: Point,
    pub bbox: BoundingBox,
    /// First run of the chain.
    pub root: Option<RunId>,
}

impl Region {
    /// Checks that the statistics can describe a region of a frame of this size.
    pub fn validate(&self, geometry: Geometry) -> Result<()> {
        let inconsistent = |reason: String| {
            Err(PipelineError::InconsistentRegion {
                region: self.id,
                reason,
            })
        };
        let frame = BoundingBox::new(0, 0, geometry.width as i32 - 1, geometry.height as i32 - 1);
        let b = self.bbox;
        if b.left > b.right || b.top > b.bottom {
            return inconsistent(format!("inverted bounding box {:?}", b));
        }
        if !frame.contains(Point::new(b.left, b.top)) || !frame.contains(Point::new(b.right, b.bottom)) {
            return inconsistent(format!("bounding box {:?} outside the frame", b));
        }
        if self.area == 0 || self.area as i64 > b.width() * b.height() {
            return inconsistent(format!("area {} does not fit bounding box {:?}", self.area, b));
        }
        if !b.contains(self.centroid) {
            return inconsistent(format!("centroid {:?} outside bounding box", self.centroid));
        }
        Ok(())
    }
}

/// All regions of one frame plus their shared run table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionSet {
    pub regions: Vec<Region>,
    pub runs: Vec<Run>,
}

impl RegionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Bounded walk over a region's run chain.
    pub fn runs_of(&self, region: &Region) -> RunWalk<'_> {
        RunWalk::new(&self.runs, region)
    }
}

/// Forward-only iterator over a run chain, capped at the size of the run table.
#[derive(Debug)]
pub struct RunWalk<'a> {
    table: &'a [Run],
    cursor: Option<RunId>,
    remaining: usize,
    region: u32,
    broken: bool,
}

impl<'a> Iterator for RunWalk<'a> {
    type Item = &'a Run;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let Some(run) = self.table.get(id).filter(|_| self.remaining > 0) else {
            self.broken = true;
            self.cursor = None;
            return None;
        };
        self.remaining -= 1;
        self.cursor = run.next;
        Some(run)
    }
}

impl<'a> RunWalk<'a> {
    pub fn new(table: &'a [Run], region: &Region) -> Self {
        Self {
            table,
            cursor: region.root,
            remaining: table.len(),
            region: region.id,
            broken: false,
        }
    }

    /// After the walk: fails if the chain was cut short by the cap or a bad index.
    pub fn finish(self) -> Result<()> {
        if self.broken {
            return Err(PipelineError::MalformedRunChain {
                region: self.region,
            });
        }
        Ok(())
    }
}

/// The connected-component labeler the pipeline delegates to.
pub trait RegionExtractor {
    /// Labels a strictly 0/1 image into regions with run chains.
    fn label(&mut self, binary: &Image) -> Result<RegionSet>;

    /// Fills in area, centroid and bounding box of every region.
    fn compute_properties(&mut self, regions: &mut RegionSet) -> Result<()>;
}
