// THEORY:
// `RunLengthLabeler` is the stock `RegionExtractor`: a run-based connected-component
// labeler for strictly binary images. The pipeline only depends on the trait, so a
// host with its own labeler (or a hardware one) can swap it out.
//
// Algorithm:
// 1.  **Run Extraction**: Each row is scanned into maximal horizontal runs of 1s.
// 2.  **Merging**: A run is merged with every run of the previous row whose column
//     span overlaps it (4-connectivity), using a union-find over run indices.
// 3.  **Chaining**: Runs keep their scan order (row, then column). Each run is linked
//     to the next run of the same component, and component ids are assigned in the
//     order their first run was seen.
// 4.  **Properties**: A second, separate step walks each chain to compute area,
//     truncated-mean centroid and bounding box.

use crate::core_modules::frame_buffer::Image;
use crate::core_modules::region::{BoundingBox, Point, Region, RegionExtractor, RegionSet, Run, RunWalk};
use crate::error::{PipelineError, Result};
use log::debug;

/// Run-based 4-connected labeler.
#[derive(Debug, Default)]
pub struct RunLengthLabeler {
    parent: Vec<usize>,
}

impl RunLengthLabeler {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // keep the earlier run as root so ids follow scan order
            let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[drop] = keep;
        }
    }
}

impl RegionExtractor for RunLengthLabeler {
    fn label(&mut self, binary: &Image) -> Result<RegionSet> {
        if binary.channels() != 1 {
            return Err(PipelineError::Extraction(format!(
                "expected a 1-channel image, got {}",
                binary.geometry()
            )));
        }

        let mut runs: Vec<Run> = Vec::new();
        let mut previous_row = 0..0;
        self.parent.clear();

        for y in 0..binary.height() {
            let Some(row) = binary.row(y) else { break };
            let row_start = runs.len();
            let mut x = 0usize;
            while x < row.len() {
                match row[x] {
                    0 => x += 1,
                    1 => {
                        let start = x;
                        while x < row.len() && row[x] == 1 {
                            x += 1;
                        }
                        runs.push(Run {
                            row: y,
                            start_column: start as u32,
                            end_column: (x - 1) as u32,
                            next: None,
                        });
                        self.parent.push(runs.len() - 1);
                    }
                    other => {
                        return Err(PipelineError::Extraction(format!(
                            "pixel ({}, {}) has value {}, image must be 0/1",
                            x, y, other
                        )));
                    }
                }
            }

            for current in row_start..runs.len() {
                for above in previous_row.clone() {
                    let (a, c) = (runs[above], runs[current]);
                    if a.start_column <= c.end_column && a.end_column >= c.start_column {
                        self.union(above, current);
                    }
                }
            }
            previous_row = row_start..runs.len();
        }

        // Component id per root, in order of first appearance.
        let mut set = RegionSet::new();
        let mut region_of_root = vec![usize::MAX; runs.len()];
        let mut tail: Vec<usize> = Vec::new();
        for i in 0..runs.len() {
            let root = self.find(i);
            if region_of_root[root] == usize::MAX {
                region_of_root[root] = set.regions.len();
                set.regions.push(Region {
                    id: set.regions.len() as u32,
                    area: 0,
                    centroid: Point::default(),
                    bbox: BoundingBox::default(),
                    root: Some(i),
                });
                tail.push(i);
            } else {
                let region = region_of_root[root];
                runs[tail[region]].next = Some(i);
                tail[region] = i;
            }
        }
        set.runs = runs;

        debug!("labeled {} regions from {} runs", set.regions.len(), set.runs.len());
        Ok(set)
    }

    fn compute_properties(&mut self, regions: &mut RegionSet) -> Result<()> {
        let RegionSet { regions, runs } = regions;
        for region in regions.iter_mut() {
            let mut area = 0u64;
            let (mut sum_x, mut sum_y) = (0u64, 0u64);
            let mut bbox: Option<BoundingBox> = None;

            let mut walk = RunWalk::new(runs.as_slice(), region);
            for run in walk.by_ref() {
                let len = run.len() as u64;
                area += len;
                // arithmetic series; len * (start + end) is always even
                sum_x += len * (run.start_column as u64 + run.end_column as u64) / 2;
                sum_y += len * run.row as u64;

                let row = run.row as i32;
                let b = bbox.get_or_insert(BoundingBox::new(
                    run.start_column as i32,
                    row,
                    run.end_column as i32,
                    row,
                ));
                b.include(Point::new(run.start_column as i32, row));
                b.include(Point::new(run.end_column as i32, row));
            }
            walk.finish()?;

            let Some(bbox) = bbox else { continue };
            region.area = area as u32;
            region.bbox = bbox;
            region.centroid = Point::new((sum_x / area) as i32, (sum_y / area) as i32);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(rows: &[&str]) -> Image {
        let width = rows[0].len() as u32;
        let data = rows
            .iter()
            .flat_map(|r| r.bytes().map(|b| (b == b'#') as u8))
            .collect();
        Image::from_raw(width, rows.len() as u32, 1, data).unwrap()
    }

    fn extract(rows: &[&str]) -> RegionSet {
        let mut labeler = RunLengthLabeler::new();
        let mut set = labeler.label(&binary(rows)).unwrap();
        labeler.compute_properties(&mut set).unwrap();
        set
    }

    #[test]
    fn separate_blobs_get_separate_ids() {
        let set = extract(&[
            "##....", //
            "##..##", //
            "....##", //
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.regions[0].area, 4);
        assert_eq!(set.regions[0].bbox, BoundingBox::new(0, 0, 1, 1));
        assert_eq!(set.regions[1].bbox, BoundingBox::new(4, 1, 5, 2));
        assert_eq!(set.regions[1].centroid, Point::new(4, 1));
    }

    #[test]
    fn u_shape_merges_into_one_region() {
        let set = extract(&[
            "#...#", //
            "#...#", //
            "#####", //
        ]);
        assert_eq!(set.len(), 1);
        let region = &set.regions[0];
        assert_eq!(region.area, 9);
        assert_eq!(region.bbox, BoundingBox::new(0, 0, 4, 2));
        assert_eq!(region.centroid, Point::new(2, 1));

        let mut walk = set.runs_of(region);
        let rows: Vec<u32> = walk.by_ref().map(|r| r.row).collect();
        assert_eq!(rows, vec![0, 0, 1, 1, 2]);
        assert!(walk.finish().is_ok());
    }

    #[test]
    fn diagonal_neighbours_are_not_connected() {
        let set = extract(&[
            "#.", //
            ".#", //
        ]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn empty_image_has_no_regions() {
        assert!(extract(&["....", "...."]).is_empty());
    }

    #[test]
    fn non_binary_values_are_rejected() {
        let mut image = binary(&["##", ".."]);
        image.set(0, 1, 255);
        let err = RunLengthLabeler::new().label(&image).unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
    }

    #[test]
    fn centroid_is_truncated_mean() {
        let set = extract(&["###.", "#..."]);
        // x: (0+1+2+0)/4 = 0.75, y: (0+0+0+1)/4 = 0.25
        assert_eq!(set.regions[0].centroid, Point::new(0, 0));
    }

    #[test]
    fn broken_chain_fails_property_computation() {
        let mut labeler = RunLengthLabeler::new();
        let mut set = labeler.label(&binary(&["#.#", "###"])).unwrap();
        let last = set.runs.len() - 1;
        set.runs[last].next = Some(0);
        assert!(matches!(
            labeler.compute_properties(&mut set),
            Err(PipelineError::MalformedRunChain { .. })
        ));
    }
}
