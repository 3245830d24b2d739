// THEORY:
// The morphological filter cleans the change-detection mask before region labeling.
// One 3x3 erosion removes speckle noise (a pixel survives only if its whole
// neighbourhood is foreground); one 3x3 dilation then grows the survivors back
// (a pixel is set if any neighbour is foreground).
//
// Key architectural principles:
// 1.  **Boolean Semantics**: Any nonzero byte counts as foreground and every output
//     pixel is written as exactly 0 or `FOREGROUND`. AND/OR over raw bytes would
//     break as soon as two different nonzero sentinels met; comparing against zero
//     cannot.
// 2.  **Border Margin**: Only pixels at least `border` away from every edge are
//     computed. The margin is at least one pixel, so the 3x3 window never leaves
//     the buffer. Border pixels of the output are written as background so the
//     next stage always sees a defined value.
// 3.  **Separate Buffers**: Input and output are distinct images; the borrow checker
//     guarantees a pass never reads pixels it has already overwritten.

pub mod morphology {
    use crate::core_modules::color_classifier::FOREGROUND;
    use crate::core_modules::frame_buffer::{BufferRole, Image};
    use crate::error::Result;

    /// Smallest usable margin for a 3x3 window.
    pub const MIN_BORDER: u32 = 1;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Operation {
        Erode,
        Dilate,
    }

    /// 3x3 erosion: foreground only where the whole neighbourhood is foreground.
    pub fn erode_3x3(input: &Image, output: &mut Image, border: u32) -> Result<()> {
        apply_3x3(input, output, border, Operation::Erode)
    }

    /// 3x3 dilation: foreground wherever any neighbour is foreground.
    pub fn dilate_3x3(input: &Image, output: &mut Image, border: u32) -> Result<()> {
        apply_3x3(input, output, border, Operation::Dilate)
    }

    /// Erosion into `scratch`, then dilation into `output`.
    pub fn open_3x3(input: &Image, scratch: &mut Image, output: &mut Image, border: u32) -> Result<()> {
        erode_3x3(input, scratch, border)?;
        dilate_3x3(scratch, output, border)
    }

    fn apply_3x3(input: &Image, output: &mut Image, border: u32, operation: Operation) -> Result<()> {
        let geometry = input.geometry().with_channels(1);
        input.expect_geometry(BufferRole::ChangeMask, geometry)?;
        output.expect_geometry(BufferRole::Threshold, geometry)?;

        let border = border.max(MIN_BORDER);
        let width = geometry.width as usize;
        let height = geometry.height as usize;
        let margin = border as usize;

        output.clear_border(border);
        if width <= 2 * margin || height <= 2 * margin {
            return Ok(());
        }

        let src = input.as_bytes();
        let dst = output.as_bytes_mut();
        for y in margin..height - margin {
            let row = y * width;
            for x in margin..width - margin {
                let center = row + x;
                let mut hits = 0u8;
                for dy in [center - width, center, center + width] {
                    hits += (src[dy - 1] != 0) as u8 + (src[dy] != 0) as u8 + (src[dy + 1] != 0) as u8;
                }
                let set = match operation {
                    Operation::Erode => hits == 9,
                    Operation::Dilate => hits > 0,
                };
                dst[center] = if set { FOREGROUND } else { 0 };
            }
        }
        Ok(())
    }

    /// Rewrites a cleaned mask as the strictly 0/1 image a region extractor expects.
    pub fn to_unit_mask(input: &Image, output: &mut Image) -> Result<()> {
        let geometry = input.geometry().with_channels(1);
        input.expect_geometry(BufferRole::Threshold, geometry)?;
        output.expect_geometry(BufferRole::Labels, geometry)?;
        for (dst, src) in output.as_bytes_mut().iter_mut().zip(input.as_bytes()) {
            *dst = (*src != 0) as u8;
        }
        Ok(())
    }
}
