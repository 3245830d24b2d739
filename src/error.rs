// THEORY:
// Every stage of the pipeline is a total function over well-formed buffers, so the
// only errors are broken preconditions. They come in two weights:
// - frame-fatal (`InvalidGeometry`, `GeometryMismatch`, `Extraction`): the frame is
//   abandoned before the published visualization is touched.
// - region-local (`MalformedRunChain`, `InconsistentRegion`): the region is skipped,
//   counted in the frame report, and the frame carries on.

use crate::core_modules::frame_buffer::{BufferRole, Geometry};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("invalid frame geometry {width}x{height}x{channels}")]
    InvalidGeometry {
        width: u32,
        height: u32,
        channels: u8,
    },

    #[error("{role:?} buffer is {found}, expected {expected}")]
    GeometryMismatch {
        role: BufferRole,
        expected: Geometry,
        found: Geometry,
    },

    #[error("region extraction failed: {0}")]
    Extraction(String),

    #[error("run chain of region {region} does not terminate")]
    MalformedRunChain { region: u32 },

    #[error("region {region} is inconsistent with the frame: {reason}")]
    InconsistentRegion { region: u32, reason: String },
}

impl PipelineError {
    /// Region-local errors only cost the region; everything else costs the frame.
    pub fn is_frame_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::MalformedRunChain { .. } | PipelineError::InconsistentRegion { .. }
        )
    }
}
