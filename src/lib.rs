// THEORY:
// This file is the main entry point for the `chroma_vision` library crate.
//
// The public face of the engine is `pipeline::VisionPipeline` together with its
// configuration (`PipelineConfig`), per-frame inputs (`FrameContext`) and results
// (`FrameOutcome`, `FrameReport`). The stages it drives live in `core_modules` and
// stay public so a host can run any of them on its own (the histogram threshold
// and grayscale binarization are useful without the rest of the pipeline).
//
// The crate never installs a logger; it only emits through the `log` facade.

pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use error::{PipelineError, Result};
pub use pipeline::{FrameContext, FrameOutcome, FrameReport, PipelineConfig, VisionPipeline};
