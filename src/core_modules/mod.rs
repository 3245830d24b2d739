pub mod color_classifier;
pub mod drawing;
pub mod frame_buffer;
pub mod morphology;
pub mod palette;
pub mod pixel;
pub mod region;
pub mod region_annotator;
pub mod region_labeler;
pub mod threshold;
pub mod utils;
