//! Segmentation module - filtering, ranking and labelling of mask candidates

pub mod postprocess;

pub use postprocess::{automatic, guided, mask_bbox, BoundingBox, MaskCandidate, MAX_AUTOMATIC_MASKS};
