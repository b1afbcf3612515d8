use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model session failed: {0}")]
    Session(#[from] ort::Error),
    #[error("Unexpected model output: {0}")]
    Output(String),
    #[error("Model session lock poisoned")]
    Poisoned,
}

/// One candidate object as emitted by the model, before category resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// The detection capability behind the request pipeline. Thresholds are
/// call-local so concurrent callers never observe each other's settings.
pub trait DetectionModel: Send + Sync + 'static {
    fn detect(
        &self,
        image: &DynamicImage,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<RawDetection>, InferenceError>;
}
