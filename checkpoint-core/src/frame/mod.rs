//! Camera frame intake and barcode decoding.

pub mod camera;
pub mod decoder;
pub mod pipeline;
pub mod throttle;
pub mod tier;
pub mod types;

pub use camera::{CameraError, CameraSource, CameraStart, start_camera};
pub use decoder::{BarcodeDecoder, DecodeFailure};
pub use pipeline::{
    FrameDisposition, FramePipeline, FrameRejection, PipelineError, PipelineEvent,
};
pub use throttle::{FrameThrottle, ThrottleDecision};
pub use tier::{DeviceTier, HostProfile, PipelineProfile, TierPolicy};
pub use types::{Binarizer, CropFraction, CropRegion, Frame, ReleaseHandle, Resolution};
