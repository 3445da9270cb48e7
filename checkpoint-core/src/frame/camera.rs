use thiserror::Error;
use tracing::{info, warn};

use super::tier::PipelineProfile;
use super::types::Resolution;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera session failed at {resolution}: {reason}")]
    Session {
        resolution: Resolution,
        reason: String,
    },
    #[error("camera unavailable: {primary}; minimal fallback: {fallback}")]
    Unavailable {
        primary: Box<CameraError>,
        fallback: Box<CameraError>,
    },
}

/// Camera session the pipeline reads frames from.
pub trait CameraSource: Send {
    fn start(&mut self, resolution: Resolution) -> Result<(), CameraError>;
    fn stop(&mut self);
}

/// Profile the camera actually started with.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraStart {
    pub profile: PipelineProfile,
    pub degraded: bool,
}

/// Starts the camera with `profile`, retrying once with
/// [`PipelineProfile::minimal`] before giving up.
pub fn start_camera<C: CameraSource + ?Sized>(
    camera: &mut C,
    profile: PipelineProfile,
) -> Result<CameraStart, CameraError> {
    let primary = match camera.start(profile.resolution) {
        Ok(()) => {
            info!(resolution = %profile.resolution, "camera session started");
            return Ok(CameraStart {
                profile,
                degraded: false,
            });
        }
        Err(err) => err,
    };

    warn!(error = %primary, "camera start failed, retrying with minimal profile");
    let minimal = PipelineProfile::minimal();
    match camera.start(minimal.resolution) {
        Ok(()) => Ok(CameraStart {
            profile: minimal,
            degraded: true,
        }),
        Err(fallback) => Err(CameraError::Unavailable {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
        }),
    }
}
