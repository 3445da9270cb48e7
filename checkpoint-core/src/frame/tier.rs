//! Host classification, done once before the pipeline is built.

use std::time::Duration;

use super::types::{Binarizer, CropFraction, Resolution};

pub const MIN_THROTTLE: Duration = Duration::from_millis(200);
pub const MAX_THROTTLE: Duration = Duration::from_millis(3000);

const STANDARD_THROTTLE: Duration = Duration::from_millis(500);
const LOW_END_THROTTLE: Duration = MAX_THROTTLE;

/// What the host looks like to the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostProfile {
    pub logical_cores: usize,
    pub manufacturer: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    /// Hosts with this many logical cores or fewer are low-end.
    pub low_end_core_threshold: usize,
    /// Case-insensitive substrings of manufacturer/model known to decode slowly.
    pub slow_hardware_families: Vec<String>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            low_end_core_threshold: 4,
            slow_hardware_families: vec!["motorola".to_string(), "moto e".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTier {
    LowEnd,
    Standard,
}

impl DeviceTier {
    pub fn classify(host: &HostProfile, policy: &TierPolicy) -> Self {
        if host.logical_cores <= policy.low_end_core_threshold {
            return DeviceTier::LowEnd;
        }

        let identity = format!("{} {}", host.manufacturer, host.model).to_lowercase();
        let slow_family = policy
            .slow_hardware_families
            .iter()
            .map(|family| family.trim().to_lowercase())
            .any(|family| !family.is_empty() && identity.contains(&family));

        if slow_family {
            DeviceTier::LowEnd
        } else {
            DeviceTier::Standard
        }
    }
}

/// Everything tier-dependent, resolved into one value.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineProfile {
    pub tier: DeviceTier,
    pub resolution: Resolution,
    pub throttle: Duration,
    pub crop: CropFraction,
    pub binarizer: Binarizer,
    /// Retry a not-found frame once with [`Binarizer::alternate`].
    pub retry_alternate: bool,
}

impl PipelineProfile {
    pub fn for_tier(tier: DeviceTier) -> Self {
        match tier {
            DeviceTier::LowEnd => Self {
                tier,
                resolution: Resolution::LOW_END,
                throttle: LOW_END_THROTTLE,
                crop: CropFraction::CENTRAL,
                binarizer: Binarizer::Hybrid,
                retry_alternate: false,
            },
            DeviceTier::Standard => Self {
                tier,
                resolution: Resolution::STANDARD,
                throttle: STANDARD_THROTTLE,
                crop: CropFraction::FULL,
                binarizer: Binarizer::Hybrid,
                retry_alternate: true,
            },
        }
    }

    pub fn classify(host: &HostProfile, policy: &TierPolicy) -> Self {
        Self::for_tier(DeviceTier::classify(host, policy))
    }

    /// Last-resort configuration used when the camera refuses the tier's.
    pub fn minimal() -> Self {
        Self {
            resolution: Resolution::MINIMAL,
            ..Self::for_tier(DeviceTier::LowEnd)
        }
    }

    /// Overrides the throttle, clamped to the supported window.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle.clamp(MIN_THROTTLE, MAX_THROTTLE);
        self
    }
}
