use std::path::PathBuf;
use std::time::Duration;

use checkpoint_core::SessionSettings;
use checkpoint_core::frame::{DeviceTier, HostProfile, PipelineProfile, TierPolicy};
use checkpoint_core::validation::StatusContract;
use checkpoint_model::EstablishmentId;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::loader::ConfigLoadError;

pub const DEFAULT_BASE_URL: &str = "https://api.app.inncome.net/api/test/";

/// Full client configuration. Every section falls back to its defaults, so
/// a file only needs the keys it changes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub registry: RegistryConfig,
    pub scanner: ScannerSettings,
    pub validation: ValidationConfig,
    pub history: HistoryConfig,
    pub storage: StorageConfig,
}

/// Where the access registry lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Root of the registry API. Endpoint paths are joined onto it, so it
    /// should end with a slash; one is appended when missing.
    pub base_url: String,
    /// Establishment the guard works for, sent as `X-Establecimiento-Id`.
    pub establishment_id: i64,
    /// `X-Rol` for validation and registration requests.
    pub guard_role: String,
    /// `X-Rol` for the history feed.
    pub history_role: String,
    pub request_timeout_secs: u64,
    /// Status codes the registry answers with for each validation result.
    pub statuses: StatusContract,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            establishment_id: 1,
            guard_role: "GUARDIA".to_string(),
            history_role: "ADMINISTRADOR_BARRIO".to_string(),
            request_timeout_secs: 30,
            statuses: StatusContract::default(),
        }
    }
}

impl RegistryConfig {
    /// Parsed base URL with a trailing slash.
    pub fn base_url(&self) -> Result<Url, ConfigLoadError> {
        let trimmed = self.base_url.trim();
        let normalized = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        Url::parse(&normalized).map_err(|source| ConfigLoadError::InvalidBaseUrl {
            value: self.base_url.clone(),
            source,
        })
    }

    pub fn establishment(&self) -> EstablishmentId {
        EstablishmentId(self.establishment_id)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Forces a device tier instead of probing the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierOverride {
    LowEnd,
    Standard,
}

impl From<TierOverride> for DeviceTier {
    fn from(value: TierOverride) -> Self {
        match value {
            TierOverride::LowEnd => DeviceTier::LowEnd,
            TierOverride::Standard => DeviceTier::Standard,
        }
    }
}

/// Frame pipeline tuning.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Hosts with this many logical cores or fewer run the low-end profile.
    pub low_end_core_threshold: usize,
    /// Manufacturer/model substrings that decode slowly regardless of cores.
    pub slow_hardware_families: Vec<String>,
    /// Skip host classification and use this tier.
    pub force_tier: Option<TierOverride>,
    /// Minimum spacing between decoded frames, in milliseconds. Must stay
    /// within 200..=3000.
    pub throttle_ms: Option<u64>,
    pub decoder: DecoderCommandConfig,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        let policy = TierPolicy::default();
        Self {
            low_end_core_threshold: policy.low_end_core_threshold,
            slow_hardware_families: policy.slow_hardware_families,
            force_tier: None,
            throttle_ms: None,
            decoder: DecoderCommandConfig::default(),
        }
    }
}

impl ScannerSettings {
    pub fn tier_policy(&self) -> TierPolicy {
        TierPolicy {
            low_end_core_threshold: self.low_end_core_threshold,
            slow_hardware_families: self.slow_hardware_families.clone(),
        }
    }

    /// Resolves the pipeline profile for `host`, applying overrides.
    pub fn pipeline_profile(&self, host: &HostProfile) -> PipelineProfile {
        let profile = match self.force_tier {
            Some(tier) => PipelineProfile::for_tier(tier.into()),
            None => PipelineProfile::classify(host, &self.tier_policy()),
        };
        match self.throttle_ms {
            Some(ms) => profile.with_throttle(Duration::from_millis(ms)),
            None => profile,
        }
    }
}

/// External barcode reader used by the `watch` command.
///
/// The program is run once per frame with `args`, the binarizer arguments,
/// and the path of a PNG holding the cropped frame. Whatever it prints on
/// stdout is the payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecoderCommandConfig {
    pub program: String,
    pub args: Vec<String>,
    pub hybrid_args: Vec<String>,
    pub global_histogram_args: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for DecoderCommandConfig {
    fn default() -> Self {
        Self {
            program: "ZXingReader".to_string(),
            args: vec!["-format".to_string(), "PDF417".to_string()],
            hybrid_args: vec!["-binarizer".to_string(), "local".to_string()],
            global_histogram_args: vec!["-binarizer".to_string(), "global".to_string()],
            timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Budget for one validation or registration round trip.
    pub scan_timeout_ms: u64,
    /// Minimum spacing between two validation cycles.
    pub scan_spacing_ms: u64,
    /// Wait before the newest history record is fetched after a registration.
    pub history_refresh_delay_ms: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 10_000,
            scan_spacing_ms: 2_000,
            history_refresh_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub page_size: u32,
    pub sort: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: checkpoint_core::history::DEFAULT_PAGE_SIZE,
            sort: checkpoint_core::history::DEFAULT_SORT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Credential file. Defaults to the platform data directory.
    pub credential_path: Option<PathBuf>,
}

impl CheckpointConfig {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            establishment: self.registry.establishment(),
            contract: self.registry.statuses,
            scan_timeout: Duration::from_millis(self.validation.scan_timeout_ms),
            scan_spacing: Duration::from_millis(self.validation.scan_spacing_ms),
            history_refresh_delay: Duration::from_millis(
                self.validation.history_refresh_delay_ms,
            ),
            page_size: self.history.page_size,
            sort: self.history.sort.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let registry = RegistryConfig {
            base_url: "https://registry.example/api".into(),
            ..RegistryConfig::default()
        };
        let url = registry.base_url().unwrap();
        assert_eq!(url.as_str(), "https://registry.example/api/");
        assert_eq!(
            url.join("auth-service/auth/login").unwrap().as_str(),
            "https://registry.example/api/auth-service/auth/login"
        );
    }

    #[test]
    fn forced_tier_skips_classification() {
        let scanner = ScannerSettings {
            force_tier: Some(TierOverride::LowEnd),
            throttle_ms: Some(1_000),
            ..ScannerSettings::default()
        };
        let host = HostProfile {
            logical_cores: 16,
            manufacturer: "acme".into(),
            model: "workstation".into(),
        };
        let profile = scanner.pipeline_profile(&host);
        assert_eq!(profile.tier, DeviceTier::LowEnd);
        assert_eq!(profile.throttle, Duration::from_millis(1_000));
    }

    #[test]
    fn session_settings_follow_sections() {
        let mut config = CheckpointConfig::default();
        config.registry.establishment_id = 7;
        config.validation.scan_timeout_ms = 4_000;
        config.history.page_size = 25;

        let settings = config.session_settings();
        assert_eq!(settings.establishment, EstablishmentId(7));
        assert_eq!(settings.scan_timeout, Duration::from_secs(4));
        assert_eq!(settings.page_size, 25);
        assert_eq!(settings.history_refresh_delay, Duration::from_millis(500));
    }
}
