use checkpoint_core::frame::tier::{MAX_THROTTLE, MIN_THROTTLE};

use crate::loader::ConfigLoadError;
use crate::models::CheckpointConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

/// Rejects settings the client cannot run with and collects the doubtful ones.
pub fn validate(config: &CheckpointConfig) -> Result<ConfigWarnings, ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    let base_url = config.registry.base_url()?;
    match base_url.scheme() {
        "https" => {}
        "http" => warnings.push_with_hint(
            format!("registry base URL {base_url} is not HTTPS"),
            "Bearer tokens travel in clear text; use HTTPS outside local testing",
        ),
        other => {
            return Err(ConfigLoadError::Invalid {
                field: "registry.base_url",
                reason: format!("uses unsupported scheme '{other}'"),
            });
        }
    }
    if !config.registry.base_url.trim().ends_with('/') {
        warnings.push(format!(
            "registry base URL has no trailing slash; using {base_url}"
        ));
    }

    if config.registry.request_timeout_secs == 0 {
        return Err(ConfigLoadError::Invalid {
            field: "registry.request_timeout_secs",
            reason: "must be greater than zero".into(),
        });
    }

    if config.history.page_size == 0 {
        return Err(ConfigLoadError::Invalid {
            field: "history.page_size",
            reason: "must be greater than zero".into(),
        });
    }

    if config.validation.scan_timeout_ms == 0 {
        return Err(ConfigLoadError::Invalid {
            field: "validation.scan_timeout_ms",
            reason: "must be greater than zero".into(),
        });
    }

    if let Some(throttle) = config.scanner.throttle_ms {
        let min = MIN_THROTTLE.as_millis() as u64;
        let max = MAX_THROTTLE.as_millis() as u64;
        if !(min..=max).contains(&throttle) {
            return Err(ConfigLoadError::Invalid {
                field: "scanner.throttle_ms",
                reason: format!("must be within {min}..={max}, got {throttle}"),
            });
        }
    }

    if config.scanner.decoder.program.trim().is_empty() {
        warnings.push_with_hint(
            "scanner.decoder.program is empty",
            "The watch command needs an external PDF417 reader",
        );
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_clean() {
        let warnings = validate(&CheckpointConfig::default()).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn plain_http_is_a_warning() {
        let mut config = CheckpointConfig::default();
        config.registry.base_url = "http://localhost:8080/api/".into();
        let warnings = validate(&config).unwrap();
        assert_eq!(warnings.items.len(), 1);
        assert!(warnings.items[0].hint.is_some());
    }

    #[test]
    fn throttle_outside_window_is_rejected() {
        let mut config = CheckpointConfig::default();
        config.scanner.throttle_ms = Some(100);
        assert!(matches!(
            validate(&config),
            Err(ConfigLoadError::Invalid {
                field: "scanner.throttle_ms",
                ..
            })
        ));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let mut config = CheckpointConfig::default();
        config.history.page_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unparsable_base_url_is_rejected() {
        let mut config = CheckpointConfig::default();
        config.registry.base_url = "not a url".into();
        assert!(matches!(
            validate(&config),
            Err(ConfigLoadError::InvalidBaseUrl { .. })
        ));
    }
}
