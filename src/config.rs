//! Configuration for the fatal-error handler.
//!
//! A [`FatalConfig`] is usually embedded in, or read next to, a migration's
//! JSON configuration:
//!
//! ```
//! use ferry_fatal::config::FatalConfig;
//!
//! let config = FatalConfig::from_json_str(
//!     r#"{ "ErrorCallback": { "URI": "http://localhost:8000/error" } }"#,
//! )
//! .unwrap();
//! assert_eq!(config.error_callback.unwrap().uri, "http://localhost:8000/error");
//! ```
//!
//! # Environment Variables
//!
//! - `FERRY_FATAL_CALLBACK_URI` - Overrides the callback destination. An
//!   empty value disables the callback.
//! - `FERRY_FATAL_CALLBACK_TIMEOUT_MS` - Overrides the delivery timeout in
//!   milliseconds.

use std::{path::Path, sync::OnceLock, time::Duration};

use rootcause::{Report, prelude::ResultExt};
use serde::{Deserialize, Serialize};

use crate::callback::HttpCallback;

/// Default bound on how long the callback delivery may block.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for [`PanicErrorHandler`](crate::PanicErrorHandler).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatalConfig {
    /// Endpoint notified once when a fatal error is reported.
    ///
    /// A callback whose URI is empty is treated as absent.
    #[serde(rename = "ErrorCallback", deserialize_with = "non_empty_callback")]
    pub error_callback: Option<HttpCallback>,
    /// Upper bound on the callback delivery.
    #[serde(rename = "ErrorCallbackTimeoutMs", with = "millis")]
    pub callback_timeout: Duration,
}

impl Default for FatalConfig {
    fn default() -> Self {
        Self {
            error_callback: None,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }
}

impl FatalConfig {
    /// Parses a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, Report> {
        let config: Self =
            serde_json::from_str(json).context("failed to parse fatal handler config")?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Report> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .context("failed to read fatal handler config")
            .attach(format!("Path: {}", path.display()))?;
        Self::from_json_str(&contents).attach(format!("Path: {}", path.display()))
    }

    /// Applies the `FERRY_FATAL_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(EnvOverrides::get())
    }

    fn with_overrides(mut self, overrides: &EnvOverrides) -> Self {
        if let Some(uri) = &overrides.callback_uri {
            self.error_callback = if uri.is_empty() {
                None
            } else {
                let payload = self.error_callback.take().unwrap_or_default().payload;
                Some(HttpCallback {
                    uri: uri.clone(),
                    payload,
                })
            };
        }
        if let Some(timeout) = overrides.callback_timeout {
            self.callback_timeout = timeout;
        }
        self
    }
}

#[derive(Debug, Default)]
struct EnvOverrides {
    callback_uri: Option<String>,
    callback_timeout: Option<Duration>,
}

impl EnvOverrides {
    fn get() -> &'static Self {
        static FERRY_FATAL_ENV: OnceLock<EnvOverrides> = OnceLock::new();

        FERRY_FATAL_ENV.get_or_init(|| {
            let callback_uri = std::env::var_os("FERRY_FATAL_CALLBACK_URI")
                .map(|v| v.to_string_lossy().trim().to_owned());

            let callback_timeout = std::env::var_os("FERRY_FATAL_CALLBACK_TIMEOUT_MS")
                .and_then(|v| v.to_string_lossy().trim().parse::<u64>().ok())
                .map(Duration::from_millis);

            EnvOverrides {
                callback_uri,
                callback_timeout,
            }
        })
    }
}

fn non_empty_callback<'de, D>(deserializer: D) -> Result<Option<HttpCallback>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let callback = Option::<HttpCallback>::deserialize(deserializer)?;
    Ok(callback.filter(|c| !c.uri.is_empty()))
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_callback() {
        let config = FatalConfig::from_json_str("{}").unwrap();
        assert_eq!(config, FatalConfig::default());
        assert_eq!(config.callback_timeout, DEFAULT_CALLBACK_TIMEOUT);
    }

    #[test]
    fn test_empty_uri_is_absent() {
        let config = FatalConfig::from_json_str(r#"{"ErrorCallback": {"URI": ""}}"#).unwrap();
        assert!(config.error_callback.is_none());

        let config = FatalConfig::from_json_str(r#"{"ErrorCallback": null}"#).unwrap();
        assert!(config.error_callback.is_none());
    }

    #[test]
    fn test_timeout_in_millis() {
        let config = FatalConfig::from_json_str(
            r#"{"ErrorCallback": {"URI": "http://hooks.test/x"}, "ErrorCallbackTimeoutMs": 250}"#,
        )
        .unwrap();
        assert_eq!(config.callback_timeout, Duration::from_millis(250));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["ErrorCallbackTimeoutMs"], 250);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let err = FatalConfig::from_json_str("{ not json").unwrap_err();
        assert!(err.to_string().contains("failed to parse fatal handler config"));
    }

    #[test]
    fn test_load_missing_file_mentions_path() {
        let err = FatalConfig::load("/nonexistent/ferry-fatal.json").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("failed to read fatal handler config"));
        assert!(rendered.contains("/nonexistent/ferry-fatal.json"));
    }

    #[test]
    fn test_overrides_replace_uri_and_timeout() {
        let base = FatalConfig {
            error_callback: Some(HttpCallback::new("http://old.test")),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        };

        let overridden = base.clone().with_overrides(&EnvOverrides {
            callback_uri: Some("http://new.test".to_owned()),
            callback_timeout: Some(Duration::from_secs(1)),
        });
        assert_eq!(overridden.error_callback.unwrap().uri, "http://new.test");
        assert_eq!(overridden.callback_timeout, Duration::from_secs(1));

        let disabled = base.with_overrides(&EnvOverrides {
            callback_uri: Some(String::new()),
            callback_timeout: None,
        });
        assert!(disabled.error_callback.is_none());
    }
}
