//! Application configuration management.
//!
//! Configuration is layered with the `config` crate:
//! 1. Built-in defaults ([`Config::default`])
//! 2. An optional TOML file (`/etc/drivesafe/config.toml` on Linux, the
//!    platform config directory elsewhere, or `$DRIVESAFE_CONFIG`)
//! 3. Environment overrides, e.g. `DRIVESAFE__DETECTION__THRESHOLD_CM=20`
//!
//! [`Config::validate`] reports every invalid field at once.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::SensorEndpoint;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "DRIVESAFE_CONFIG";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "DRIVESAFE";

/// E.164 phone number: `+` followed by up to 15 digits.
static PHONE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("valid phone number regex"));

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A single field failed validation.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Returns `true` if `number` is an E.164 phone number.
#[must_use]
pub fn is_valid_phone_number(number: &str) -> bool {
    PHONE_NUMBER.is_match(number)
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Distance sensor connection.
    pub sensor: SensorConfig,

    /// Threshold and debounce.
    pub detection: DetectionConfig,

    /// Auto-reply content and fallback recipient.
    pub reply: ReplyConfig,

    /// SMS gateway credentials.
    pub sms: SmsConfig,

    /// Audit trail location.
    pub audit: AuditConfig,

    /// HTTP listener.
    pub server: ServerConfig,
}

/// Sensor connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Device path or `tcp://host:port`.
    pub source: String,

    /// Upper bound on waiting for a single byte.
    pub read_timeout_ms: u64,

    /// Drop frames whose checksum byte does not match.
    pub verify_checksum: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: "/dev/serial0".to_string(),
            read_timeout_ms: 1000,
            verify_checksum: false,
        }
    }
}

/// Detection thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Distances at or below this many centimeters count as "phone in hand".
    pub threshold_cm: u16,

    /// How long the distance must stay in range before an alert is confirmed.
    pub debounce_secs: u64,

    /// Pause after a "no reading" sample.
    pub idle_pause_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold_cm: 18,
            debounce_secs: 5,
            idle_pause_ms: 50,
        }
    }
}

/// Auto-reply settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Text sent to the correspondent.
    pub text: String,

    /// Recipient used when nobody has messaged the driver yet.
    pub default_recipient: Option<String>,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            text: "I'm driving right now and will get back to you when it's safe.".to_string(),
            default_recipient: None,
        }
    }
}

/// SMS gateway settings (Twilio-compatible REST API).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    /// Account identifier.
    pub account_sid: Option<String>,

    /// API secret.
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,

    /// Sending phone number.
    pub from_number: Option<String>,

    /// Base URL of the REST API.
    pub api_base: String,

    /// Request timeout.
    pub timeout_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base: "https://api.twilio.com".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SmsConfig {
    /// Whether every credential needed to send is present.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }

    const fn is_partially_configured(&self) -> bool {
        !self.is_configured()
            && (self.account_sid.is_some()
                || self.auth_token.is_some()
                || self.from_number.is_some())
    }
}

/// Audit trail settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON Lines file records are appended to.
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,

    /// TCP port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// Load configuration from the default location (or `$DRIVESAFE_CONFIG`)
    /// with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source exists but cannot be parsed.
    pub fn load() -> ConfigResult<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);
        Self::load_from(&path)
    }

    /// Load configuration from `path` (optional) with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if an
    /// environment override has the wrong type.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Self::default())?)
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load from the default location and validate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DriveSafeError::ConfigLoadError`] or
    /// [`crate::DriveSafeError::ConfigValidationError`].
    pub fn load_validated() -> crate::error::Result<Self> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns a single [`ConfigError::ValidationError`] or
    /// [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut fail = |field: &str, message: String| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message,
            });
        };

        if let Err(e) = SensorEndpoint::from_str(&self.sensor.source) {
            fail("sensor.source", e.to_string());
        }
        if self.sensor.read_timeout_ms == 0 {
            fail("sensor.read_timeout_ms", "must be greater than zero".into());
        }
        if self.detection.threshold_cm == 0 {
            fail("detection.threshold_cm", "must be greater than zero".into());
        }
        if self.reply.text.trim().is_empty() {
            fail("reply.text", "must not be empty".into());
        }
        if let Some(recipient) = &self.reply.default_recipient {
            if !is_valid_phone_number(recipient) {
                fail(
                    "reply.default_recipient",
                    format!("'{recipient}' is not an E.164 phone number"),
                );
            }
        }
        if self.sms.is_partially_configured() {
            fail(
                "sms",
                "account_sid, auth_token and from_number must be set together".into(),
            );
        }
        if let Some(from) = &self.sms.from_number {
            if !is_valid_phone_number(from) {
                fail(
                    "sms.from_number",
                    format!("'{from}' is not an E.164 phone number"),
                );
            }
        }
        if self.sms.timeout_secs == 0 {
            fail("sms.timeout_secs", "must be greater than zero".into());
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// The sensor endpoint described by `sensor.source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source string is invalid.
    pub fn sensor_endpoint(&self) -> crate::error::Result<SensorEndpoint> {
        Ok(SensorEndpoint::from_str(&self.sensor.source)?)
    }
}

/// Default configuration file location.
///
/// On Raspberry Pi: `/etc/drivesafe/config.toml`
/// For development: the platform config directory.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/drivesafe/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "drivesafe").map_or_else(
            || PathBuf::from("config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

/// Default audit trail location.
///
/// On Raspberry Pi: `/var/lib/drivesafe/audit.jsonl`
/// For development: the platform data directory.
#[must_use]
pub fn default_audit_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/drivesafe/audit.jsonl")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "drivesafe").map_or_else(
            || PathBuf::from("audit.jsonl"),
            |dirs| dirs.data_dir().join("audit.jsonl"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tempfile::TempDir;

    // Loading reads the process environment; serialize tests that load.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.detection.threshold_cm, 18);
        assert_eq!(config.detection.debounce_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.sensor, SensorConfig::default());
        assert_eq!(config.reply, ReplyConfig::default());
    }

    #[test]
    fn test_load_partial_file_keeps_other_defaults() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[detection]
threshold_cm = 25

[reply]
default_recipient = "+15551230000"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.detection.threshold_cm, 25);
        assert_eq!(config.detection.debounce_secs, 5);
        assert_eq!(
            config.reply.default_recipient.as_deref(),
            Some("+15551230000")
        );
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_serialized_config_round_trips_through_file() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.sensor.source = "tcp://bridge:4001".into();
        config.detection.debounce_secs = 3;
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_a_load_error() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection\nthreshold_cm = ").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_load_validated_reports_invalid_file() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection]\nthreshold_cm = 0\n").unwrap();

        std::env::set_var(CONFIG_PATH_ENV, &path);
        let result = Config::load_validated();
        std::env::remove_var(CONFIG_PATH_ENV);

        let Err(err) = result else {
            panic!("a zero threshold should fail validation");
        };
        assert!(matches!(
            err,
            crate::DriveSafeError::ConfigValidationError(ref m) if m.contains("detection.threshold_cm")
        ));
    }

    #[test]
    fn test_env_overrides_keep_phone_numbers_as_strings() {
        let _env = env_lock();
        let dir = TempDir::new().unwrap();
        let vars = [
            ("DRIVESAFE__REPLY__DEFAULT_RECIPIENT", "+15551234567"),
            ("DRIVESAFE__SMS__ACCOUNT_SID", "1234567890"),
            ("DRIVESAFE__SMS__AUTH_TOKEN", "0042"),
            ("DRIVESAFE__SMS__FROM_NUMBER", "+15559990000"),
            ("DRIVESAFE__DETECTION__THRESHOLD_CM", "22"),
            ("DRIVESAFE__SENSOR__VERIFY_CHECKSUM", "true"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }

        let loaded = Config::load_from(&dir.path().join("absent.toml"));
        for (key, _) in vars {
            std::env::remove_var(key);
        }

        let config = loaded.unwrap();
        assert_eq!(
            config.reply.default_recipient.as_deref(),
            Some("+15551234567")
        );
        assert_eq!(config.sms.account_sid.as_deref(), Some("1234567890"));
        assert_eq!(config.sms.auth_token.as_deref(), Some("0042"));
        assert_eq!(config.sms.from_number.as_deref(), Some("+15559990000"));
        assert_eq!(config.detection.threshold_cm, 22);
        assert!(config.sensor.verify_checksum);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.detection.threshold_cm = 0;
        config.reply.text = "  ".into();
        config.reply.default_recipient = Some("555-1234".into());
        config.sms.account_sid = Some("AC123".into());

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => {
                let text: Vec<String> = errors.iter().map(ToString::to_string).collect();
                assert_eq!(errors.len(), 4, "{text:?}");
                assert!(text.iter().any(|e| e.starts_with("detection.threshold_cm")));
                assert!(text.iter().any(|e| e.starts_with("reply.default_recipient")));
                assert!(text.iter().any(|e| e.starts_with("sms:")));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_single_error() {
        let mut config = Config::default();
        config.sensor.source = "ftp://sensor".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "sensor.source"
        ));
    }

    #[test]
    fn test_sms_configured_flag() {
        let mut sms = SmsConfig::default();
        assert!(!sms.is_configured());
        sms.account_sid = Some("AC1".into());
        sms.auth_token = Some("secret".into());
        sms.from_number = Some("+15550000000".into());
        assert!(sms.is_configured());
    }

    #[test]
    fn test_phone_number_validation() {
        assert!(is_valid_phone_number("+15551234567"));
        assert!(is_valid_phone_number("+447700900123"));
        assert!(!is_valid_phone_number("15551234567"));
        assert!(!is_valid_phone_number("+0123"));
        assert!(!is_valid_phone_number("+1 555 123"));
    }
}
