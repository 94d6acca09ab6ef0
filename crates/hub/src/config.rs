//! TOML config file loading and validation.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use time::macros::format_description;
use time::UtcOffset;

/// Default upload limit for photos relayed to the analysis backend.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub polling: PollingConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Sensor/camera device, serves `/` and `/photo`.
    pub device_url: String,
    /// Analysis backend, serves `/graph`, `/submit` and `/submit2`.
    pub analysis_url: String,
    /// Per-request timeout; upstream calls never time out when unset.
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Offset used for chart time labels, e.g. "+03:00".
    pub utc_offset: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            device_url: "https://gardenpi.duckdns.org".to_string(),
            analysis_url: "http://34.165.58.92:5000".to_string(),
            timeout_sec: None,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_sec: 3600 }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset: "+00:00".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate every section. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.server.max_upload_bytes == 0 {
            errors.push("server.max_upload_bytes must be positive".to_string());
        }

        validate_url("upstream.device_url", &self.upstream.device_url, &mut errors);
        validate_url("upstream.analysis_url", &self.upstream.analysis_url, &mut errors);
        if self.upstream.timeout_sec == Some(0) {
            errors.push("upstream.timeout_sec must be positive when set".to_string());
        }

        if self.polling.interval_sec == 0 {
            errors.push("polling.interval_sec must be positive".to_string());
        }

        if let Err(e) = self.display.offset() {
            errors.push(format!("display.utc_offset: {e}"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }
}

fn validate_url(field: &str, url: &str, errors: &mut Vec<String>) {
    let url = url.trim();
    if url.is_empty() {
        errors.push(format!("{field} is empty"));
        return;
    }
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    match rest {
        None => errors.push(format!("{field} '{url}' must start with http:// or https://")),
        Some(host) if host.trim_matches('/').is_empty() => {
            errors.push(format!("{field} '{url}' has no host"))
        }
        Some(_) => {}
    }
}

impl DisplayConfig {
    pub fn offset(&self) -> Result<UtcOffset> {
        let format = format_description!("[offset_hour sign:mandatory]:[offset_minute]");
        UtcOffset::parse(self.utc_offset.trim(), &format)
            .map_err(|e| anyhow!("'{}' is not a ±HH:MM offset ({e})", self.utc_offset))
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

/// Like [`load`], but falls back to built-in defaults when `path` does not
/// exist.
pub fn load_or_default(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        load(path)
    } else {
        tracing::warn!(path, "config file not found, using defaults");
        Ok(Config::default())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::offset;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[server]
port = 9000
max_upload_bytes = 2048

[upstream]
device_url = "https://pi.example.org"
analysis_url = "http://10.0.0.5:5000"
timeout_sec = 30

[polling]
interval_sec = 600

[display]
utc_offset = "+03:00"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_upload_bytes, 2048);
        assert_eq!(config.upstream.device_url, "https://pi.example.org");
        assert_eq!(config.upstream.timeout_sec, Some(30));
        assert_eq!(config.polling.interval_sec, 600);
        assert_eq!(config.display.offset().unwrap(), offset!(+3));
        config.validate().unwrap();
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.polling.interval_sec, 3600);
        assert!(config.upstream.timeout_sec.is_none());
        assert_eq!(config.display.offset().unwrap(), UtcOffset::UTC);
        config.validate().unwrap();
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[server]\nport = 3000\n").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn negative_offset_parses() {
        let display = DisplayConfig {
            utc_offset: "-04:30".into(),
        };
        assert_eq!(display.offset().unwrap(), offset!(-4:30));
    }

    // -- Validation -------------------------------------------------------

    #[test]
    fn zero_port_rejected() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        assert_validation_err(&cfg, "server.port must be non-zero");
    }

    #[test]
    fn zero_upload_limit_rejected() {
        let mut cfg = Config::default();
        cfg.server.max_upload_bytes = 0;
        assert_validation_err(&cfg, "max_upload_bytes must be positive");
    }

    #[test]
    fn url_without_scheme_rejected() {
        let mut cfg = Config::default();
        cfg.upstream.device_url = "gardenpi.duckdns.org".into();
        assert_validation_err(&cfg, "must start with http:// or https://");
    }

    #[test]
    fn url_without_host_rejected() {
        let mut cfg = Config::default();
        cfg.upstream.analysis_url = "http://".into();
        assert_validation_err(&cfg, "has no host");
    }

    #[test]
    fn empty_url_rejected() {
        let mut cfg = Config::default();
        cfg.upstream.analysis_url = "  ".into();
        assert_validation_err(&cfg, "upstream.analysis_url is empty");
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut cfg = Config::default();
        cfg.upstream.timeout_sec = Some(0);
        assert_validation_err(&cfg, "timeout_sec must be positive");
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = Config::default();
        cfg.polling.interval_sec = 0;
        assert_validation_err(&cfg, "interval_sec must be positive");
    }

    #[test]
    fn bad_offset_rejected() {
        let mut cfg = Config::default();
        cfg.display.utc_offset = "Asia/Jerusalem".into();
        assert_validation_err(&cfg, "display.utc_offset");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        cfg.upstream.device_url = "ftp://pi".into();
        cfg.polling.interval_sec = 0;
        let msg = format!("{:#}", cfg.validate().unwrap_err());
        assert!(msg.contains("3 errors"), "unexpected message: {msg}");
        assert!(msg.contains("server.port"));
        assert!(msg.contains("device_url"));
        assert!(msg.contains("interval_sec"));
    }

    // -- Load -------------------------------------------------------------

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_or_default("/nonexistent/basil-hub.toml").unwrap();
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load("/nonexistent/basil-hub.toml").unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config"));
    }
}
