//! # Shareport Config
//!
//! Configuration for the Shareport file server.
//!
//! Provides TOML-based parsing and validation for the listener set, the
//! share table, and server behavior (URL prefix, shutdown drain window,
//! logging, upload limits).
//!
//! # Configuration Schema
//!
//! The configuration file (`shareport.toml`) supports:
//! - `[server]` — prefix, drain wait, log level/format, upload size limit,
//!   optional HTTPS redirect target
//! - `[[listener]]` — one entry per address/port binding, with optional
//!   TLS certificate/key paths
//! - `[[share]]` — one entry per exposed filesystem root
//!
//! # Environment Variable Overrides
//!
//! Scalar `[server]` fields can be overridden via environment variables
//! using the `SHAREPORT_` prefix and `_` as section separator:
//! - `SHAREPORT_SERVER_PREFIX` → `server.prefix`
//! - `SHAREPORT_SERVER_DRAIN_WAIT_SECS` → `server.drain_wait_secs`
//! - `SHAREPORT_SERVER_LOG_LEVEL` → `server.log_level`
//! - `SHAREPORT_SERVER_LOG_FORMAT` → `server.log_format`
//! - `SHAREPORT_SERVER_MAX_UPLOAD_BYTES` → `server.max_upload_bytes`

use serde::{Deserialize, Serialize};

/// Top-level Shareport configuration.
///
/// Parsed from `shareport.toml` or constructed programmatically.
/// Environment variables with the `SHAREPORT_` prefix override TOML values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareportConfig {
    /// Server behavior.
    #[serde(default)]
    pub server: ServerConfig,
    /// Listener bindings. Defaults to plain HTTP on 0.0.0.0:8080.
    #[serde(default = "default_listeners", rename = "listener")]
    pub listeners: Vec<ListenerConfig>,
    /// Shares registered at startup.
    #[serde(default, rename = "share")]
    pub shares: Vec<ShareConfig>,
}

impl Default for ShareportConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            listeners: default_listeners(),
            shares: Vec::new(),
        }
    }
}

/// Server behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// URL prefix the whole application lives under (default: "/").
    /// Must start and end with '/'. Requests outside it are redirected.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Seconds to wait for in-flight connections to finish on shutdown
    /// before force-closing them (default: 30).
    #[serde(default = "default_drain_wait")]
    pub drain_wait_secs: u64,
    /// Log level (default: "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format: "text" (default) or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Maximum accepted request body size in bytes (default: 1 GiB).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// When set, plain-HTTP requests are redirected to this HTTPS
    /// host/port instead of being served.
    #[serde(default)]
    pub https_redirect: Option<HttpsRedirectConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            drain_wait_secs: default_drain_wait(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            max_upload_bytes: default_max_upload_bytes(),
            https_redirect: None,
        }
    }
}

/// HTTPS redirect target for plain-HTTP listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpsRedirectConfig {
    pub host: String,
    pub port: u16,
}

/// One address/port binding, optionally TLS-terminated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Bind address (default: "0.0.0.0").
    #[serde(default = "default_address")]
    pub address: String,
    /// Port (default: 8080).
    #[serde(default = "default_port")]
    pub port: u16,
    /// PEM certificate chain path. TLS is enabled when both `tls_cert`
    /// and `tls_key` are set.
    #[serde(default)]
    pub tls_cert: Option<String>,
    /// PEM private key path.
    #[serde(default)]
    pub tls_key: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl ListenerConfig {
    /// Whether this listener terminates TLS.
    pub fn is_tls(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }
}

/// One share registered at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Share name; the first URL path segment.
    pub name: String,
    /// Filesystem root; a directory or a single file. Must exist.
    pub path: String,
    /// Excluded from the index page but still directly reachable.
    #[serde(default)]
    pub hidden: bool,
    /// Rejects all mutating operations.
    #[serde(default)]
    pub readonly: bool,
    /// When false, directory listings come back empty.
    #[serde(default = "default_true")]
    pub listable: bool,
}

fn default_prefix() -> String {
    "/".to_string()
}
fn default_drain_wait() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_max_upload_bytes() -> usize {
    1024 * 1024 * 1024
}
fn default_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_listeners() -> Vec<ListenerConfig> {
    vec![ListenerConfig::default()]
}
fn default_true() -> bool {
    true
}

impl ShareportConfig {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides and validate.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        Self::parse_toml(&contents)
    }

    /// Parse configuration from a TOML string, apply env overrides, then
    /// validate.
    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        let mut config: ShareportConfig = toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SHAREPORT_SERVER_PREFIX") {
            self.server.prefix = v;
        }
        if let Ok(v) = std::env::var("SHAREPORT_SERVER_DRAIN_WAIT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.server.drain_wait_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("SHAREPORT_SERVER_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Ok(v) = std::env::var("SHAREPORT_SERVER_LOG_FORMAT") {
            self.server.log_format = v;
        }
        if let Ok(v) = std::env::var("SHAREPORT_SERVER_MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = v.parse::<usize>() {
                self.server.max_upload_bytes = bytes;
            }
        }
    }

    /// Validate the configuration, returning a descriptive error for the
    /// first problem found.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.server.prefix.starts_with('/') || !self.server.prefix.ends_with('/') {
            anyhow::bail!(
                "server.prefix must start and end with '/' (got '{}').",
                self.server.prefix
            );
        }
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.server.log_level.as_str()) {
            anyhow::bail!(
                "server.log_level must be one of: {} (got '{}').",
                valid_log_levels.join(", "),
                self.server.log_level
            );
        }
        let valid_log_formats = ["text", "json"];
        if !valid_log_formats.contains(&self.server.log_format.as_str()) {
            anyhow::bail!(
                "server.log_format must be one of: {} (got '{}').",
                valid_log_formats.join(", "),
                self.server.log_format
            );
        }
        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("server.max_upload_bytes must be > 0.");
        }

        if self.listeners.is_empty() {
            anyhow::bail!("At least one [[listener]] is required.");
        }
        for listener in &self.listeners {
            if listener.port == 0 {
                anyhow::bail!(
                    "listener {}: port must be > 0.",
                    listener.address
                );
            }
            if listener.tls_cert.is_some() != listener.tls_key.is_some() {
                anyhow::bail!(
                    "listener {}:{}: tls_cert and tls_key must be set together.",
                    listener.address,
                    listener.port
                );
            }
        }

        let mut seen = std::collections::HashSet::new();
        for share in &self.shares {
            if share.name.is_empty() {
                anyhow::bail!("share name must not be empty.");
            }
            if !seen.insert(share.name.as_str()) {
                anyhow::bail!("share '{}' is declared more than once.", share.name);
            }
        }

        if let Some(redir) = &self.server.https_redirect {
            if redir.host.is_empty() {
                anyhow::bail!("server.https_redirect.host must not be empty.");
            }
            if redir.port == 0 {
                anyhow::bail!("server.https_redirect.port must be > 0.");
            }
        }

        Ok(())
    }

    /// Generate an example `shareport.toml` with inline documentation.
    pub fn example_toml_commented() -> String {
        r#"# Shareport configuration file.
# All [server] scalar values can be overridden via SHAREPORT_* env vars,
# e.g. SHAREPORT_SERVER_LOG_LEVEL=debug.

[server]
# URL prefix the application lives under. Must start and end with '/'.
prefix = "/"
# Seconds to wait for in-flight connections on shutdown before
# force-closing them.
drain_wait_secs = 30
# Log level: trace, debug, info, warn, error.
log_level = "info"
# Log format: "text" or "json".
log_format = "text"
# Maximum accepted request body size in bytes.
max_upload_bytes = 1073741824

# Redirect plain-HTTP requests to an HTTPS listener. Optional.
# [server.https_redirect]
# host = "files.example.com"
# port = 8443

# One [[listener]] block per binding. TLS is enabled when both tls_cert
# and tls_key are set.
[[listener]]
address = "0.0.0.0"
port = 8080

# [[listener]]
# address = "0.0.0.0"
# port = 8443
# tls_cert = "/etc/shareport/cert.pem"
# tls_key = "/etc/shareport/key.pem"

# One [[share]] block per exposed filesystem root. The path may also be a
# single file.
[[share]]
name = "shared"
path = "/srv/files"
# hidden = false      # omit from the index page
# readonly = false    # reject upload/delete/move/copy
# listable = true     # when false, directory contents are not listed
"#
        .to_string()
    }
}
