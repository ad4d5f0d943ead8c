//! Configuration types for mesh-dns-sync.
//!
//! Sources, lowest precedence first:
//! 1. TOML file
//! 2. `MESH_DNS_SYNC__<SECTION>__<KEY>` environment variables
//! 3. flat legacy variables (`cf-key`, `cf_key`, `ts-tailnet`, `SYNC_INTERVAL_MINUTES`, ...)
//! 4. secret files named after the legacy keys (`/run/secrets/cf-key`, ...)

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::SyncError;
use crate::mesh::MeshAddressSpace;
use crate::naming::{HostnameTransform, NamingScheme};

/// Prefix for structured environment overrides.
pub const ENV_PREFIX: &str = "MESH_DNS_SYNC";

/// Default directory for Docker/Kubernetes secret files.
pub const DEFAULT_SECRETS_DIR: &str = "/run/secrets";

/// Sync interval used when none (or an invalid one) is configured.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 15;

/// Legacy flat keys and the config path each one sets.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("mode", "sync.mode"),
    ("prefix", "sync.prefix"),
    ("postfix", "sync.postfix"),
    ("SYNC_INTERVAL_MINUTES", "sync.interval_minutes"),
    ("cf-key", "cloudflare.api_key"),
    ("cf-domain", "cloudflare.domain"),
    ("cf-sub", "cloudflare.subdomain"),
    ("ts-key", "tailscale.api_key"),
    ("ts-clientid", "tailscale.client_id"),
    ("ts-clientsecret", "tailscale.client_secret"),
    ("ts-tailnet", "tailscale.tailnet"),
    ("hs-apikey", "headscale.api_key"),
    ("hs-baseurl", "headscale.base_url"),
];

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sync behaviour.
    #[serde(default)]
    pub sync: SyncConfig,

    /// DNS provider (Cloudflare) configuration.
    pub cloudflare: CloudflareConfig,

    /// Tailscale credentials, required in `tailscale` mode.
    #[serde(default)]
    pub tailscale: Option<TailscaleConfig>,

    /// Headscale credentials, required in `headscale` mode.
    #[serde(default)]
    pub headscale: Option<HeadscaleConfig>,

    /// Shared HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Which mesh control plane to read membership from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshMode {
    /// Tailscale SaaS API.
    #[default]
    Tailscale,
    /// Self-hosted Headscale API.
    Headscale,
}

impl MeshMode {
    /// Mode name as configured.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeshMode::Tailscale => "tailscale",
            MeshMode::Headscale => "headscale",
        }
    }
}

/// Sync behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Mesh provider.
    #[serde(default)]
    pub mode: MeshMode,

    /// Prepended to every hostname label.
    #[serde(default)]
    pub prefix: String,

    /// Appended to every hostname label.
    #[serde(default)]
    pub postfix: String,

    /// Minutes between cycles. Kept raw so bad input can fall back to the default.
    #[serde(default)]
    pub interval_minutes: Option<IntervalSetting>,

    /// CIDR prefixes treated as mesh addresses. Empty means the Tailscale ranges.
    #[serde(default)]
    pub mesh_prefixes: Vec<String>,
}

/// Raw interval value as it arrived from a file, env var or secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalSetting {
    /// Integer value.
    Integer(i64),
    /// Floating point value (rejected).
    Float(f64),
    /// String value, parsed leniently.
    Text(String),
    /// Any other value type (rejected).
    Other(serde_json::Value),
}

impl SyncConfig {
    /// Configured interval in minutes, or `None` when a value is set but is
    /// not a positive integer. Unset yields [`DEFAULT_INTERVAL_MINUTES`].
    pub fn parsed_interval_minutes(&self) -> Option<u64> {
        let minutes = match &self.interval_minutes {
            None => return Some(DEFAULT_INTERVAL_MINUTES),
            Some(IntervalSetting::Integer(n)) => Some(*n),
            Some(IntervalSetting::Text(s)) => s.trim().parse::<i64>().ok(),
            Some(IntervalSetting::Float(_)) | Some(IntervalSetting::Other(_)) => None,
        };
        minutes.filter(|n| *n > 0).map(i64::unsigned_abs)
    }

    /// Interval in minutes; invalid values fall back to
    /// [`DEFAULT_INTERVAL_MINUTES`].
    pub fn interval_minutes(&self) -> u64 {
        self.parsed_interval_minutes()
            .unwrap_or(DEFAULT_INTERVAL_MINUTES)
    }

    /// Interval between cycles, saturating for absurdly large values.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes().saturating_mul(60))
    }

    /// Hostname transform built from prefix/postfix.
    pub fn transform(&self) -> HostnameTransform {
        HostnameTransform::new(self.prefix.clone(), self.postfix.clone())
    }
}

/// Cloudflare configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareConfig {
    /// API token with DNS edit permission on the zone.
    pub api_key: String,

    /// Managed domain (zone name).
    pub domain: String,

    /// Optional subdomain label all records live under.
    #[serde(default)]
    pub subdomain: Option<String>,

    /// API base URL.
    #[serde(default = "default_cloudflare_url")]
    pub api_url: String,

    /// TTL for created records; 1 means automatic.
    #[serde(default = "default_record_ttl")]
    pub ttl: u32,

    /// Whether created records are proxied.
    #[serde(default)]
    pub proxied: bool,
}

impl CloudflareConfig {
    /// Subdomain, treating an empty string as unset.
    pub fn subdomain(&self) -> Option<&str> {
        self.subdomain.as_deref().filter(|s| !s.is_empty())
    }
}

/// Tailscale API configuration. Either `api_key` or both OAuth client fields
/// must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailscaleConfig {
    /// API access token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// OAuth client id.
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Tailnet name; `-` selects the tailnet of the credentials.
    #[serde(default = "default_tailnet")]
    pub tailnet: String,

    /// API base URL.
    #[serde(default = "default_tailscale_url")]
    pub api_url: String,
}

/// Headscale API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadscaleConfig {
    /// API key.
    pub api_key: String,

    /// Base URL of the Headscale server (e.g. "https://hs.example.com").
    pub base_url: String,
}

/// Shared HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "mesh_dns_sync=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "mesh-dns-sync".to_string()
}

fn default_tailnet() -> String {
    "-".to_string()
}

fn default_record_ttl() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cloudflare_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_tailscale_url() -> String {
    "https://api.tailscale.com".to_string()
}

impl Config {
    /// Load configuration from all sources and validate it.
    pub fn load(path: &Path, secrets_dir: &Path) -> Result<Self, SyncError> {
        Self::load_from(path, secrets_dir, None, |name| std::env::var(name).ok())
    }

    /// Load with an explicit environment. `prefixed_env` replaces the process
    /// environment for `MESH_DNS_SYNC__*` keys when set; `env` resolves the
    /// legacy flat keys.
    fn load_from<F>(
        path: &Path,
        secrets_dir: &Path,
        prefixed_env: Option<config::Map<String, String>>,
        env: F,
    ) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("sync.mesh_prefixes")
                    .source(prefixed_env),
            );

        for (key, value) in legacy_overrides(secrets_dir, env)? {
            builder = builder.set_override(key, value)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field requirements that serde cannot express.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.cloudflare.api_key.trim().is_empty() {
            return Err(SyncError::Config("cloudflare.api_key (cf-key) is required".into()));
        }
        if self.cloudflare.domain.trim().is_empty() {
            return Err(SyncError::Config("cloudflare.domain (cf-domain) is required".into()));
        }
        Url::parse(&self.cloudflare.api_url)?;

        match self.sync.mode {
            MeshMode::Tailscale => {
                let ts = self.tailscale.as_ref().ok_or_else(|| {
                    SyncError::Config("tailscale mode requires a [tailscale] section".into())
                })?;
                let has_key = non_empty(&ts.api_key);
                let has_oauth = non_empty(&ts.client_id) && non_empty(&ts.client_secret);
                if !has_key && !has_oauth {
                    return Err(SyncError::Config(
                        "tailscale requires api_key (ts-key) or client_id/client_secret (ts-clientid/ts-clientsecret)".into(),
                    ));
                }
                Url::parse(&ts.api_url)?;
            }
            MeshMode::Headscale => {
                let hs = self.headscale.as_ref().ok_or_else(|| {
                    SyncError::Config("headscale mode requires a [headscale] section".into())
                })?;
                if hs.api_key.trim().is_empty() {
                    return Err(SyncError::Config("headscale.api_key (hs-apikey) is required".into()));
                }
                Url::parse(&hs.base_url)?;
            }
        }

        self.address_space()?;
        Ok(())
    }

    /// Naming scheme for the managed part of the zone.
    pub fn naming_scheme(&self) -> NamingScheme {
        NamingScheme::new(
            &self.cloudflare.domain,
            self.cloudflare.subdomain(),
            self.sync.transform(),
        )
    }

    /// Mesh address space from `sync.mesh_prefixes`.
    pub fn address_space(&self) -> Result<MeshAddressSpace, SyncError> {
        MeshAddressSpace::from_cidrs(&self.sync.mesh_prefixes)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Collect legacy flat-key overrides. For each key, a secret file wins over an
/// environment variable named `key` or `key` with dashes replaced by
/// underscores. Empty values are ignored.
pub fn legacy_overrides<F>(
    secrets_dir: &Path,
    env: F,
) -> Result<Vec<(&'static str, String)>, SyncError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut overrides = Vec::new();

    for (key, path) in LEGACY_KEYS {
        let value = match read_secret(secrets_dir, key)? {
            Some(secret) => Some(secret),
            None => env(key).or_else(|| env(&key.replace('-', "_"))),
        };
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            overrides.push((*path, value));
        }
    }

    Ok(overrides)
}

/// First line of `<dir>/<key>`, trimmed, if the file exists.
fn read_secret(dir: &Path, key: &str) -> Result<Option<String>, SyncError> {
    let path = dir.join(key);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)?;
    Ok(Some(
        contents.lines().next().unwrap_or_default().trim().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cloudflare() -> CloudflareConfig {
        CloudflareConfig {
            api_key: "cf-token".into(),
            domain: "example.com".into(),
            subdomain: None,
            api_url: default_cloudflare_url(),
            ttl: 1,
            proxied: false,
        }
    }

    fn tailscale_config() -> Config {
        Config {
            sync: SyncConfig::default(),
            cloudflare: cloudflare(),
            tailscale: Some(TailscaleConfig {
                api_key: Some("tskey-api-123".into()),
                client_id: None,
                client_secret: None,
                tailnet: default_tailnet(),
                api_url: default_tailscale_url(),
            }),
            headscale: None,
            http: HttpConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    #[test]
    fn test_interval_defaults() {
        let mut sync = SyncConfig::default();
        assert_eq!(sync.interval_minutes(), 15);

        sync.interval_minutes = Some(IntervalSetting::Integer(5));
        assert_eq!(sync.interval(), Duration::from_secs(300));

        sync.interval_minutes = Some(IntervalSetting::Text(" 7 ".into()));
        assert_eq!(sync.interval_minutes(), 7);

        sync.interval_minutes = Some(IntervalSetting::Integer(0));
        assert_eq!(sync.interval_minutes(), 15);

        sync.interval_minutes = Some(IntervalSetting::Text("-3".into()));
        assert_eq!(sync.interval_minutes(), 15);

        sync.interval_minutes = Some(IntervalSetting::Text("soon".into()));
        assert_eq!(sync.interval_minutes(), 15);

        sync.interval_minutes = Some(IntervalSetting::Float(2.5));
        assert_eq!(sync.interval_minutes(), 15);
        assert_eq!(sync.parsed_interval_minutes(), None);

        sync.interval_minutes = Some(IntervalSetting::Other(serde_json::Value::Bool(true)));
        assert_eq!(sync.interval_minutes(), 15);
    }

    #[test]
    fn test_interval_saturates_for_huge_values() {
        let sync = SyncConfig {
            interval_minutes: Some(IntervalSetting::Text(i64::MAX.to_string())),
            ..Default::default()
        };
        assert_eq!(sync.parsed_interval_minutes(), Some(i64::MAX as u64));
        assert_eq!(sync.interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_non_scalar_interval_falls_back_to_default() {
        for value in ["true", "[1, 2]", "{ minutes = 5 }"] {
            let toml = format!(
                r#"
                [sync]
                interval_minutes = {value}

                [cloudflare]
                api_key = "token"
                domain = "example.com"

                [tailscale]
                api_key = "tskey-api-123"
            "#
            );
            let config: Config = config::Config::builder()
                .add_source(config::File::from_str(&toml, config::FileFormat::Toml))
                .build()
                .unwrap()
                .try_deserialize()
                .unwrap();

            assert_eq!(config.sync.parsed_interval_minutes(), None, "{value}");
            assert_eq!(config.sync.interval_minutes(), 15, "{value}");
        }
    }

    #[test]
    fn test_load_layers_file_env_legacy_and_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh-dns-sync.toml");
        std::fs::write(
            &path,
            r#"
            [sync]
            prefix = "file-"
            postfix = "-file"
            interval_minutes = true

            [cloudflare]
            api_key = "file-token"
            domain = "file.example.com"
            subdomain = "file"

            [tailscale]
            api_key = "file-ts-key"
            tailnet = "file-tailnet"
            "#,
        )
        .unwrap();

        let secrets = dir.path().join("secrets");
        std::fs::create_dir(&secrets).unwrap();
        std::fs::write(secrets.join("ts-key"), "secret-ts-key\n").unwrap();

        let prefixed: config::Map<String, String> = [
            ("MESH_DNS_SYNC__SYNC__PREFIX", "env-"),
            ("MESH_DNS_SYNC__SYNC__POSTFIX", "-env"),
            ("MESH_DNS_SYNC__CLOUDFLARE__SUBDOMAIN", "env"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let legacy: HashMap<&str, &str> = HashMap::from([
            ("postfix", "-legacy"),
            ("cf_sub", "legacy"),
            ("ts-key", "legacy-ts-key"),
        ]);

        let config = Config::load_from(&path, &secrets, Some(prefixed), |k| {
            legacy.get(k).map(|v| v.to_string())
        })
        .unwrap();

        // File only.
        assert_eq!(config.cloudflare.domain, "file.example.com");
        assert_eq!(config.cloudflare.api_key, "file-token");
        // Env over file.
        assert_eq!(config.sync.prefix, "env-");
        // Legacy over env.
        assert_eq!(config.sync.postfix, "-legacy");
        assert_eq!(config.cloudflare.subdomain(), Some("legacy"));
        // Secret file over legacy env.
        assert_eq!(
            config.tailscale.as_ref().and_then(|t| t.api_key.as_deref()),
            Some("secret-ts-key")
        );
        assert_eq!(
            config.tailscale.as_ref().map(|t| t.tailnet.as_str()),
            Some("file-tailnet")
        );
        // Bad interval type does not stop loading.
        assert_eq!(config.sync.interval_minutes(), 15);
    }

    #[test]
    fn test_load_missing_file_uses_legacy_keys() {
        let dir = tempfile::tempdir().unwrap();
        let legacy: HashMap<&str, &str> = HashMap::from([
            ("cf-key", "cf-token"),
            ("cf-domain", "example.com"),
            ("mode", "headscale"),
            ("hs-apikey", "hs-key"),
            ("hs-baseurl", "https://hs.example.com"),
            ("SYNC_INTERVAL_MINUTES", "30"),
        ]);

        let config = Config::load_from(
            &dir.path().join("absent.toml"),
            dir.path(),
            Some(config::Map::new()),
            |k| legacy.get(k).map(|v| v.to_string()),
        )
        .unwrap();

        assert_eq!(config.sync.mode, MeshMode::Headscale);
        assert_eq!(config.sync.interval(), Duration::from_secs(30 * 60));
        assert_eq!(
            config.headscale.as_ref().map(|h| h.base_url.as_str()),
            Some("https://hs.example.com")
        );
    }

    #[test]
    fn test_validate_tailscale_credentials() {
        let config = tailscale_config();
        assert!(config.validate().is_ok());

        let mut oauth = tailscale_config();
        if let Some(ts) = oauth.tailscale.as_mut() {
            ts.api_key = None;
            ts.client_id = Some("id".into());
            ts.client_secret = Some("secret".into());
        }
        assert!(oauth.validate().is_ok());

        let mut missing = tailscale_config();
        if let Some(ts) = missing.tailscale.as_mut() {
            ts.api_key = Some(String::new());
            ts.client_id = Some("id".into());
        }
        assert!(matches!(missing.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_validate_headscale_section_required() {
        let mut config = tailscale_config();
        config.sync.mode = MeshMode::Headscale;
        assert!(config.validate().is_err());

        config.headscale = Some(HeadscaleConfig {
            api_key: "hs-key".into(),
            base_url: "https://hs.example.com".into(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_mesh_prefix() {
        let mut config = tailscale_config();
        config.sync.mesh_prefixes = vec!["100.64.0.0/99".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_naming_scheme_from_config() {
        let mut config = tailscale_config();
        config.cloudflare.subdomain = Some("TS".into());
        config.sync.prefix = "m-".into();
        let scheme = config.naming_scheme();
        assert_eq!(scheme.fqdn("nas"), "m-nas.ts.example.com");

        config.cloudflare.subdomain = Some(String::new());
        assert_eq!(config.naming_scheme().subdomain(), None);
    }

    #[test]
    fn test_legacy_overrides_secret_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cf-key"), "from-secret\nignored\n").unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            ("cf_key", "from-env"),
            ("cf-domain", "example.com"),
            ("ts-tailnet", ""),
            ("SYNC_INTERVAL_MINUTES", "5"),
        ]);
        let overrides =
            legacy_overrides(dir.path(), |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert!(overrides.contains(&("cloudflare.api_key", "from-secret".to_string())));
        assert!(overrides.contains(&("cloudflare.domain", "example.com".to_string())));
        assert!(overrides.contains(&("sync.interval_minutes", "5".to_string())));
        assert!(!overrides.iter().any(|(k, _)| *k == "tailscale.tailnet"));
    }

    #[test]
    fn test_deserialize_from_toml() {
        let toml = r#"
            [sync]
            mode = "headscale"
            prefix = "hs-"
            interval_minutes = "abc"

            [cloudflare]
            api_key = "token"
            domain = "example.com"
            subdomain = "mesh"

            [headscale]
            api_key = "key"
            base_url = "https://hs.example.com"
        "#;
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.sync.mode, MeshMode::Headscale);
        assert_eq!(config.sync.interval_minutes(), 15);
        assert_eq!(config.cloudflare.ttl, 1);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.validate().is_ok());
        assert_eq!(config.naming_scheme().managed_suffix(), ".mesh.example.com");
    }
}
