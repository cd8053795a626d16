//! Startup configuration: TOML file, dotenv, process environment and CLI
//! overrides resolved into one immutable [`RelayConfig`].

mod env;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{RelayError, Result};

pub use env::{Env, parse_dotenv};

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";
pub const DEFAULT_MODEL_VERSION: &str =
    "cjwbw/anything-v3.0:f410ed4c6a0c3bf8b76747860b3a3c9e4c8b5a827a16eac9dd5ad9642edce9a2";
pub const DEFAULT_API_KEY_ENV: &[&str] = &["REPLICATE_API_KEY", "REPLICATE_API_TOKEN"];
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Provider credential. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfigFile {
    pub provider: ProviderSection,
    pub server: ServerSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", alias = "version")]
    pub model_version: Option<String>,
    /// Extra environment variable names to look up the API key in, tried
    /// before the built-in names.
    #[serde(skip_serializing_if = "Vec::is_empty", alias = "api_key_envs")]
    pub api_key_env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl RelayConfigFile {
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&contents)
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_key: ApiKey,
    pub base_url: String,
    pub model_version: String,
    pub http_timeout: Duration,
    pub listen: String,
}

impl RelayConfig {
    /// Environment values win over the file; the file wins over defaults.
    pub fn resolve(file: &RelayConfigFile, env: &Env) -> Result<Self> {
        let key_names = file
            .provider
            .api_key_env
            .iter()
            .map(String::as_str)
            .chain(DEFAULT_API_KEY_ENV.iter().copied());
        let api_key = env.first_of(key_names).ok_or_else(|| {
            RelayError::Config(format!(
                "provider api key is not set (set one of: {})",
                DEFAULT_API_KEY_ENV.join(", ")
            ))
        })?;

        let base_url = env
            .get("REPLICATE_API_BASE")
            .or_else(|| non_empty(file.provider.base_url.as_deref()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        let model_version = env
            .get("REPLICATE_MODEL_VERSION")
            .or_else(|| non_empty(file.provider.model_version.as_deref()))
            .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string());

        let http_timeout = Duration::from_secs(
            file.provider
                .http_timeout_secs
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
                .max(1),
        );

        let host = env
            .get("HOST")
            .or_else(|| non_empty(file.server.host.as_deref()))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match env.get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| RelayError::Config(format!("PORT must be a number, got {raw:?}")))?,
            None => file.server.port.unwrap_or(DEFAULT_PORT),
        };

        Ok(Self {
            api_key: ApiKey::new(api_key),
            base_url,
            model_version,
            http_timeout,
            listen: format!("{host}:{port}"),
        })
    }

    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_a_config_error() {
        let err = RelayConfig::resolve(&RelayConfigFile::default(), &Env::isolated([("PORT", "1")]))
            .expect_err("no key");
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn defaults_fill_everything_but_the_key() -> Result<()> {
        let env = Env::isolated([("REPLICATE_API_KEY", "r8_test")]);
        let config = RelayConfig::resolve(&RelayConfigFile::default(), &env)?;
        assert_eq!(config.api_key.expose(), "r8_test");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model_version, DEFAULT_MODEL_VERSION);
        assert_eq!(config.http_timeout, Duration::from_secs(60));
        assert_eq!(config.listen, "0.0.0.0:3000");
        Ok(())
    }

    #[test]
    fn file_values_apply_and_env_overrides_them() -> Result<()> {
        let file = RelayConfigFile::parse(
            r#"
[provider]
base_url = "https://proxy.internal/v1/"
model_version = "owner/model:123"
api_key_env = ["ANIME_RELAY_KEY"]
http_timeout_secs = 15

[server]
host = "127.0.0.1"
port = 8088
"#,
        )?;
        let env = Env::isolated([
            ("ANIME_RELAY_KEY", "from-custom"),
            ("REPLICATE_API_KEY", "from-default"),
            ("PORT", "9000"),
        ]);
        let config = RelayConfig::resolve(&file, &env)?;
        assert_eq!(config.api_key.expose(), "from-custom");
        assert_eq!(config.base_url, "https://proxy.internal/v1");
        assert_eq!(config.model_version, "owner/model:123");
        assert_eq!(config.http_timeout, Duration::from_secs(15));
        assert_eq!(config.listen, "127.0.0.1:9000");
        Ok(())
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let env = Env::isolated([("REPLICATE_API_KEY", "k"), ("PORT", "eighty")]);
        let err = RelayConfig::resolve(&RelayConfigFile::default(), &env).expect_err("bad port");
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let err = RelayConfigFile::parse("[provider]\nmodel = \"x\"\n").expect_err("unknown key");
        assert!(matches!(err, RelayError::Toml(_)));
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let rendered = format!("{:?}", ApiKey::new("r8_secret"));
        assert!(!rendered.contains("r8_secret"));
    }

    #[tokio::test]
    async fn load_reads_file_from_disk() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[server]\nport = 4000\n").expect("write config");
        let file = RelayConfigFile::load(&path).await?;
        assert_eq!(file.server.port, Some(4000));
        Ok(())
    }
}
