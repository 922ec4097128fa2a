use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

// ── Defaults ─────────────────────────────────────────────────────────────────

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_LOCAL_EXTRACTION_MODEL: &str = "gemma3:12b-it-qat";
const DEFAULT_REMOTE_BASE_URL: &str = "https://api.poe.com/v1";
const DEFAULT_EXTRACTION_MODEL: &str = "gemini-2.0-flash-lite";
const DEFAULT_IMAGE_MODEL: &str = "nano-banana";
const DEFAULT_WORKER_POOL_SIZE: usize = 8;
const DEFAULT_CANCEL_GRACE_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Which host serves the menu extraction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    /// Self-hosted model server (Ollama) exposing the OpenAI-compatible API.
    Local,
    Remote,
}

/// One OpenAI-compatible endpoint plus the model to ask for.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEndpoint {
    pub base_url: Url,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub backend: ModelBackend,
    pub extraction: ModelEndpoint,
    pub image: ModelEndpoint,
    pub worker_pool_size: usize,
    pub cancel_grace: Duration,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Read configuration from the process environment, loading `.env` first
    /// when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr: SocketAddr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "BIND_ADDR",
                message: e.to_string(),
            })?;

        let backend = match get("MODEL_BACKEND").as_deref().map(str::to_lowercase) {
            None => ModelBackend::Remote,
            Some(v) if v == "remote" => ModelBackend::Remote,
            Some(v) if v == "local" => ModelBackend::Local,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "MODEL_BACKEND",
                    message: format!("expected 'local' or 'remote', got '{}'", other),
                })
            }
        };

        let remote_base = parse_url(
            "OPENAI_BASE_URL",
            get("OPENAI_BASE_URL").as_deref().unwrap_or(DEFAULT_REMOTE_BASE_URL),
        )?;
        let api_key = get("OPENAI_API_KEY");

        let extraction = match backend {
            ModelBackend::Local => ModelEndpoint {
                base_url: parse_url(
                    "LOCAL_BASE_URL",
                    get("LOCAL_BASE_URL").as_deref().unwrap_or(DEFAULT_LOCAL_BASE_URL),
                )?,
                model: get("LOCAL_EXTRACTION_MODEL")
                    .unwrap_or_else(|| DEFAULT_LOCAL_EXTRACTION_MODEL.to_string()),
                api_key: None,
            },
            ModelBackend::Remote => ModelEndpoint {
                base_url: remote_base.clone(),
                model: get("EXTRACTION_MODEL")
                    .unwrap_or_else(|| DEFAULT_EXTRACTION_MODEL.to_string()),
                api_key: api_key.clone(),
            },
        };

        let image = ModelEndpoint {
            base_url: remote_base,
            model: get("IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            api_key,
        };

        let worker_pool_size = parse_number("WORKER_POOL_SIZE", get("WORKER_POOL_SIZE"))?
            .unwrap_or(DEFAULT_WORKER_POOL_SIZE);
        if worker_pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_POOL_SIZE",
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            backend,
            extraction,
            image,
            worker_pool_size,
            cancel_grace: Duration::from_millis(
                parse_number("CANCEL_GRACE_MS", get("CANCEL_GRACE_MS"))?
                    .unwrap_or(DEFAULT_CANCEL_GRACE_MS),
            ),
            request_timeout: Duration::from_secs(
                parse_number("REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS"))?
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            max_upload_bytes: parse_number("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"))?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        })
    }
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        key,
        message: format!("'{}': {}", value, e),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            key,
            message: format!("'{}' is not an http(s) URL", value),
        });
    }
    Ok(url)
}

fn parse_number<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                message: format!("'{}': {}", v, e),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_use_remote_backend() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.backend, ModelBackend::Remote);
        assert_eq!(config.extraction.base_url.as_str(), "https://api.poe.com/v1");
        assert_eq!(config.extraction.model, "gemini-2.0-flash-lite");
        assert_eq!(config.image.model, "nano-banana");
        assert_eq!(config.worker_pool_size, 8);
        assert_eq!(config.cancel_grace, Duration::from_millis(500));
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
    }

    #[test]
    fn test_local_backend_switches_only_extraction() {
        let config = config_from(&[
            ("MODEL_BACKEND", "Local"),
            ("LOCAL_BASE_URL", "http://192.168.15.32:11434/v1"),
            ("OPENAI_API_KEY", "k"),
        ])
        .unwrap();
        assert_eq!(config.backend, ModelBackend::Local);
        assert_eq!(config.extraction.base_url.as_str(), "http://192.168.15.32:11434/v1");
        assert_eq!(config.extraction.model, "gemma3:12b-it-qat");
        assert_eq!(config.extraction.api_key, None);
        assert_eq!(config.image.base_url.as_str(), "https://api.poe.com/v1");
        assert_eq!(config.image.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_remote_endpoints_share_base_url_and_key() {
        let config = config_from(&[
            ("OPENAI_BASE_URL", "https://openrouter.ai/api/v1"),
            ("OPENAI_API_KEY", "secret"),
            ("EXTRACTION_MODEL", "gpt-4o-mini"),
            ("IMAGE_MODEL", "gpt-image-1"),
        ])
        .unwrap();
        assert_eq!(config.extraction.base_url, config.image.base_url);
        assert_eq!(config.extraction.api_key.as_deref(), Some("secret"));
        assert_eq!(config.extraction.model, "gpt-4o-mini");
        assert_eq!(config.image.model, "gpt-image-1");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(config_from(&[("MODEL_BACKEND", "cloud")]).is_err());
        assert!(config_from(&[("OPENAI_BASE_URL", "not a url")]).is_err());
        assert!(config_from(&[("OPENAI_BASE_URL", "ftp://host/v1")]).is_err());
        assert!(config_from(&[("WORKER_POOL_SIZE", "0")]).is_err());
        assert!(config_from(&[("CANCEL_GRACE_MS", "soon")]).is_err());
        assert!(config_from(&[("BIND_ADDR", "localhost")]).is_err());
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("IMAGE_MODEL", "  "), ("UPLOAD_DIR", "")]).unwrap();
        assert_eq!(config.image.model, "nano-banana");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
    }
}
