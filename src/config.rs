use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::driver::ExposedPort;

const DEFAULT_RESERVATION_TIMEOUT_MS: u64 = 5000;
const DEFAULT_RESERVATION_COOLDOWN_MS: u64 = 500;
const DEFAULT_LOOKUP_COOLDOWN_MS: u64 = 500;
const DEFAULT_CONVERGE_COOLDOWN_MS: u64 = 500;
const DEFAULT_CONVERGE_RETRIES: u32 = 20;
const DEFAULT_RESERVATION_RETRIES: u32 = 3;

/// Which container runtime variant the maker drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Docker,
    Swarm,
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing required option {}", key),
            ConfigError::Invalid(key, value) => {
                write!(f, "invalid value for {}: {}", key, value)
            }
        }
    }
}

impl Error for ConfigError {}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings the API process needs.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub redis_url: String,
    pub reservation_timeout: Duration,
    pub control_port: String,
}

impl ApiConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source(source: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        Ok(ApiConfig {
            redis_url: required(&source, "REDIS_SERVER_URL")?,
            reservation_timeout: millis(
                &source,
                "RESERVATION_TIMEOUT",
                DEFAULT_RESERVATION_TIMEOUT_MS,
            )?,
            control_port: required(&source, "IMAGE_CONTROL_PORT")?,
        })
    }
}

/// Settings the maker process needs.
#[derive(Debug, Clone)]
pub struct MakerConfig {
    pub redis_url: String,
    pub max_jobs: usize,
    pub image: String,
    pub expose_port: ExposedPort,
    pub control_port: String,
    pub network: String,
    pub backend: Backend,
    pub registry_username: Option<String>,
    pub registry_password: Option<String>,
    pub reservation_timeout: Duration,
    pub reservation_retries: u32,
    pub reservation_cooldown: Duration,
    pub lookup_cooldown: Duration,
    pub converge_verify_cooldown: Duration,
    pub converge_verify_retries: u32,
}

impl MakerConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source(source: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let expose_port = required(&source, "IMAGE_EXPOSE_PORT")?;
        let expose_port = expose_port
            .parse::<ExposedPort>()
            .map_err(|_| ConfigError::Invalid("IMAGE_EXPOSE_PORT", expose_port))?;

        Ok(MakerConfig {
            redis_url: required(&source, "REDIS_SERVER_URL")?,
            max_jobs: number(&source, "MAX_CONCURRENT_JOBS")?,
            image: required(&source, "IMAGE_TO_PULL")?,
            expose_port,
            control_port: required(&source, "IMAGE_CONTROL_PORT")?,
            network: source("DOCKER_NETWORK").unwrap_or_default(),
            backend: backend(&source)?,
            registry_username: source("IMAGE_REGISTRY_USERNAME").filter(|v| !v.is_empty()),
            registry_password: source("IMAGE_REGISTRY_PASSWORD").filter(|v| !v.is_empty()),
            reservation_timeout: millis(
                &source,
                "RESERVATION_TIMEOUT",
                DEFAULT_RESERVATION_TIMEOUT_MS,
            )?,
            reservation_retries: number_or(
                &source,
                "RESERVATION_RETRY_TIMES",
                DEFAULT_RESERVATION_RETRIES,
            )?,
            reservation_cooldown: millis(
                &source,
                "RESERVATION_COOLDOWN",
                DEFAULT_RESERVATION_COOLDOWN_MS,
            )?,
            lookup_cooldown: millis(&source, "LOOKUP_COOLDOWN", DEFAULT_LOOKUP_COOLDOWN_MS)?,
            converge_verify_cooldown: millis(
                &source,
                "CONVERGE_VERIFY_COOLDOWN",
                DEFAULT_CONVERGE_COOLDOWN_MS,
            )?,
            converge_verify_retries: number_or(
                &source,
                "CONVERGE_VERIFY_RETRY_TIMES",
                DEFAULT_CONVERGE_RETRIES,
            )?,
        })
    }
}

fn required(
    source: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> ConfigResult<String> {
    source(key)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn number<T: FromStr>(
    source: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> ConfigResult<T> {
    let raw = required(source, key)?;
    raw.parse::<T>()
        .map_err(|_| ConfigError::Invalid(key, raw))
}

fn number_or<T: FromStr>(
    source: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> ConfigResult<T> {
    match source(key) {
        Some(raw) if !raw.is_empty() => {
            raw.parse::<T>().map_err(|_| ConfigError::Invalid(key, raw))
        }
        _ => Ok(default),
    }
}

fn millis(
    source: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> ConfigResult<Duration> {
    let value: u64 = number_or(source, key, default)?;
    Ok(Duration::from_millis(value))
}

fn backend(source: &impl Fn(&str) -> Option<String>) -> ConfigResult<Backend> {
    match source("CONTAINER_BACKEND").as_deref() {
        None | Some("") | Some("docker") => Ok(Backend::Docker),
        Some("swarm") => Ok(Backend::Swarm),
        Some(other) => Err(ConfigError::Invalid("CONTAINER_BACKEND", other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn api_config_with_defaults() {
        let config = ApiConfig::from_source(source(&[
            ("REDIS_SERVER_URL", "redis:6379"),
            ("IMAGE_CONTROL_PORT", "3000"),
        ]))
        .unwrap();

        assert_eq!(config.redis_url, "redis:6379");
        assert_eq!(config.control_port, "3000");
        assert_eq!(config.reservation_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn api_config_requires_store_url() {
        let result = ApiConfig::from_source(source(&[("IMAGE_CONTROL_PORT", "3000")]));
        assert!(matches!(result, Err(ConfigError::Missing("REDIS_SERVER_URL"))));
    }

    #[test]
    fn maker_config_full_parse() {
        let config = MakerConfig::from_source(source(&[
            ("REDIS_SERVER_URL", "redis:6379"),
            ("MAX_CONCURRENT_JOBS", "8"),
            ("IMAGE_TO_PULL", "registry.example/game:latest"),
            ("IMAGE_EXPOSE_PORT", "27015/udp"),
            ("IMAGE_CONTROL_PORT", "3000"),
            ("DOCKER_NETWORK", "game-net"),
            ("CONTAINER_BACKEND", "swarm"),
            ("IMAGE_REGISTRY_USERNAME", "deploy"),
            ("IMAGE_REGISTRY_PASSWORD", "secret"),
            ("RESERVATION_TIMEOUT", "2500"),
            ("RESERVATION_RETRY_TIMES", "5"),
            ("RESERVATION_COOLDOWN", "250"),
            ("LOOKUP_COOLDOWN", "100"),
            ("CONVERGE_VERIFY_COOLDOWN", "200"),
            ("CONVERGE_VERIFY_RETRY_TIMES", "30"),
        ]))
        .unwrap();

        assert_eq!(config.max_jobs, 8);
        assert_eq!(config.backend, Backend::Swarm);
        assert_eq!(config.expose_port.to_string(), "27015/udp");
        assert_eq!(config.registry_username.as_deref(), Some("deploy"));
        assert_eq!(config.reservation_timeout, Duration::from_millis(2500));
        assert_eq!(config.reservation_retries, 5);
        assert_eq!(config.lookup_cooldown, Duration::from_millis(100));
        assert_eq!(config.converge_verify_retries, 30);
    }

    #[test]
    fn maker_config_defaults() {
        let config = MakerConfig::from_source(source(&[
            ("REDIS_SERVER_URL", "redis:6379"),
            ("MAX_CONCURRENT_JOBS", "4"),
            ("IMAGE_TO_PULL", "game:latest"),
            ("IMAGE_EXPOSE_PORT", "3000/tcp"),
            ("IMAGE_CONTROL_PORT", "3000"),
        ]))
        .unwrap();

        assert_eq!(config.backend, Backend::Docker);
        assert_eq!(config.network, "");
        assert_eq!(config.registry_username, None);
        assert_eq!(config.reservation_cooldown, Duration::from_millis(500));
        assert_eq!(config.lookup_cooldown, Duration::from_millis(500));
    }

    #[test]
    fn rejects_malformed_numbers() {
        let result = MakerConfig::from_source(source(&[
            ("REDIS_SERVER_URL", "redis:6379"),
            ("MAX_CONCURRENT_JOBS", "many"),
            ("IMAGE_TO_PULL", "game:latest"),
            ("IMAGE_EXPOSE_PORT", "3000/tcp"),
            ("IMAGE_CONTROL_PORT", "3000"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("MAX_CONCURRENT_JOBS", _))
        ));
    }

    #[test]
    fn rejects_unknown_backend() {
        let result = MakerConfig::from_source(source(&[
            ("REDIS_SERVER_URL", "redis:6379"),
            ("MAX_CONCURRENT_JOBS", "4"),
            ("IMAGE_TO_PULL", "game:latest"),
            ("IMAGE_EXPOSE_PORT", "3000/tcp"),
            ("IMAGE_CONTROL_PORT", "3000"),
            ("CONTAINER_BACKEND", "nomad"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid("CONTAINER_BACKEND", _))
        ));
    }
}
