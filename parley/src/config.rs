use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

fn parse_env_list(var: &str) -> Vec<String> {
    env::var(var)
        .map(|value| {
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: Option<LlmConfig>,
    pub lock: LockConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
    pub busy_timeout_ms: u64,
    pub journal_mode: String,
    pub synchronous: String,
}

impl DatabaseConfig {
    /// Local file or `:memory:` database with default pragmas.
    pub fn local(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            local_path: None,
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
        }
    }
}

/// LLM configuration for the reasoning capability
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: Option<f32>,
}

/// Quorum lock settings. An empty `redis_urls` means a single in-process node.
#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    pub redis_urls: Vec<String>,
    pub ttl_ms: u64,
    pub acquire_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub retry_jitter_ms: u64,
    pub node_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Turns of history shown to each reasoning stage.
    pub history_window: u64,
    /// Cached resolutions older than this many turns are treated as stale.
    pub resolution_ttl_turns: i64,
    pub resolution_cache_capacity: usize,
    pub stage_timeout_secs: u64,
    pub turn_timeout_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            redis_urls: Vec::new(),
            ttl_ms: 30_000,
            acquire_timeout_ms: 10_000,
            retry_delay_ms: 200,
            retry_jitter_ms: 100,
            node_timeout_ms: 250,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            resolution_ttl_turns: 10,
            resolution_cache_capacity: 1024,
            stage_timeout_secs: 60,
            turn_timeout_secs: 180,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let lock_defaults = LockConfig::default();
        let pipeline_defaults = PipelineConfig::default();

        Self {
            server: ServerConfig {
                host: env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("PARLEY_PORT", 3000),
                api_keys: parse_env_list("PARLEY_API_KEYS"),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:parley.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
                busy_timeout_ms: parse_env_or("DATABASE_BUSY_TIMEOUT_MS", 5000),
                journal_mode: env::var("DATABASE_JOURNAL_MODE")
                    .unwrap_or_else(|_| "WAL".to_string()),
                synchronous: env::var("DATABASE_SYNCHRONOUS")
                    .unwrap_or_else(|_| "NORMAL".to_string()),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
                temperature: parse_env_opt("LLM_TEMPERATURE"),
            }),
            lock: LockConfig {
                redis_urls: parse_env_list("LOCK_REDIS_URLS"),
                ttl_ms: parse_env_or("LOCK_TTL_MS", lock_defaults.ttl_ms),
                acquire_timeout_ms: parse_env_or(
                    "LOCK_ACQUIRE_TIMEOUT_MS",
                    lock_defaults.acquire_timeout_ms,
                ),
                retry_delay_ms: parse_env_or("LOCK_RETRY_DELAY_MS", lock_defaults.retry_delay_ms),
                retry_jitter_ms: parse_env_or(
                    "LOCK_RETRY_JITTER_MS",
                    lock_defaults.retry_jitter_ms,
                ),
                node_timeout_ms: parse_env_or(
                    "LOCK_NODE_TIMEOUT_MS",
                    lock_defaults.node_timeout_ms,
                ),
            },
            pipeline: PipelineConfig {
                history_window: parse_env_or(
                    "PIPELINE_HISTORY_WINDOW",
                    pipeline_defaults.history_window,
                ),
                resolution_ttl_turns: parse_env_or(
                    "PIPELINE_RESOLUTION_TTL_TURNS",
                    pipeline_defaults.resolution_ttl_turns,
                ),
                resolution_cache_capacity: parse_env_or(
                    "PIPELINE_RESOLUTION_CACHE_CAPACITY",
                    pipeline_defaults.resolution_cache_capacity,
                ),
                stage_timeout_secs: parse_env_or(
                    "PIPELINE_STAGE_TIMEOUT_SECS",
                    pipeline_defaults.stage_timeout_secs,
                ),
                turn_timeout_secs: parse_env_or(
                    "PIPELINE_TURN_TIMEOUT_SECS",
                    pipeline_defaults.turn_timeout_secs,
                ),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to treating the whole string as a local model
    ("local", model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_server_config_defaults() {
        std::env::remove_var("PARLEY_HOST");
        std::env::remove_var("PARLEY_PORT");
        std::env::remove_var("PARLEY_API_KEYS");

        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert!(config.server.api_keys.is_empty());
    }

    #[test]
    #[serial]
    fn test_api_keys_are_trimmed_and_blank_entries_dropped() {
        std::env::set_var("PARLEY_API_KEYS", " key-one , ,key-two");
        let config = Config::default();
        assert_eq!(config.server.api_keys, vec!["key-one", "key-two"]);
        std::env::remove_var("PARLEY_API_KEYS");
    }

    #[test]
    #[serial]
    fn test_llm_config_is_optional() {
        std::env::remove_var("LLM_MODEL");
        assert!(Config::default().llm.is_none());

        std::env::set_var("LLM_MODEL", "openai/gpt-4o-mini");
        std::env::set_var("LLM_TIMEOUT", "12");
        let llm = Config::default().llm.unwrap();
        assert_eq!(llm.model, "openai/gpt-4o-mini");
        assert_eq!(llm.timeout_secs, 12);
        assert_eq!(llm.max_retries, 3);
        assert!(llm.temperature.is_none());

        std::env::remove_var("LLM_MODEL");
        std::env::remove_var("LLM_TIMEOUT");
    }

    #[test]
    #[serial]
    fn test_lock_config_from_env() {
        std::env::set_var("LOCK_REDIS_URLS", "redis://a:6379,redis://b:6379,redis://c:6379");
        std::env::set_var("LOCK_TTL_MS", "5000");

        let lock = Config::default().lock;
        assert_eq!(lock.redis_urls.len(), 3);
        assert_eq!(lock.ttl_ms, 5000);
        assert_eq!(lock.acquire_timeout_ms, 10_000);

        std::env::remove_var("LOCK_REDIS_URLS");
        std::env::remove_var("LOCK_TTL_MS");
    }

    #[test]
    #[serial]
    fn test_invalid_value_falls_back_to_default() {
        std::env::set_var("PIPELINE_HISTORY_WINDOW", "lots");
        let config = Config::default();
        assert_eq!(config.pipeline.history_window, 10);
        std::env::remove_var("PIPELINE_HISTORY_WINDOW");
    }

    #[test]
    #[serial]
    fn test_parse_env_or_valid_value() {
        std::env::set_var("__TEST_PARSE_PORT", "8080");
        let result: u16 = parse_env_or("__TEST_PARSE_PORT", 3000);
        assert_eq!(result, 8080);
        std::env::remove_var("__TEST_PARSE_PORT");
    }

    #[test]
    fn test_parse_llm_provider_model() {
        assert_eq!(
            parse_llm_provider_model("openai/gpt-4o-mini"),
            ("openai", "gpt-4o-mini")
        );
        assert_eq!(
            parse_llm_provider_model("ollama/llama3.1:8b"),
            ("ollama", "llama3.1:8b")
        );
        assert_eq!(parse_llm_provider_model("my-model"), ("local", "my-model"));
        assert_eq!(
            parse_llm_provider_model("acme/model"),
            ("local", "acme/model")
        );
    }
}
