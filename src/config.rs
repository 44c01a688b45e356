use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::executor::{DEFAULT_MAX_RESULT_CHARS, DEFAULT_ROW_LIMIT};
use crate::retry::RetryPolicy;
use crate::schema::SchemaMode;
use crate::validator::DEFAULT_MAX_SQL_LENGTH;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub ollama_host: String,
    pub ollama_port: u16,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub retry: RetryPolicy,
    pub schema_mode: SchemaMode,
    pub normalize_questions: bool,
    pub max_sql_length: usize,
    pub row_limit: usize,
    pub max_result_chars: usize,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    /// Reads `.env` (when present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let llm_model = get("LLM_MODEL").unwrap_or_else(|| "llama3.2:latest".to_string());

        let schema_mode = match get("SCHEMA_MODE").as_deref().unwrap_or("relational") {
            mode if mode.eq_ignore_ascii_case("relational") => SchemaMode::Relational {
                allowed_tables: get("ALLOWED_TABLES")
                    .unwrap_or_else(|| "students".to_string())
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(|t| identifier("ALLOWED_TABLES", t))
                    .collect::<Result<Vec<_>, _>>()?,
            },
            mode if mode.eq_ignore_ascii_case("eav") => SchemaMode::Eav {
                view: identifier(
                    "EAV_VIEW",
                    &get("EAV_VIEW").unwrap_or_else(|| "flattened_students".to_string()),
                )?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "SCHEMA_MODE",
                    value: other.to_string(),
                    reason: "expected relational or eav".to_string(),
                })
            }
        };

        let retry = RetryPolicy {
            max_attempts: parse(&get, "LLM_MAX_RETRIES", 3)?,
            base_delay: Duration::from_millis(parse(&get, "LLM_RETRY_BASE_DELAY_MS", 2000)?),
            rate_limit_wait: Duration::from_secs(parse(&get, "LLM_RATE_LIMIT_WAIT_SECS", 60)?),
        };

        Ok(Self {
            database_url,
            db_max_connections: parse(&get, "DB_MAX_CONNECTIONS", 5)?,
            db_acquire_timeout: Duration::from_secs(parse(&get, "DB_ACQUIRE_TIMEOUT_SECS", 10)?),
            ollama_host: get("OLLAMA_HOST").unwrap_or_else(|| "http://localhost".to_string()),
            ollama_port: parse(&get, "OLLAMA_PORT", 11434)?,
            llm_model,
            llm_timeout: Duration::from_secs(parse(&get, "LLM_TIMEOUT_SECS", 60)?),
            retry,
            schema_mode,
            normalize_questions: parse(&get, "NORMALIZE_QUESTIONS", true)?,
            max_sql_length: parse(&get, "MAX_SQL_LENGTH", DEFAULT_MAX_SQL_LENGTH)?,
            row_limit: parse(&get, "DEFAULT_ROW_LIMIT", DEFAULT_ROW_LIMIT)?,
            max_result_chars: parse(&get, "MAX_RESULT_CHARS", DEFAULT_MAX_RESULT_CHARS)?,
            server_host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse(&get, "SERVER_PORT", 8000)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

/// Table and view names end up in SQL text, so only plain identifiers pass.
fn identifier(key: &'static str, name: &str) -> Result<String, ConfigError> {
    let valid = name
        .split('.')
        .all(|part| {
            part.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(name.to_string())
    } else {
        Err(ConfigError::Invalid {
            key,
            value: name.to_string(),
            reason: "not a plain SQL identifier".to_string(),
        })
    }
}
