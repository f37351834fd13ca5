/*
 * Responsibility
 * - load settings from the environment (.env honored) once at startup
 * - parse the appfilter directive file (appfilter_enable / appfilter_str)
 * - validate values; anything invalid fails startup
 */
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::services::filter::FilterConfig;
use crate::services::params::{DEFAULT_MAX_BODY_BYTES, DEFAULT_READ_CHUNK_BYTES, ExtractLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(value: Option<&str>) -> Self {
        match value
            .unwrap_or("development")
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("{path}:{line}: {message}")]
    Directive {
        path: String,
        line: usize,
        message: String,
    },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,

    // Host-level bound for the whole request, body reads included.
    pub request_timeout: Duration,

    pub app_handler_path: String,
    pub extract_limits: ExtractLimits,

    pub filter: FilterConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_or(&lookup, "PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(lookup("APP_ENV").as_deref());

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let db_max_connections: u32 = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?;
        if db_max_connections == 0 {
            return Err(ConfigError::Invalid("DB_MAX_CONNECTIONS"));
        }
        let db_acquire_timeout =
            Duration::from_secs(parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECONDS", 5)?);

        let request_timeout =
            Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECONDS", 30)?);

        let app_handler_path = lookup("APP_HANDLER_PATH").unwrap_or_else(|| "/app".to_string());
        if !app_handler_path.starts_with('/') {
            return Err(ConfigError::Invalid("APP_HANDLER_PATH"));
        }

        let read_chunk_bytes: usize =
            parse_or(&lookup, "PARAMS_READ_CHUNK_BYTES", DEFAULT_READ_CHUNK_BYTES)?;
        if read_chunk_bytes == 0 {
            return Err(ConfigError::Invalid("PARAMS_READ_CHUNK_BYTES"));
        }
        let max_body_bytes: usize =
            parse_or(&lookup, "PARAMS_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;

        let filter = load_filter_config(&lookup)?;

        Ok(Self {
            addr,
            app_env,
            database_url,
            db_max_connections,
            db_acquire_timeout,
            request_timeout,
            app_handler_path,
            extract_limits: ExtractLimits {
                read_chunk_bytes,
                max_body_bytes,
            },
            filter,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn parse_enable(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

// Directive file first, then APPFILTER_ENABLE / APPFILTER_STR on top.
fn load_filter_config<F>(lookup: &F) -> Result<FilterConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut filter = match lookup("APPFILTER_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            parse_filter_directives(&path.display().to_string(), &text)?
        }
        None => FilterConfig::default(),
    };

    if let Some(raw) = lookup("APPFILTER_ENABLE") {
        filter.enabled = parse_enable(raw.trim()).ok_or(ConfigError::Invalid("APPFILTER_ENABLE"))?;
    }

    if let Some(raw) = lookup("APPFILTER_STR") {
        filter.signatures.extend(
            raw.replace("\\n", "\n")
                .lines()
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
        );
    }

    Ok(filter)
}

/// Parse `appfilter_enable <true|false>` and repeated `appfilter_str <substring>`.
///
/// Blank lines and lines starting with `#` are skipped. A signature may be
/// wrapped in double quotes to keep leading or trailing spaces.
pub fn parse_filter_directives(source: &str, text: &str) -> Result<FilterConfig, ConfigError> {
    let mut filter = FilterConfig::default();

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let directive_error = |message: &str| ConfigError::Directive {
            path: source.to_string(),
            line: idx + 1,
            message: message.to_string(),
        };

        let (directive, value) = match line.split_once(char::is_whitespace) {
            Some((d, v)) => (d, unquote(v.trim_start())),
            None => (line, ""),
        };

        match directive {
            "appfilter_enable" => {
                filter.enabled = parse_enable(value).ok_or_else(|| {
                    directive_error("Possible values for appfilter_enable option are true or false")
                })?;
            }
            "appfilter_str" => {
                if value.is_empty() {
                    return Err(directive_error("appfilter_str requires a value"));
                }
                filter.signatures.push(value.to_string());
            }
            other => {
                return Err(directive_error(&format!("unknown directive `{other}`")));
            }
        }
    }

    Ok(filter)
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
