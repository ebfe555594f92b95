use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::info;

use crate::trending::FetchSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("expected {0} as an environment variable")]
    Missing(&'static str),
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo { url: String, database: String },
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub store: StoreBackend,
    pub fetch: FetchSettings,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let backend: String = try_load("POST_STORE", "mongodb")?;
        let store = match backend.as_str() {
            "mongodb" => StoreBackend::Mongo {
                url: env::var("MONGODB_URL").map_err(|_| ConfigError::Missing("MONGODB_URL"))?,
                database: try_load("MONGODB_DATABASE", "linkhub")?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    key: "POST_STORE",
                    value: other.to_owned(),
                    reason: "expected `mongodb` or `memory`".to_owned(),
                });
            }
        };

        let window = parse_window(env::var("TRENDING_WINDOW").ok().as_deref())?;

        Ok(Self {
            port: try_load("PORT", "3000")?,
            store,
            fetch: FetchSettings {
                window,
                timeout: Duration::from_millis(try_load("FETCH_TIMEOUT_MS", "10000")?),
            },
        })
    }
}

/// Unset or `0` means the whole collection is read.
fn parse_window(value: Option<&str>) -> Result<Option<u32>, ConfigError> {
    match value {
        None => Ok(None),
        Some(value) => Ok(Some(parse::<u32>("TRENDING_WINDOW", value)?).filter(|window| *window > 0)),
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });
    parse(key, &value)
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        value: value.to_owned(),
        reason: err.to_string(),
    })
}
