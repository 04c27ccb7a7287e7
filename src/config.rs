use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

/// Loaded once at startup and carried in shared state; business logic never
/// reads the environment directly.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("PORT", "3333"),
            database_url: read_required("DATABASE_URL"),
            jwt_secret: read_required("JWT_SECRET"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn read_required(key: &str) -> String {
    env::var(key)
        .map_err(|_| {
            warn!("Required environment variable {key} is not set");
        })
        .expect("Environment misconfigured!")
}
