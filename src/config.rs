use rand::RngCore;
use std::env;
use std::time::Duration;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Hex-encoded HMAC signing key for session tokens. When unset, an
    /// ephemeral key is generated at startup and all outstanding sessions
    /// become invalid on restart.
    pub const SESSION_SECRET: &str = "SESSION_SECRET";
    /// Session token lifetime in minutes.
    pub const TOKEN_TTL_MINUTES: &str = "TOKEN_TTL_MINUTES";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8080;
    pub const DATABASE_URL: &str = "./.db/notes.db";
    pub const TOKEN_TTL_MINUTES: u64 = 30;
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub session_secret: Vec<u8>,
    pub token_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var(env_vars::PORT)
            .unwrap_or_else(|_| defaults::PORT.to_string())
            .parse()
            .expect("PORT must be a valid number");

        let database_url = env::var(env_vars::DATABASE_URL)
            .unwrap_or_else(|_| defaults::DATABASE_URL.to_string());

        let token_ttl_minutes = env::var(env_vars::TOKEN_TTL_MINUTES)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults::TOKEN_TTL_MINUTES);

        Self {
            port,
            database_url,
            session_secret: load_session_secret(),
            token_ttl: Duration::from_secs(token_ttl_minutes * 60),
        }
    }
}

/// Load the token signing key from the environment, or generate an
/// ephemeral one. The key is injected into the authenticator at
/// construction rather than read as a global, so tests can run with
/// distinct keys.
fn load_session_secret() -> Vec<u8> {
    match env::var(env_vars::SESSION_SECRET) {
        Ok(value) if !value.is_empty() => match hex::decode(&value) {
            Ok(bytes) => bytes,
            Err(_) => {
                log::warn!("SESSION_SECRET is not valid hex — using its raw bytes as the key");
                value.into_bytes()
            }
        },
        _ => {
            let mut buf = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut buf);
            log::warn!(
                "SESSION_SECRET not set — generated an ephemeral signing key; \
                 sessions will not survive a restart"
            );
            buf.to_vec()
        }
    }
}
