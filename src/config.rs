//! Runtime settings for the identity layer.
//!
//! A single `Settings` value is built at startup and handed to every component
//! that needs it. Nothing reads the environment after construction.

use serde::{Deserialize, Serialize};

/// Longest session lifetime accepted from configuration (365 days).
pub const MAX_SESSION_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashingSettings {
    /// Argon2 memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingSettings {
    fn default() -> Self {
        // argon2 crate defaults (19 MiB, 2 passes, 1 lane)
        Self { memory_kib: 19 * 1024, iterations: 2, parallelism: 1 }
    }
}

impl HashingSettings {
    /// Cheapest parameters Argon2 accepts; only meant for tests and benches.
    pub fn fast_insecure() -> Self { Self { memory_kib: 8, iterations: 1, parallelism: 1 } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub http_port: u16,
    pub cookie_name: String,
    pub header_name: String,
    pub session_ttl_secs: i64,
    /// Mark the session cookie `Secure`; disable only for plain-http development.
    pub cookie_secure: bool,
    /// Case-insensitive user-agent substring identifying browser clients.
    pub web_client_marker: String,
    /// Expired-session sweep period; 0 keeps purely lazy invalidation.
    pub sweep_interval_secs: u64,
    /// Record the client address from `X-Forwarded-For`. Enable only behind a proxy that sets it.
    #[serde(default)]
    pub trust_forwarded_for: bool,
    pub hashing: HashingSettings,
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_port: 8000,
            cookie_name: "session_id".to_string(),
            header_name: "X-Session-ID".to_string(),
            session_ttl_secs: 24 * 60 * 60,
            cookie_secure: true,
            web_client_marker: "web".to_string(),
            sweep_interval_secs: 0,
            trust_forwarded_for: false,
            hashing: HashingSettings::default(),
            bootstrap_admin: None,
        }
    }
}

impl Settings {
    /// Out-of-range values clamp to [`MAX_SESSION_TTL_SECS`]; `validate` rejects them up front.
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.session_ttl_secs.clamp(1, MAX_SESSION_TTL_SECS))
            .unwrap_or_else(|| chrono::Duration::days(365))
    }

    /// Build settings from `CAREBRIDGE_*` environment variables, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`Settings::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        use anyhow::Context;

        fn parsed<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
        where
            T::Err: std::fmt::Display,
        {
            match raw {
                Some(v) => v.trim().parse::<T>().map_err(|e| anyhow::anyhow!("{key}={v:?}: {e}")),
                None => Ok(default),
            }
        }

        let d = Settings::default();
        let bootstrap_admin = match (get("CAREBRIDGE_ADMIN_USERNAME"), get("CAREBRIDGE_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(BootstrapAdmin { username, password }),
            (None, None) => None,
            _ => anyhow::bail!("CAREBRIDGE_ADMIN_USERNAME and CAREBRIDGE_ADMIN_PASSWORD must be set together"),
        };
        let settings = Settings {
            http_port: parsed(get("CAREBRIDGE_HTTP_PORT"), "CAREBRIDGE_HTTP_PORT", d.http_port)?,
            cookie_name: get("CAREBRIDGE_COOKIE_NAME").unwrap_or(d.cookie_name),
            header_name: get("CAREBRIDGE_HEADER_NAME").unwrap_or(d.header_name),
            session_ttl_secs: parsed(get("CAREBRIDGE_SESSION_TTL_SECS"), "CAREBRIDGE_SESSION_TTL_SECS", d.session_ttl_secs)?,
            cookie_secure: parsed(get("CAREBRIDGE_COOKIE_SECURE"), "CAREBRIDGE_COOKIE_SECURE", d.cookie_secure)?,
            web_client_marker: get("CAREBRIDGE_WEB_CLIENT_MARKER").unwrap_or(d.web_client_marker),
            sweep_interval_secs: parsed(get("CAREBRIDGE_SWEEP_INTERVAL_SECS"), "CAREBRIDGE_SWEEP_INTERVAL_SECS", d.sweep_interval_secs)?,
            trust_forwarded_for: parsed(get("CAREBRIDGE_TRUST_FORWARDED_FOR"), "CAREBRIDGE_TRUST_FORWARDED_FOR", d.trust_forwarded_for)?,
            hashing: HashingSettings {
                memory_kib: parsed(get("CAREBRIDGE_ARGON2_MEMORY_KIB"), "CAREBRIDGE_ARGON2_MEMORY_KIB", d.hashing.memory_kib)?,
                iterations: parsed(get("CAREBRIDGE_ARGON2_ITERATIONS"), "CAREBRIDGE_ARGON2_ITERATIONS", d.hashing.iterations)?,
                parallelism: parsed(get("CAREBRIDGE_ARGON2_PARALLELISM"), "CAREBRIDGE_ARGON2_PARALLELISM", d.hashing.parallelism)?,
            },
            bootstrap_admin,
        };
        settings.validate().context("invalid settings")?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cookie_name.trim().is_empty() { anyhow::bail!("cookie name must not be empty"); }
        if self.header_name.trim().is_empty() { anyhow::bail!("header name must not be empty"); }
        if self.session_ttl_secs <= 0 { anyhow::bail!("session ttl must be positive"); }
        if self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            anyhow::bail!("session ttl must be at most {MAX_SESSION_TTL_SECS} seconds");
        }
        Ok(())
    }
}
