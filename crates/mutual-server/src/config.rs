use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub admin_token: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub banned_keywords: String,
    pub allow_duplicate_matches: bool,
    pub push_timeout: Duration,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys fall back to defaults; set but
    /// malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = required_secret(&lookup, "MUTUAL_JWT_SECRET")?;
        let admin_token = required_secret(&lookup, "MUTUAL_ADMIN_TOKEN")?;

        let db_path = lookup("MUTUAL_DB_PATH").unwrap_or_else(|| "mutual.db".into()).into();
        let host = lookup("MUTUAL_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(&lookup, "MUTUAL_PORT", 3000u16)?;
        let banned_keywords = lookup("MUTUAL_BANNED_KEYWORDS").unwrap_or_default();
        let allow_duplicate_matches = parse_or(&lookup, "MUTUAL_ALLOW_DUPLICATE_MATCHES", true)?;
        let push_timeout_secs = parse_or(&lookup, "MUTUAL_PUSH_TIMEOUT_SECS", 5u64)?;
        let sweep_interval_secs = parse_or(&lookup, "MUTUAL_SWEEP_INTERVAL_SECS", 3600u64)?;

        if push_timeout_secs == 0 {
            bail!("MUTUAL_PUSH_TIMEOUT_SECS must be greater than zero");
        }
        if sweep_interval_secs == 0 {
            bail!("MUTUAL_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            jwt_secret,
            admin_token,
            db_path,
            host,
            port,
            banned_keywords,
            allow_duplicate_matches,
            push_timeout: Duration::from_secs(push_timeout_secs),
            sweep_interval_secs,
        })
    }
}

fn required_secret<F>(lookup: &F, key: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_default();
    if value.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&value.as_str()) {
        bail!("{} is unset or still a placeholder", key);
    }
    Ok(value)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRETS: [(&str, &str); 2] = [
        ("MUTUAL_JWT_SECRET", "a-real-secret"),
        ("MUTUAL_ADMIN_TOKEN", "a-real-admin-token"),
    ];

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&SECRETS)).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("mutual.db"));
        assert!(config.allow_duplicate_matches);
        assert_eq!(config.push_timeout, Duration::from_secs(5));
        assert_eq!(config.sweep_interval_secs, 3600);
    }

    #[test]
    fn placeholder_secrets_are_refused() {
        let err = Config::from_lookup(lookup(&[
            ("MUTUAL_JWT_SECRET", "dev-secret-change-me"),
            ("MUTUAL_ADMIN_TOKEN", "a-real-admin-token"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MUTUAL_JWT_SECRET"));

        assert!(Config::from_lookup(lookup(&[("MUTUAL_JWT_SECRET", "a-real-secret")])).is_err());
    }

    #[test]
    fn malformed_values_are_errors() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("MUTUAL_ALLOW_DUPLICATE_MATCHES", "yes"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = SECRETS.to_vec();
        pairs.push(("MUTUAL_PORT", "http"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = SECRETS.to_vec();
        pairs.push(("MUTUAL_SWEEP_INTERVAL_SECS", "0"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn duplicate_matches_can_be_disabled() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("MUTUAL_ALLOW_DUPLICATE_MATCHES", "false"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(!config.allow_duplicate_matches);
    }
}
