use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub blob_dir: PathBuf,
    pub public_url: String,
    pub status_sweep_every: Duration,
    pub bootstrap_admin: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("CLOAK_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CLOAK_JWT_SECRET is unset or still a placeholder");
        }

        let host = var("CLOAK_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("CLOAK_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("CLOAK_PORT is not a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("CLOAK_HOST is not an address")?;

        let sweep_secs: u64 = var("CLOAK_STATUS_SWEEP_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|&secs| secs > 0)
            .unwrap_or(300);

        Ok(Self {
            addr,
            db_path: var("CLOAK_DB_PATH").unwrap_or_else(|| "cloak.db".into()).into(),
            jwt_secret,
            blob_dir: var("CLOAK_BLOB_DIR").unwrap_or_else(|| "./blobs".into()).into(),
            public_url: var("CLOAK_PUBLIC_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            status_sweep_every: Duration::from_secs(sweep_secs),
            bootstrap_admin: var("CLOAK_BOOTSTRAP_ADMIN").filter(|h| !h.trim().is_empty()),
        })
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

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("CLOAK_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.db_path, PathBuf::from("cloak.db"));
        assert_eq!(config.status_sweep_every, Duration::from_secs(300));
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn placeholder_secret_is_refused() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("CLOAK_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn bad_port_is_an_error() {
        let vars = lookup(&[("CLOAK_JWT_SECRET", "s3cret"), ("CLOAK_PORT", "http")]);
        assert!(Config::from_lookup(vars).is_err());
    }
}
