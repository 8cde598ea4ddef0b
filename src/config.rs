use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::utils::parse_list;

/// Reads settings from a key lookup. `Settings::load` feeds it the process
/// environment; tests feed it a map.
struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
        }
    }

    fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => Ok(v
                .parse::<u64>()
                .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
        }
    }

    fn get_u32(&self, key: &str, default: u32) -> Result<u32> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => Ok(v
                .parse::<u32>()
                .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
        }
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub run_mode: String, // serve|once

    // Price API
    pub price_api_base: String,

    // Selectors
    pub default_currency: String,
    pub default_limit: u32,
    pub currency_options: Vec<String>,
    pub limit_options: Vec<u32>,
    pub initial_load_delay_ms: u64,

    // Dashboard
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub dashboard_open_browser: bool,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let env = EnvReader { lookup };

        let run_mode = env.get_string("RUN_MODE", "serve").to_lowercase();

        let price_api_base = env
            .get_string("PRICE_API_BASE", "http://127.0.0.1:8000")
            .trim_end_matches('/')
            .to_string();

        let currency_options = parse_list(&env.get_string("CURRENCY_OPTIONS", "usd,eur,inr"))
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect::<Vec<_>>();

        let limit_options = parse_list(&env.get_string("LIMIT_OPTIONS", "10,20"))
            .iter()
            .map(|x| {
                x.parse::<u32>()
                    .map_err(|e| anyhow!("LIMIT_OPTIONS invalid int {x:?}: {e}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let dashboard_port = env.get_u32("DASHBOARD_PORT", 8080)?;
        let dashboard_port = u16::try_from(dashboard_port)
            .map_err(|_| anyhow!("DASHBOARD_PORT out of range (got {dashboard_port})"))?;

        let s = Self {
            run_mode,
            price_api_base,
            default_currency: env.get_string("DEFAULT_CURRENCY", "usd").to_lowercase(),
            default_limit: env.get_u32("DEFAULT_LIMIT", 10)?,
            currency_options,
            limit_options,
            initial_load_delay_ms: env.get_u64("INITIAL_LOAD_DELAY_MS", 500)?,
            dashboard_host: env.get_string("DASHBOARD_HOST", "127.0.0.1"),
            dashboard_port,
            dashboard_open_browser: env.get_bool("DASHBOARD_OPEN_BROWSER", false),
        };

        s.validate()?;
        Ok(s)
    }

    pub fn is_allowed_currency(&self, currency: &str) -> bool {
        self.currency_options.iter().any(|c| c == currency)
    }

    pub fn is_allowed_limit(&self, limit: u32) -> bool {
        self.limit_options.contains(&limit)
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.run_mode.as_str(), "serve" | "once") {
            return Err(anyhow!("RUN_MODE must be serve|once (got {})", self.run_mode));
        }
        if !(self.price_api_base.starts_with("http://") || self.price_api_base.starts_with("https://")) {
            return Err(anyhow!(
                "PRICE_API_BASE must be an http(s) url (got {})",
                self.price_api_base
            ));
        }
        if self.currency_options.is_empty() {
            return Err(anyhow!("CURRENCY_OPTIONS must list at least one currency"));
        }
        if self.limit_options.is_empty() {
            return Err(anyhow!("LIMIT_OPTIONS must list at least one limit"));
        }
        if let Some(bad) = self.limit_options.iter().find(|l| **l < 1) {
            return Err(anyhow!("LIMIT_OPTIONS entries must be >= 1 (got {bad})"));
        }
        if !self.is_allowed_currency(&self.default_currency) {
            return Err(anyhow!(
                "DEFAULT_CURRENCY must be one of CURRENCY_OPTIONS (got {} not in {:?})",
                self.default_currency,
                self.currency_options
            ));
        }
        if !self.is_allowed_limit(self.default_limit) {
            return Err(anyhow!(
                "DEFAULT_LIMIT must be one of LIMIT_OPTIONS (got {} not in {:?})",
                self.default_limit,
                self.limit_options
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(&move |k: &str| map.get(k).cloned())
    }

    #[test]
    fn defaults_are_valid() {
        let s = load(&[]).unwrap();
        assert_eq!(s.run_mode, "serve");
        assert_eq!(s.price_api_base, "http://127.0.0.1:8000");
        assert_eq!(s.default_currency, "usd");
        assert_eq!(s.default_limit, 10);
        assert_eq!(s.currency_options, vec!["usd", "eur", "inr"]);
        assert_eq!(s.limit_options, vec![10, 20]);
        assert_eq!(s.initial_load_delay_ms, 500);
        assert_eq!(s.dashboard_port, 8080);
        assert!(!s.dashboard_open_browser);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let s = load(&[("DEFAULT_CURRENCY", "   "), ("RUN_MODE", "")]).unwrap();
        assert_eq!(s.default_currency, "usd");
        assert_eq!(s.run_mode, "serve");
    }

    #[test]
    fn trailing_slash_is_stripped_from_base() {
        let s = load(&[("PRICE_API_BASE", "https://prices.example.com/")]).unwrap();
        assert_eq!(s.price_api_base, "https://prices.example.com");
    }

    #[test]
    fn currencies_are_lowercased() {
        let s = load(&[("CURRENCY_OPTIONS", "USD,Gbp"), ("DEFAULT_CURRENCY", "GBP")]).unwrap();
        assert_eq!(s.currency_options, vec!["usd", "gbp"]);
        assert_eq!(s.default_currency, "gbp");
        assert!(s.is_allowed_currency("gbp"));
        assert!(!s.is_allowed_currency("eur"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("RUN_MODE", "daemon")]).is_err());
        assert!(load(&[("PRICE_API_BASE", "ftp://x")]).is_err());
        assert!(load(&[("DEFAULT_LIMIT", "30")]).is_err());
        assert!(load(&[("DEFAULT_LIMIT", "ten")]).is_err());
        assert!(load(&[("LIMIT_OPTIONS", "0,10")]).is_err());
        assert!(load(&[("DEFAULT_CURRENCY", "jpy")]).is_err());
        assert!(load(&[("DASHBOARD_PORT", "70000")]).is_err());
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        for v in ["1", "true", "YES", "on"] {
            let s = load(&[("DASHBOARD_OPEN_BROWSER", v)]).unwrap();
            assert!(s.dashboard_open_browser, "{v}");
        }
        let s = load(&[("DASHBOARD_OPEN_BROWSER", "0")]).unwrap();
        assert!(!s.dashboard_open_browser);
    }
}
