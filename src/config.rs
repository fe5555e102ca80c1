use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fmt;

use crate::network::NetworkSymbol;

#[derive(Clone)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_chat_id: Option<i64>,
    pub telegram_poll_timeout_secs: u64,

    // RPC
    pub rpc_overrides: HashMap<NetworkSymbol, String>,
    pub rpc_probe: bool,

    // Scanner
    pub scanner_base_url: Option<String>,
    pub scanner_path: String,
    pub scanner_api_key: Option<String>,
    pub scanner_user_agent: String,
    pub scan_interval_secs: u64,

    // Runtime
    pub http_timeout_secs: u64,
    /// Overrides the restored autopilot flag when set.
    pub auto_pilot: Option<bool>,

    // Keys
    pub seed_phrase: Option<String>,
    pub seed_passphrase: String,

    // Persistence
    pub state_path: Option<String>,
}

fn lookup_bool(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match get(key).map(|s| s.trim().to_lowercase()) {
        None => default,
        Some(v) if v.is_empty() => default,
        Some(v) if v == "1" || v == "true" || v == "yes" || v == "y" || v == "on" => true,
        Some(v) if v == "0" || v == "false" || v == "no" || v == "n" || v == "off" => false,
        Some(_) => default,
    }
}

fn lookup_parse<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|x| x.trim().parse().ok())
}

fn lookup_nonempty(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    get(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Builds the config from any key/value source; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Telegram
        let telegram_bot_token = lookup_nonempty(&get, "TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN is required"))?;
        let telegram_chat_id = match lookup_nonempty(&get, "TELEGRAM_CHAT_ID") {
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|_| anyhow!("TELEGRAM_CHAT_ID must be an integer, got {raw:?}"))?,
            ),
            None => None,
        };
        let telegram_poll_timeout_secs = lookup_parse::<u64>(&get, "TELEGRAM_POLL_TIMEOUT_SECS").unwrap_or(30);

        // RPC
        let mut rpc_overrides = HashMap::new();
        for symbol in NetworkSymbol::ALL {
            let url = match symbol {
                NetworkSymbol::Sol => lookup_nonempty(&get, symbol.rpc_env_var())
                    .or_else(|| lookup_nonempty(&get, "HELIUS_HTTP_URL")),
                _ => lookup_nonempty(&get, symbol.rpc_env_var()),
            };
            if let Some(url) = url {
                rpc_overrides.insert(symbol, url);
            }
        }
        let rpc_probe = lookup_bool(&get, "RPC_PROBE", true);

        // Scanner
        let scanner_base_url = lookup_nonempty(&get, "SCANNER_BASE_URL");
        let scanner_path = lookup_nonempty(&get, "SCANNER_PATH").unwrap_or_else(|| "/scan".to_string());
        let scanner_api_key = lookup_nonempty(&get, "SCANNER_API_KEY");
        let scanner_user_agent = lookup_nonempty(&get, "SCANNER_USER_AGENT")
            .unwrap_or_else(|| format!("multichain-trader/{}", env!("CARGO_PKG_VERSION")));
        let scan_interval_secs = lookup_parse::<u64>(&get, "SCAN_INTERVAL_SECS").unwrap_or(30);
        if scan_interval_secs == 0 {
            return Err(anyhow!("SCAN_INTERVAL_SECS must be positive"));
        }

        // Runtime
        let http_timeout_secs = lookup_parse::<u64>(&get, "HTTP_TIMEOUT_SECS").unwrap_or(15);
        if http_timeout_secs == 0 {
            return Err(anyhow!("HTTP_TIMEOUT_SECS must be positive"));
        }
        let auto_pilot = match lookup_nonempty(&get, "AUTO_PILOT") {
            Some(_) => Some(lookup_bool(&get, "AUTO_PILOT", false)),
            None => None,
        };

        // Keys: inline phrase wins over a secret file
        let seed_phrase = match lookup_nonempty(&get, "SEED_PHRASE") {
            Some(p) => Some(p),
            None => match lookup_nonempty(&get, "SEED_PHRASE_FILE") {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading SEED_PHRASE_FILE {path}"))?;
                    Some(raw.trim().to_string()).filter(|s| !s.is_empty())
                }
                None => None,
            },
        };
        let seed_passphrase = get("SEED_PASSPHRASE").unwrap_or_default();

        let state_path = lookup_nonempty(&get, "STATE_PATH");

        Ok(Self {
            telegram_bot_token,
            telegram_chat_id,
            telegram_poll_timeout_secs,
            rpc_overrides,
            rpc_probe,
            scanner_base_url,
            scanner_path,
            scanner_api_key,
            scanner_user_agent,
            scan_interval_secs,
            http_timeout_secs,
            auto_pilot,
            seed_phrase,
            seed_passphrase,
            state_path,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |set: bool| if set { "[REDACTED]" } else { "<unset>" };
        f.debug_struct("Config")
            .field("telegram_bot_token", &redact(true))
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("telegram_poll_timeout_secs", &self.telegram_poll_timeout_secs)
            .field("rpc_overrides", &self.rpc_overrides.keys().collect::<Vec<_>>())
            .field("rpc_probe", &self.rpc_probe)
            .field("scanner_base_url", &self.scanner_base_url)
            .field("scanner_path", &self.scanner_path)
            .field("scanner_api_key", &redact(self.scanner_api_key.is_some()))
            .field("scanner_user_agent", &self.scanner_user_agent)
            .field("scan_interval_secs", &self.scan_interval_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("auto_pilot", &self.auto_pilot)
            .field("seed_phrase", &redact(self.seed_phrase.is_some()))
            .field("state_path", &self.state_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn missing_bot_token_is_fatal() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
        assert!(Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn defaults() {
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "123:abc")])).unwrap();
        assert_eq!(cfg.telegram_chat_id, None);
        assert!(cfg.rpc_overrides.is_empty());
        assert!(cfg.rpc_probe);
        assert_eq!(cfg.scanner_base_url, None);
        assert_eq!(cfg.scanner_path, "/scan");
        assert_eq!(cfg.scan_interval_secs, 30);
        assert_eq!(cfg.auto_pilot, None);
        assert!(cfg.seed_phrase.is_none());
        assert!(cfg.state_path.is_none());
    }

    #[test]
    fn solana_override_accepts_helius_alias() {
        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("HELIUS_HTTP_URL", "https://helius.example"),
            ("BSC_RPC_URL", "https://bsc.example"),
        ]))
        .unwrap();
        assert_eq!(cfg.rpc_overrides[&NetworkSymbol::Sol], "https://helius.example");
        assert_eq!(cfg.rpc_overrides[&NetworkSymbol::Bsc], "https://bsc.example");

        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("SOLANA_RPC_URL", "https://primary.example"),
            ("HELIUS_HTTP_URL", "https://helius.example"),
        ]))
        .unwrap();
        assert_eq!(cfg.rpc_overrides[&NetworkSymbol::Sol], "https://primary.example");
    }

    #[test]
    fn auto_pilot_flag_parses() {
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t"), ("AUTO_PILOT", "on")])).unwrap();
        assert_eq!(cfg.auto_pilot, Some(true));
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t"), ("AUTO_PILOT", "0")])).unwrap();
        assert_eq!(cfg.auto_pilot, Some(false));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t"), ("TELEGRAM_CHAT_ID", "me")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t"), ("SCAN_INTERVAL_SECS", "0")])).is_err());
    }

    #[test]
    fn seed_phrase_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "  word word word  ").unwrap();
        let path = f.path().to_string_lossy().to_string();
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t"), ("SEED_PHRASE_FILE", path.as_str())])).unwrap();
        assert_eq!(cfg.seed_phrase.as_deref(), Some("word word word"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "123:supersecret"),
            ("SCANNER_API_KEY", "apikey-xyz"),
            ("SEED_PHRASE", "alpha beta gamma"),
        ]))
        .unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("supersecret"));
        assert!(!dbg.contains("apikey-xyz"));
        assert!(!dbg.contains("gamma"));
    }
}
