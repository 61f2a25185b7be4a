use crate::domain::{Address, Decimal, InstrumentId, TokenUnits};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub ledger_rpc_url: String,
    pub ledger_address: String,
    pub signer_address: Address,
    pub base_instrument: InstrumentId,
    pub instruments: Vec<InstrumentId>,
    pub reward_instrument: InstrumentId,
    pub token_units: TokenUnits,
    pub reward_units: TokenUnits,
    pub eligibility_threshold: Decimal,
    pub min_payout: Decimal,
    pub capture_concurrency: usize,
    pub capture_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub ledger_poll_interval: Duration,
    pub snapshot_policy: SnapshotPolicy,
}

/// What to do when a snapshot already exists for a (tournament, phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Return the existing record.
    Reuse,
    /// Fail the capture.
    Reject,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let ledger_rpc_url = required(&env_map, "LEDGER_RPC_URL")?;
        let signer_address = Address::new(required(&env_map, "SIGNER_ADDRESS")?);
        let base_instrument = InstrumentId::new(required(&env_map, "BASE_INSTRUMENT")?);

        let ledger_address = env_map.get("LEDGER_ADDRESS").cloned().unwrap_or_default();
        let reward_instrument = InstrumentId::new(
            env_map
                .get("REWARD_INSTRUMENT")
                .cloned()
                .unwrap_or_else(|| "native".to_string()),
        );

        let instruments = parse_instruments_from_map(&env_map)?;

        let token_units = parse_units(&env_map, "TOKEN_DECIMALS")?;
        let reward_units = parse_units(&env_map, "REWARD_DECIMALS")?;

        let eligibility_threshold = parse_decimal(&env_map, "ELIGIBILITY_THRESHOLD", "0.5")?;
        if eligibility_threshold.is_negative() || eligibility_threshold > Decimal::one() {
            return Err(ConfigError::InvalidValue(
                "ELIGIBILITY_THRESHOLD".to_string(),
                "must be between 0 and 1".to_string(),
            ));
        }

        let min_payout = parse_decimal(&env_map, "MIN_PAYOUT", "0")?;
        if min_payout.is_negative() {
            return Err(ConfigError::InvalidValue(
                "MIN_PAYOUT".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let capture_concurrency = env_map
            .get("CAPTURE_CONCURRENCY")
            .map(|s| s.as_str())
            .unwrap_or("16")
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "CAPTURE_CONCURRENCY".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let capture_timeout = parse_millis(&env_map, "CAPTURE_TIMEOUT_MS", "300000")?;
        let confirmation_timeout = parse_millis(&env_map, "CONFIRMATION_TIMEOUT_MS", "60000")?;
        let ledger_poll_interval = parse_millis(&env_map, "LEDGER_POLL_INTERVAL_MS", "1000")?;

        let snapshot_policy = match env_map
            .get("SNAPSHOT_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("reuse")
        {
            "reuse" => SnapshotPolicy::Reuse,
            "reject" => SnapshotPolicy::Reject,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SNAPSHOT_POLICY".to_string(),
                    format!("must be reuse or reject, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            ledger_rpc_url,
            ledger_address,
            signer_address,
            base_instrument,
            instruments,
            reward_instrument,
            token_units,
            reward_units,
            eligibility_threshold,
            min_payout,
            capture_concurrency,
            capture_timeout,
            confirmation_timeout,
            ledger_poll_interval,
            snapshot_policy,
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    let raw = env_map.get(key).map(|s| s.as_str()).unwrap_or(default);
    Decimal::from_str_canonical(raw).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a decimal number".to_string())
    })
}

fn parse_millis(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Duration, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string()))
}

fn parse_units(env_map: &HashMap<String, String>, key: &str) -> Result<TokenUnits, ConfigError> {
    let decimals = env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or("18")
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid u32".to_string()))?;
    TokenUnits::new(decimals).map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn parse_instruments_from_map(
    env_map: &HashMap<String, String>,
) -> Result<Vec<InstrumentId>, ConfigError> {
    let raw: Vec<String> = if let Some(list) = env_map.get("INSTRUMENTS") {
        list.split(',').map(|s| s.trim().to_string()).collect()
    } else if let Some(file_path) = env_map.get("INSTRUMENTS_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "INSTRUMENTS_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        content.lines().map(|line| line.trim().to_string()).collect()
    } else {
        Vec::new()
    };

    let mut instruments: Vec<InstrumentId> = Vec::new();
    for id in raw.into_iter().filter(|s| !s.is_empty()) {
        let id = InstrumentId::new(id);
        if !instruments.contains(&id) {
            instruments.push(id);
        }
    }
    Ok(instruments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "LEDGER_RPC_URL".to_string(),
            "http://localhost:8545".to_string(),
        );
        map.insert("SIGNER_ADDRESS".to_string(), "0xsigner".to_string());
        map.insert("BASE_INSTRUMENT".to_string(), "BASE".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.reward_instrument.as_str(), "native");
        assert_eq!(config.token_units.decimals(), 18);
        assert_eq!(config.eligibility_threshold.to_canonical_string(), "0.5");
        assert!(config.min_payout.is_zero());
        assert_eq!(config.capture_concurrency, 16);
        assert_eq!(config.capture_timeout, Duration::from_secs(300));
        assert_eq!(config.confirmation_timeout, Duration::from_secs(60));
        assert_eq!(config.snapshot_policy, SnapshotPolicy::Reuse);
        assert!(config.instruments.is_empty());
    }

    #[test]
    fn test_missing_required_vars() {
        for key in [
            "DATABASE_PATH",
            "LEDGER_RPC_URL",
            "SIGNER_ADDRESS",
            "BASE_INSTRUMENT",
        ] {
            let mut env_map = setup_required_env();
            env_map.remove(key);
            match Config::from_env_map(env_map) {
                Err(ConfigError::MissingEnv(s)) => assert_eq!(s, key),
                _ => panic!("Expected MissingEnv error for {}", key),
            }
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut env_map = setup_required_env();
        env_map.insert("ELIGIBILITY_THRESHOLD".to_string(), "1.5".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "ELIGIBILITY_THRESHOLD"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_snapshot_policy() {
        let mut env_map = setup_required_env();
        env_map.insert("SNAPSHOT_POLICY".to_string(), "overwrite".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "SNAPSHOT_POLICY"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("CAPTURE_CONCURRENCY".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "CAPTURE_CONCURRENCY"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_too_many_decimals() {
        let mut env_map = setup_required_env();
        env_map.insert("TOKEN_DECIMALS".to_string(), "40".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TOKEN_DECIMALS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_instruments_list_deduplicates() {
        let mut env_map = setup_required_env();
        env_map.insert("INSTRUMENTS".to_string(), "P1, P2,,P1".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        let ids: Vec<&str> = config.instruments.iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2"]);
    }

    #[test]
    fn test_instruments_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "P1\n\n  P2  \nP3").unwrap();

        let mut env_map = setup_required_env();
        env_map.insert(
            "INSTRUMENTS_FILE".to_string(),
            file.path().to_string_lossy().to_string(),
        );
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.instruments.len(), 3);
        assert_eq!(config.instruments[1].as_str(), "P2");
    }
}
