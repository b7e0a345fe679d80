use std::time::Duration;

use crate::retry::RetryPolicy;

/// Engine configuration, loaded from the environment.
///
/// Interval defaults mirror the production cadence: the submit-result
/// batch every 4 minutes, collection/refund/deny sweeps every 5, and
/// deregistrations every 5. Wallet locks older than
/// `wallet_lock_staleness` are treated as abandoned by a crashed pass
/// and become claimable again.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub encryption_key: String,

    pub submit_result_interval: Duration,
    pub collect_interval: Duration,
    pub refund_interval: Duration,
    pub deny_interval: Duration,
    pub deregister_interval: Duration,

    pub wallet_lock_staleness: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| config::ConfigError::NotFound("DATABASE_URL".to_string()))?;

        let encryption_key = std::env::var("ENCRYPTION_KEY")
            .map_err(|_| config::ConfigError::NotFound("ENCRYPTION_KEY".to_string()))?;
        if encryption_key.len() <= 20 {
            return Err(config::ConfigError::Message(
                "ENCRYPTION_KEY must be longer than 20 characters".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            encryption_key,
            submit_result_interval: env_secs("SUBMIT_RESULT_INTERVAL_SECS", 240),
            collect_interval: env_secs("COLLECT_INTERVAL_SECS", 300),
            refund_interval: env_secs("REFUND_INTERVAL_SECS", 300),
            deny_interval: env_secs("DENY_INTERVAL_SECS", 300),
            deregister_interval: env_secs("DEREGISTER_INTERVAL_SECS", 300),
            wallet_lock_staleness: env_secs("WALLET_LOCK_STALENESS_SECS", 600),
            retry: RetryPolicy {
                max_retries: env_u32("RETRY_MAX_RETRIES", 5),
                initial_delay: Duration::from_millis(env_u64("RETRY_INITIAL_DELAY_MS", 500)),
                backoff_multiplier: env_u32("RETRY_BACKOFF_MULTIPLIER", 5),
                max_delay: Duration::from_millis(env_u64("RETRY_MAX_DELAY_MS", 7500)),
            },
        })
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(env_u64(name, default))
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parsing_falls_back_to_default() {
        assert_eq!(env_u64("DEFINITELY_NOT_SET_ANYWHERE", 240), 240);
        assert_eq!(
            env_secs("DEFINITELY_NOT_SET_ANYWHERE", 300),
            Duration::from_secs(300)
        );
    }
}
