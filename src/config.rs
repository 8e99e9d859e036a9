use std::{env, time::Duration};

use chrono::{Local, NaiveDateTime};

pub const DEFAULT_CHANNEL_NAME: &str = "user-contract";
pub const DEFAULT_CHAINCODE_NAME: &str = "uat";
pub const DEFAULT_MSP_ID: &str = "Org1MSP";
pub const DEFAULT_PEER_ENDPOINT: &str = "localhost:7051";
pub const DEFAULT_PEER_HOST_ALIAS: &str = "peer0.org1.example.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a whole number of milliseconds, got {value:?}")]
    InvalidTimeout { key: &'static str, value: String },
}

/// Per-call-category deadlines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub evaluate: Duration,
    pub endorse: Duration,
    pub submit: Duration,
    pub commit_status: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            evaluate: Duration::from_secs(5),
            endorse: Duration::from_secs(15),
            submit: Duration::from_secs(5),
            commit_status: Duration::from_secs(60),
        }
    }
}

/// Harness parameters, resolved once at start-up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    pub channel_name: String,
    pub chaincode_name: String,
    pub msp_id: String,
    pub peer_endpoint: String,
    pub peer_host_alias: String,
    pub timeouts: Timeouts,
    /// Identifier used by the demo flow, `DDMMYYHHmmss` of start-up time.
    pub user_id: String,
}

impl HarnessConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), Local::now().naive_local())
    }

    /// Unset and empty variables both fall back to the default.
    pub fn from_lookup<F>(lookup: F, now: NaiveDateTime) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let millis = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key).filter(|v| !v.is_empty()) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::InvalidTimeout { key, value }),
            }
        };
        let defaults = Timeouts::default();
        Ok(Self {
            channel_name: or_default("CHANNEL_NAME", DEFAULT_CHANNEL_NAME),
            chaincode_name: or_default("CHAINCODE_NAME", DEFAULT_CHAINCODE_NAME),
            msp_id: or_default("MSP_ID", DEFAULT_MSP_ID),
            peer_endpoint: or_default("PEER_ENDPOINT", DEFAULT_PEER_ENDPOINT),
            peer_host_alias: or_default("PEER_HOST_ALIAS", DEFAULT_PEER_HOST_ALIAS),
            timeouts: Timeouts {
                evaluate: millis("EVALUATE_TIMEOUT_MS", defaults.evaluate)?,
                endorse: millis("ENDORSE_TIMEOUT_MS", defaults.endorse)?,
                submit: millis("SUBMIT_TIMEOUT_MS", defaults.submit)?,
                commit_status: millis("COMMIT_STATUS_TIMEOUT_MS", defaults.commit_status)?,
            },
            user_id: now.format("%d%m%y%H%M%S").to_string(),
        })
    }

    pub fn display_lines(&self) -> Vec<String> {
        let t = &self.timeouts;
        vec![
            format!("channelName:       {}", self.channel_name),
            format!("chaincodeName:     {}", self.chaincode_name),
            format!("mspId:             {}", self.msp_id),
            format!("peerEndpoint:      {}", self.peer_endpoint),
            format!("peerHostAlias:     {}", self.peer_host_alias),
            format!("evaluateTimeout:   {}ms", t.evaluate.as_millis()),
            format!("endorseTimeout:    {}ms", t.endorse.as_millis()),
            format!("submitTimeout:     {}ms", t.submit.as_millis()),
            format!("commitTimeout:     {}ms", t.commit_status.as_millis()),
            format!("userId:            {}", self.user_id),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, 7, 9)
            .unwrap()
    }

    fn config(vars: &[(&str, &str)]) -> Result<HarnessConfig, ConfigError> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HarnessConfig::from_lookup(|key| vars.get(key).cloned(), at(5, 14))
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.channel_name, "user-contract");
        assert_eq!(cfg.chaincode_name, "uat");
        assert_eq!(cfg.msp_id, "Org1MSP");
        assert_eq!(cfg.peer_endpoint, "localhost:7051");
        assert_eq!(cfg.timeouts, Timeouts::default());
        assert_eq!(cfg.timeouts.commit_status, Duration::from_secs(60));
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let cfg = config(&[("CHANNEL_NAME", ""), ("SUBMIT_TIMEOUT_MS", "")]).unwrap();
        assert_eq!(cfg.channel_name, "user-contract");
        assert_eq!(cfg.timeouts.submit, Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_honoured() {
        let cfg = config(&[
            ("CHAINCODE_NAME", "records"),
            ("EVALUATE_TIMEOUT_MS", "250"),
            ("ENDORSE_TIMEOUT_MS", "1000"),
        ])
        .unwrap();
        assert_eq!(cfg.chaincode_name, "records");
        assert_eq!(cfg.timeouts.evaluate, Duration::from_millis(250));
        assert_eq!(cfg.timeouts.endorse, Duration::from_secs(1));
    }

    #[test]
    fn bad_timeout_is_an_error() {
        let err = config(&[("COMMIT_STATUS_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidTimeout { key: "COMMIT_STATUS_TIMEOUT_MS", .. }
        ));
    }

    #[test]
    fn user_id_is_day_month_year_time() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.user_id, "050324140709");
        assert!(cfg.display_lines().iter().any(|l| l.ends_with("050324140709")));
    }
}
