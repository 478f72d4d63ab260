//! Explicit configuration record (spec.md §9's "Dynamic configuration"
//! redesign note — no runtime keyword-argument construction).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    Cleartext,
    Dpsi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverTrafficConfig {
    pub enabled: bool,
    /// Mean seconds between cover-queue ticks (spec.md §4.5's `distribution()`).
    pub arrival_rate: f64,
    /// Probability of issuing a cover GET on a prefix miss (spec.md §4.6).
    pub retrieve_probability: f64,
}

impl Default for CoverTrafficConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            arrival_rate: 5.0,
            retrieve_probability: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    pub token_server_url: String,
    pub query_type: QueryType,
    pub reconnect_delay: Duration,
    pub cover_traffic: CoverTrafficConfig,
    /// Spec.md §4.9's `MAX_ERRORS` — consecutive coordinator errors before
    /// the client raises `ClientError::Fatal` and stops.
    pub max_consecutive_errors: u32,
    /// Per-request HTTP timeout. Spec.md §5 requires implementers bound all
    /// HTTP operations even though only the probabilistic retriever's GET is
    /// explicitly specified (60s default there).
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            token_server_url: "http://127.0.0.1:8081".into(),
            query_type: QueryType::Cleartext,
            reconnect_delay: Duration::from_secs(5),
            cover_traffic: CoverTrafficConfig::default(),
            max_consecutive_errors: 5,
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.max_consecutive_errors, 5);
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));
    }
}
