//! Server configuration

use cma_protocol::CityRules;
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Output and happiness rules every city is evaluated with
    pub rules: CityRules,
    /// How incoming labor requests are treated
    pub request_policy: RequestPolicy,
}

/// How the server reacts to labor requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPolicy {
    /// Validate and apply every request.
    #[default]
    Apply,
    /// Acknowledge requests without changing anything.
    Ignore,
    /// Swallow requests silently; nothing is ever acknowledged.
    Drop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_applies_requests() {
        let config = ServerConfig::default();
        assert_eq!(config.request_policy, RequestPolicy::Apply);
        assert_eq!(config.rules, CityRules::default());
    }
}
