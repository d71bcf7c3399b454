//! Configuration types for sigmalok

use serde::{Deserialize, Serialize};

/// Node connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node URL (e.g., "http://127.0.0.1:9053")
    pub url: String,

    /// API key for authenticated endpoints (optional)
    #[serde(default)]
    pub api_key: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9053".to_string(),
            api_key: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:9053");
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let config = NodeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.url, config.url);
    }

    #[test]
    fn test_api_key_defaults_when_absent() {
        let parsed: NodeConfig = serde_json::from_str(r#"{"url":"http://node:9053"}"#).unwrap();
        assert_eq!(parsed.url, "http://node:9053");
        assert!(parsed.api_key.is_empty());
    }
}
