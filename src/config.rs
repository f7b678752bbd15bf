//! Configuration surface: API credentials and the automation document
//!
//! Credentials come from the environment; the automation document is a YAML
//! file describing the target space and the heuristics to run, including
//! per-device data-point overrides. Heuristic parameter maps stay loose at
//! this layer and are canonicalized by the parameter normalizer before any
//! template runs.

use crate::error::{Result, TuyaError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Default Tuya Cloud Open API endpoint (US data center)
pub const DEFAULT_API_BASE_URL: &str = "https://openapi.tuyaus.com";

/// Client credentials for the Tuya Cloud Open API
#[derive(Debug, Clone)]
pub struct TuyaCredentials {
    /// Cloud project client id
    pub client_id: String,
    /// Cloud project client secret; never logged or echoed back to callers
    pub client_secret: String,
}

impl TuyaCredentials {
    /// Build credentials, rejecting empty values
    pub fn new<S: Into<String>>(client_id: S, client_secret: S) -> Result<Self> {
        let client_id = client_id.into().trim().to_string();
        let client_secret = client_secret.into().trim().to_string();
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(TuyaError::validation(
                "client_id and client_secret are required",
            ));
        }
        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Read credentials from `TUYA_CLIENT_ID` / `TUYA_CLIENT_SECRET`
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("TUYA_CLIENT_ID")
            .map_err(|_| TuyaError::config("TUYA_CLIENT_ID is not set"))?;
        let client_secret = std::env::var("TUYA_CLIENT_SECRET")
            .map_err(|_| TuyaError::config("TUYA_CLIENT_SECRET is not set"))?;
        Self::new(client_id, client_secret)
    }
}

/// Base URL override from `TUYA_API_BASE_URL`, falling back to the default
pub fn base_url_from_env() -> String {
    std::env::var("TUYA_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string())
}

/// Automation document controlling which heuristics run and how
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Target space id; mutating helpers fall back to this when the caller
    /// does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,

    /// Time zone applied to effective-time windows that do not set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone_id: Option<String>,

    /// Explicit heuristic selection; when empty, every configured
    /// heuristic runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_heuristics: Vec<String>,

    /// Heuristic parameters keyed by template name, kept loose here and
    /// normalized before dispatch
    #[serde(default)]
    pub heuristics: BTreeMap<String, serde_json::Value>,

    /// Per-device logical-key → DP code overrides for readable properties
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub device_properties: HashMap<String, HashMap<String, String>>,

    /// Per-device logical-key → function code overrides for actuators
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub device_functions: HashMap<String, HashMap<String, String>>,
}

impl AutomationConfig {
    /// Load the automation document from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TuyaError::config(format!(
                "Automation config not found at {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse the automation document from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| TuyaError::config(format!("Failed to parse automation config: {e}")))
    }

    /// Heuristic keys that should run: the explicit selection when present,
    /// otherwise every configured heuristic
    pub fn selected_heuristics(&self) -> Vec<String> {
        if !self.enabled_heuristics.is_empty() {
            return self.enabled_heuristics.clone();
        }
        self.heuristics.keys().cloned().collect()
    }

    /// Raw parameter map for one heuristic, empty when unconfigured
    pub fn heuristic_params(&self, key: &str) -> serde_json::Map<String, serde_json::Value> {
        match self.heuristics.get(key) {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
space_id: "space-1"
time_zone_id: "America/Sao_Paulo"
heuristics:
  battery_protect:
    inverter_device_id: inverter
    load_device_id: plug
    threshold: 90
  night_guard:
    inverter_device_id: inverter
    load_device_id: plug
    start: "18:00"
    end: "06:00"
device_functions:
  plug:
    switch: switch_led
"#;

    #[test]
    fn parses_yaml_document() {
        let config = AutomationConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.space_id.as_deref(), Some("space-1"));
        assert_eq!(
            config.selected_heuristics(),
            vec!["battery_protect".to_string(), "night_guard".to_string()]
        );
        let params = config.heuristic_params("battery_protect");
        assert_eq!(params["threshold"], 90);
        assert_eq!(config.device_functions["plug"]["switch"], "switch_led");
    }

    #[test]
    fn enabled_heuristics_narrow_the_selection() {
        let mut config = AutomationConfig::from_yaml(SAMPLE).unwrap();
        config.enabled_heuristics = vec!["night_guard".to_string()];
        assert_eq!(config.selected_heuristics(), vec!["night_guard".to_string()]);
    }

    #[test]
    fn unconfigured_heuristic_yields_empty_params() {
        let config = AutomationConfig::from_yaml(SAMPLE).unwrap();
        assert!(config.heuristic_params("solar_surplus").is_empty());
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = AutomationConfig::from_yaml("space_id: [unterminated").unwrap_err();
        assert!(matches!(err, TuyaError::Config(_)));
    }

    #[test]
    fn empty_credentials_are_rejected() {
        assert!(TuyaCredentials::new("", "secret").is_err());
        assert!(TuyaCredentials::new("  id  ", " secret ").is_ok());
    }
}
