//! Plan configuration schema and validated loading
//!
//! A plan configuration is a JSON document whose file name must end with
//! `.config.json`. Optional sections take their defaults during
//! deserialization; structural rules that serde cannot express (non-empty
//! and unique names) are checked by [`PlanConfig::validate`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::types::Variables;

/// Required suffix for plan configuration files
pub const CONFIG_SUFFIX: &str = ".config.json";

/// Complete plan configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Variable names that may be captured from responses and URLs
    #[serde(default)]
    pub capture_vars: Vec<String>,

    /// Plan-level variables, lowest templating precedence
    #[serde(default)]
    pub variables: Variables,

    /// Named actions modules can invoke while WAITING
    #[serde(default)]
    pub actions: Vec<ActionConfig>,

    /// Modules executed in declared order
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

/// A named, reusable step invoked by modules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionConfig {
    /// HTTP request
    Api(ApiAction),
    /// Browser navigation
    Browser(BrowserAction),
}

impl ActionConfig {
    pub fn name(&self) -> &str {
        match self {
            ActionConfig::Api(action) => &action.name,
            ActionConfig::Browser(action) => &action.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiAction {
    pub name: String,

    /// Target URL; absolute, or relative to the conformance server base URL
    pub endpoint: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

fn default_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserAction {
    pub name: String,
    pub operation: BrowserOperation,
    pub url: String,
    #[serde(default)]
    pub wait_for: WaitUntil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserOperation {
    Navigate,
}

/// Page load condition a navigation waits for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    #[default]
    NetworkIdle,
    DomContentLoaded,
    Load,
}

impl WaitUntil {
    /// Playwright `waitUntil` value
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::NetworkIdle => "networkidle",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::Load => "load",
        }
    }
}

impl std::fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conformance test module to execute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,

    /// Action names run, in order, while the module is WAITING
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,

    /// Module-level variables, override plan variables
    #[serde(default)]
    pub variables: Variables,

    /// Wait strategy for the redirect navigation
    #[serde(default)]
    pub wait_for: WaitUntil,
}

impl ModuleConfig {
    pub fn action_names(&self) -> &[String] {
        self.actions.as_deref().unwrap_or(&[])
    }
}

impl PlanConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        check_file_name(path)?;
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        debug!(
            "Loaded {} ({} modules, {} actions)",
            path.display(),
            config.modules.len(),
            config.actions.len()
        );
        Ok(config)
    }

    /// Parse and validate a configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate and write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        check_file_name(path)?;
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the rules serde cannot express
    pub fn validate(&self) -> Result<()> {
        let mut action_names = HashSet::new();
        for (index, action) in self.actions.iter().enumerate() {
            let name = action.name();
            if name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "actions[{}].name must not be empty",
                    index
                )));
            }
            if !action_names.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate action name '{}'",
                    name
                )));
            }
            match action {
                ActionConfig::Api(api) => {
                    if api.endpoint.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "action '{}' has an empty endpoint",
                            name
                        )));
                    }
                    if api.method.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "action '{}' has an empty method",
                            name
                        )));
                    }
                }
                ActionConfig::Browser(browser) => {
                    if browser.url.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "action '{}' has an empty url",
                            name
                        )));
                    }
                }
            }
        }

        let mut module_names = HashSet::new();
        for (index, module) in self.modules.iter().enumerate() {
            if module.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "modules[{}].name must not be empty",
                    index
                )));
            }
            if !module_names.insert(module.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate module name '{}'",
                    module.name
                )));
            }
        }

        Ok(())
    }

    /// Look up an action by name
    pub fn action(&self, name: &str) -> Option<&ActionConfig> {
        self.actions.iter().find(|action| action.name() == name)
    }
}

/// Reject file names without the `.config.json` suffix
pub fn check_file_name(path: &Path) -> Result<()> {
    let base_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    if base_name.ends_with(CONFIG_SUFFIX) {
        Ok(())
    } else {
        Err(ConfigError::InvalidFileName(base_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "capture_vars": ["code", "access_token"],
        "variables": { "client_id": "test" },
        "actions": [
            {
                "name": "exchange-code",
                "type": "api",
                "endpoint": "https://as.example.com/token",
                "payload": { "code": "{{code}}" },
                "headers": { "Content-Type": "application/x-www-form-urlencoded" }
            },
            {
                "name": "open-callback",
                "type": "browser",
                "operation": "navigate",
                "url": "https://rp.example.com/cb?state={{state}}"
            }
        ],
        "modules": [
            { "name": "oidcc-server", "actions": ["exchange-code"] },
            { "name": "oidcc-userinfo-get" }
        ]
    }"#;

    #[test]
    fn test_parse_sample_config() {
        let config = PlanConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.capture_vars, vec!["code", "access_token"]);
        assert_eq!(config.actions.len(), 2);
        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.modules[0].action_names(), ["exchange-code"]);
        assert!(config.modules[1].action_names().is_empty());
    }

    #[test]
    fn test_defaults_are_applied() {
        let config = PlanConfig::from_json(SAMPLE).unwrap();
        match &config.actions[0] {
            ActionConfig::Api(api) => assert_eq!(api.method, "POST"),
            other => panic!("expected api action, got {:?}", other),
        }
        match &config.actions[1] {
            ActionConfig::Browser(browser) => assert_eq!(browser.wait_for, WaitUntil::NetworkIdle),
            other => panic!("expected browser action, got {:?}", other),
        }
        assert!(config.modules[1].variables.is_empty());
        assert_eq!(config.modules[1].wait_for, WaitUntil::NetworkIdle);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PlanConfig::from_json("{}").unwrap();
        assert!(config.capture_vars.is_empty());
        assert!(config.variables.is_empty());
        assert!(config.actions.is_empty());
        assert!(config.modules.is_empty());
    }

    #[test]
    fn test_payload_keeps_document_order() {
        let config = PlanConfig::from_json(
            r#"{"actions": [{"name": "a", "type": "api", "endpoint": "/x",
                "payload": {"zeta": "1", "alpha": "2"}}]}"#,
        )
        .unwrap();
        let ActionConfig::Api(api) = &config.actions[0] else {
            panic!("expected api action");
        };
        let keys: Vec<&String> = api.payload.as_ref().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha"]);
    }

    #[test]
    fn test_unknown_action_type_is_rejected() {
        let err = PlanConfig::from_json(
            r#"{"actions": [{"name": "a", "type": "shell", "command": "ls"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_wait_strategy_is_rejected() {
        let err = PlanConfig::from_json(
            r#"{"actions": [{"name": "a", "type": "browser", "operation": "navigate",
                "url": "https://x", "wait_for": "forever"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_duplicate_module_names_are_rejected() {
        let err = PlanConfig::from_json(r#"{"modules": [{"name": "m"}, {"name": "m"}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("duplicate module name 'm'"));
    }

    #[test]
    fn test_empty_module_name_is_rejected() {
        let err = PlanConfig::from_json(r#"{"modules": [{"name": ""}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_duplicate_action_names_are_rejected() {
        let err = PlanConfig::from_json(
            r#"{"actions": [
                {"name": "a", "type": "api", "endpoint": "/x"},
                {"name": "a", "type": "api", "endpoint": "/y"}
            ]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate action name 'a'"));
    }

    #[test]
    fn test_dangling_action_reference_is_allowed() {
        let config =
            PlanConfig::from_json(r#"{"modules": [{"name": "m", "actions": ["missing"]}]}"#)
                .unwrap();
        assert!(config.action("missing").is_none());
    }

    #[test]
    fn test_load_rejects_bad_suffix_before_reading() {
        let err = PlanConfig::load(Path::new("/does/not/exist/plan.json")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFileName(ref name) if name == "plan.json"));
    }

    #[test]
    fn test_load_and_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fapi.config.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = PlanConfig::load(&path).unwrap();
        let copy = dir.path().join("copy.config.json");
        config.save(&copy).unwrap();
        assert_eq!(PlanConfig::load(&copy).unwrap(), config);
    }
}
