use crate::error::{Result, RuleError};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub fast_pattern: FastPatternConfig,
    #[serde(default)]
    pub parsing: ParsingConfig,
    #[serde(default)]
    pub variables: Vec<VarDef>,
    #[serde(default)]
    pub classifications: Vec<ClassificationDef>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Thresholds consumed by the port-group indexer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FastPatternConfig {
    /// Put every rule into the any-any group of its protocol
    #[serde(default)]
    pub single_rule_group: bool,
    /// Specific port sets larger than this are promoted to any-any
    #[serde(default = "default_bleedover_port_limit")]
    pub bleedover_port_limit: usize,
    /// Log each promoted rule and its port ranges
    #[serde(default)]
    pub bleedover_warnings: bool,
}

impl Default for FastPatternConfig {
    fn default() -> Self {
        FastPatternConfig {
            single_rule_group: false,
            bleedover_port_limit: default_bleedover_port_limit(),
            bleedover_warnings: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParsingConfig {
    /// Treat an equal-or-newer duplicate signature as an error instead
    /// of replacing with a warning
    #[serde(default)]
    pub strict_duplicates: bool,
    /// State newly parsed rules start in
    #[serde(default = "default_true")]
    pub default_rule_state: bool,
    /// Detection instances; sizes each signature's state array
    #[serde(default = "default_instances")]
    pub instances: usize,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        ParsingConfig {
            strict_duplicates: false,
            default_rule_state: true,
            instances: default_instances(),
        }
    }
}

/// One variable definition applied before any rule is read
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VarDef {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: VarKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    #[default]
    Ip,
    Port,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassificationDef {
    pub name: String,
    #[serde(default)]
    pub text: String,
    pub priority: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_bleedover_port_limit() -> usize {
    1024
}

fn default_instances() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RuleError::Config(format!("failed to read config file: {}", e)))?;

        let settings: Settings = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fast_pattern.bleedover_port_limit == 0 {
            return Err(RuleError::Config(
                "bleedover port limit must be greater than 0".to_string(),
            ));
        }

        if self.parsing.instances == 0 || self.parsing.instances > 1024 {
            return Err(RuleError::Config(
                "instances must be between 1 and 1024".to_string(),
            ));
        }

        for var in &self.variables {
            if var.name.is_empty() || var.value.is_empty() {
                return Err(RuleError::Config(
                    "variable definitions need a name and a value".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn default_config() -> Self {
        Settings {
            fast_pattern: FastPatternConfig::default(),
            parsing: ParsingConfig::default(),
            variables: vec![
                VarDef {
                    name: "HOME_NET".to_string(),
                    kind: VarKind::Ip,
                    value: "[192.168.1.0/24]".to_string(),
                },
                VarDef {
                    name: "EXTERNAL_NET".to_string(),
                    kind: VarKind::Ip,
                    value: "!$HOME_NET".to_string(),
                },
                VarDef {
                    name: "HTTP_PORTS".to_string(),
                    kind: VarKind::Port,
                    value: "[80,8080,8000:8100]".to_string(),
                },
                VarDef {
                    name: "HTTPS_PORTS".to_string(),
                    kind: VarKind::Port,
                    value: "443".to_string(),
                },
            ],
            classifications: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}
