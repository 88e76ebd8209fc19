//! Declared parameters of a jar deployment
//!
//! Every field is optional so that "unset" and "explicitly set to the
//! default" stay distinguishable during validation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default library directory under `catalina_base`
pub const DEFAULT_JAR_BASE: &str = "lib";

/// Default base installation directory
pub const DEFAULT_CATALINA_BASE: &str = "/opt/apache-tomcat";

/// Default owner of deployed files
pub const DEFAULT_USER: &str = "tomcat";

/// Default group of deployed files
pub const DEFAULT_GROUP: &str = "tomcat";

/// A loosely typed parameter value as declared
///
/// Enum and boolean parameters are kept loose until validation so that a
/// wrong type is reported as a validation error naming the field instead
/// of a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    /// Parse a command-line value
    ///
    /// `true`/`false` become booleans and integers become integers, the
    /// same way a manifest would type them.
    pub fn parse_cli(raw: &str) -> Self {
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => raw
                .parse::<i64>()
                .map(Self::Integer)
                .unwrap_or_else(|_| Self::String(raw.to_string())),
        }
    }

    /// Name of the value's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// Defaults supplied by the surrounding server installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerDefaults {
    pub catalina_base: String,
    pub user: String,
    pub group: String,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            catalina_base: DEFAULT_CATALINA_BASE.to_string(),
            user: DEFAULT_USER.to_string(),
            group: DEFAULT_GROUP.to_string(),
        }
    }
}

/// Parameters of one jar declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JarParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalina_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar_ensure: Option<ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar_purge: Option<ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_insecure: Option<ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl JarParams {
    /// Set a parameter by name from a command-line value
    ///
    /// Returns an error message for unknown parameter names.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), String> {
        let text = Some(raw.to_string());
        match key {
            "catalina_base" => self.catalina_base = text,
            "jar_base" => self.jar_base = text,
            "deployment_path" => self.deployment_path = text,
            "jar_name" => self.jar_name = text,
            "jar_source" => self.jar_source = text,
            "jar_ensure" => self.jar_ensure = Some(ParamValue::parse_cli(raw)),
            "jar_purge" => self.jar_purge = Some(ParamValue::parse_cli(raw)),
            "allow_insecure" => self.allow_insecure = Some(ParamValue::parse_cli(raw)),
            "user" => self.user = text,
            "group" => self.group = text,
            other => return Err(format!("unknown parameter '{other}'")),
        }
        Ok(())
    }
}
