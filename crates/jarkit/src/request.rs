//! Validation of declared parameters into a deployment request

use crate::error::{JarError, Result};
use crate::params::{DEFAULT_JAR_BASE, JarParams, ParamValue, ServerDefaults};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// Required suffix of jar names
pub const JAR_SUFFIX: &str = ".jar";

/// Where the jar goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JarLocation {
    /// `catalina_base/<jar_base>`
    Base { catalina_base: PathBuf, jar_base: String },
    /// An absolute directory overriding `catalina_base/jar_base`
    DeploymentPath(PathBuf),
}

impl JarLocation {
    /// Directory the jar is deployed into
    pub fn directory(&self) -> PathBuf {
        match self {
            Self::Base {
                catalina_base,
                jar_base,
            } => catalina_base.join(jar_base),
            Self::DeploymentPath(path) => path.clone(),
        }
    }
}

/// Desired presence of the jar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "ensure")]
pub enum JarEnsure {
    /// Stage the jar from `source`
    Present { source: String, allow_insecure: bool },
    /// Remove the jar, and its extracted directory when `purge` is set
    Absent { purge: bool },
}

/// A validated deployment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JarRequest {
    pub name: String,
    pub location: JarLocation,
    pub jar_name: String,
    pub ensure: JarEnsure,
    pub user: String,
    pub group: String,
}

impl JarRequest {
    /// Absolute path of the deployed jar
    pub fn target_path(&self) -> PathBuf {
        self.location.directory().join(&self.jar_name)
    }

    /// Directory named after the jar without its suffix, next to it
    pub fn purge_path(&self) -> PathBuf {
        let stem = self
            .jar_name
            .strip_suffix(JAR_SUFFIX)
            .unwrap_or(&self.jar_name);
        self.location.directory().join(stem)
    }
}

impl JarParams {
    /// Validate declared parameters into a request
    ///
    /// Pure: touches neither the filesystem nor the network. The source
    /// is only checked for presence here; its shape is checked by
    /// [`JarRequest::resolve`].
    pub fn validate(&self, name: &str, defaults: &ServerDefaults) -> Result<JarRequest> {
        let jar_base = non_empty(&self.jar_base);
        let deployment_path = non_empty(&self.deployment_path);

        // An explicit default jar_base next to deployment_path is tolerated
        if let (Some(base), Some(_)) = (jar_base, deployment_path)
            && base != DEFAULT_JAR_BASE
        {
            return Err(JarError::ParameterConflict {
                first: "jar_base",
                second: "deployment_path",
            });
        }

        check_jar_name("name", name)?;
        let jar_name = non_empty(&self.jar_name).unwrap_or(name);
        check_jar_name("jar_name", jar_name)?;

        let present = match &self.jar_ensure {
            None => true,
            Some(ParamValue::String(s)) if s == "present" => true,
            Some(ParamValue::String(s)) if s == "absent" => false,
            Some(other) => {
                return Err(JarError::TypeValidation {
                    field: "jar_ensure",
                    expected: "Enum['present', 'absent']".to_string(),
                    actual: format!("{} {}", other.type_name(), other),
                });
            }
        };
        let purge = boolean("jar_purge", &self.jar_purge, true)?;
        let allow_insecure = boolean("allow_insecure", &self.allow_insecure, false)?;

        let location = match deployment_path {
            Some(path) => JarLocation::DeploymentPath(absolute("deployment_path", path)?),
            None => {
                let catalina_base =
                    non_empty(&self.catalina_base).unwrap_or(defaults.catalina_base.as_str());
                JarLocation::Base {
                    catalina_base: absolute("catalina_base", catalina_base)?,
                    jar_base: relative("jar_base", jar_base.unwrap_or(DEFAULT_JAR_BASE))?,
                }
            }
        };

        let ensure = if present {
            let source = non_empty(&self.jar_source).ok_or(JarError::MissingRequiredField {
                field: "jar_source",
                reason: "jar_ensure is present",
            })?;
            JarEnsure::Present {
                source: source.to_string(),
                allow_insecure,
            }
        } else {
            JarEnsure::Absent { purge }
        };

        Ok(JarRequest {
            name: name.to_string(),
            location,
            jar_name: jar_name.to_string(),
            ensure,
            user: non_empty(&self.user).unwrap_or(defaults.user.as_str()).to_string(),
            group: non_empty(&self.group).unwrap_or(defaults.group.as_str()).to_string(),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// A jar name is a single file name ending in `.jar` whose stem is a
/// plain name too, since the stem names the purged directory
fn check_jar_name(field: &'static str, value: &str) -> Result<()> {
    let fail = |reason| {
        Err(JarError::NamingConvention {
            field,
            reason,
            value: value.to_string(),
        })
    };

    let Some(stem) = value.strip_suffix(JAR_SUFFIX) else {
        return fail("must end in .jar");
    };
    if !is_file_name(value) || !is_file_name(stem) {
        return fail("must be a plain file name");
    }
    Ok(())
}

fn is_file_name(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !value.contains('/')
}

fn boolean(field: &'static str, value: &Option<ParamValue>, default: bool) -> Result<bool> {
    match value {
        None => Ok(default),
        Some(ParamValue::Bool(b)) => Ok(*b),
        Some(other) => Err(JarError::TypeValidation {
            field,
            expected: "Boolean".to_string(),
            actual: format!("{} {}", other.type_name(), other),
        }),
    }
}

fn absolute(field: &'static str, value: &str) -> Result<PathBuf> {
    let path = Path::new(value);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Err(JarError::TypeValidation {
            field,
            expected: "absolute path".to_string(),
            actual: format!("String '{value}'"),
        })
    }
}

/// A path below the base directory, without `..` or a root
fn relative(field: &'static str, value: &str) -> Result<String> {
    if Path::new(value)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        Ok(value.to_string())
    } else {
        Err(JarError::TypeValidation {
            field,
            expected: "relative path".to_string(),
            actual: format!("String '{value}'"),
        })
    }
}
