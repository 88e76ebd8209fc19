//! Managed file resource - ownership, mode and removal of a single path

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
use serde::{Serialize, Serializer};
use std::fs::{self, Metadata, Permissions};
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::PathBuf;

use super::owner::{lookup_gid, lookup_uid};

/// Mode of deployed jars
pub const JAR_MODE: u32 = 0o640;

/// Desired state of a managed path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "ensure", rename_all = "snake_case")]
pub enum FileEnsure {
    /// A regular file with this ownership and mode
    File {
        owner: String,
        group: String,
        #[serde(serialize_with = "octal")]
        mode: u32,
    },
    /// Nothing at the path; directories are only removed with `force`
    Absent { force: bool },
}

/// A path whose metadata or absence is enforced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedFile {
    pub path: PathBuf,
    #[serde(flatten)]
    pub ensure: FileEnsure,
}

fn octal<S: Serializer>(mode: &u32, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{mode:04o}"))
}

fn kind(meta: &Metadata) -> &'static str {
    if meta.is_dir() {
        "directory"
    } else if meta.file_type().is_symlink() {
        "symlink"
    } else if meta.is_file() {
        "file"
    } else {
        "special file"
    }
}

impl ManagedFile {
    /// A regular file with the given ownership and mode
    pub fn file(path: impl Into<PathBuf>, owner: &str, group: &str, mode: u32) -> Self {
        Self {
            path: path.into(),
            ensure: FileEnsure::File {
                owner: owner.to_string(),
                group: group.to_string(),
                mode,
            },
        }
    }

    /// Nothing at the path
    pub fn absent(path: impl Into<PathBuf>, force: bool) -> Self {
        Self {
            path: path.into(),
            ensure: FileEnsure::Absent { force },
        }
    }

    fn wanted(owner: &str, group: &str, mode: u32) -> String {
        format!("{owner}:{group} {mode:04o}")
    }

    /// Metadata without following a final symlink, `None` if nothing is there
    fn probe(&self) -> Result<Option<Metadata>> {
        match fs::symlink_metadata(&self.path) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to inspect {}", self.path.display()))
            }
        }
    }

    fn enforce_metadata(&self, owner: &str, group: &str, mode: u32) -> Result<bool> {
        let Some(meta) = self.probe()? else {
            bail!(
                "{} does not exist; nothing was staged to enforce metadata on",
                self.path.display()
            );
        };
        if !meta.is_file() {
            bail!(
                "{} is a {}, expected a regular file",
                self.path.display(),
                kind(&meta)
            );
        }

        let uid = lookup_uid(owner)?;
        let gid = lookup_gid(group)?;
        let mut changed = false;

        if meta.uid() != uid || meta.gid() != gid {
            std::os::unix::fs::chown(&self.path, Some(uid), Some(gid)).with_context(|| {
                format!(
                    "Failed to change ownership of {} to {}:{}",
                    self.path.display(),
                    owner,
                    group
                )
            })?;
            changed = true;
        }

        if meta.permissions().mode() & 0o7777 != mode {
            fs::set_permissions(&self.path, Permissions::from_mode(mode)).with_context(|| {
                format!("Failed to set mode {:04o} on {}", mode, self.path.display())
            })?;
            changed = true;
        }

        Ok(changed)
    }

    fn remove(&self, force: bool) -> Result<ApplyResult> {
        let Some(meta) = self.probe()? else {
            return Ok(ApplyResult::NoChange);
        };

        if meta.is_dir() {
            if !force {
                log::warn!(
                    "{} is a directory; not removing it without force",
                    self.path.display()
                );
                return Ok(ApplyResult::Skipped {
                    reason: format!("{} is a directory", self.path.display()),
                });
            }
            fs::remove_dir_all(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        } else {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }

        log::info!("Removed {}", self.path.display());
        Ok(ApplyResult::Removed)
    }
}

impl Resource for ManagedFile {
    fn id(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    fn description(&self) -> String {
        match &self.ensure {
            FileEnsure::File { owner, group, mode } => format!(
                "Ensure {} is a file ({})",
                self.path.display(),
                Self::wanted(owner, group, *mode)
            ),
            FileEnsure::Absent { force: true } => {
                format!("Remove {} recursively", self.path.display())
            }
            FileEnsure::Absent { force: false } => format!("Remove {}", self.path.display()),
        }
    }

    fn resource_type(&self) -> &'static str {
        "file"
    }

    fn current_state(&self) -> Result<ResourceState> {
        let Some(meta) = self.probe()? else {
            return Ok(ResourceState::Absent);
        };

        match &self.ensure {
            FileEnsure::Absent { .. } => Ok(ResourceState::Present {
                details: Some(kind(&meta).to_string()),
            }),
            FileEnsure::File { owner, group, mode } => {
                let wanted = Self::wanted(owner, group, *mode);
                if !meta.is_file() {
                    return Ok(ResourceState::Modified {
                        from: kind(&meta).to_string(),
                        to: wanted,
                    });
                }

                let actual_mode = meta.permissions().mode() & 0o7777;
                if meta.uid() == lookup_uid(owner)?
                    && meta.gid() == lookup_gid(group)?
                    && actual_mode == *mode
                {
                    Ok(ResourceState::Present {
                        details: Some(wanted),
                    })
                } else {
                    Ok(ResourceState::Modified {
                        from: format!("{}:{} {:04o}", meta.uid(), meta.gid(), actual_mode),
                        to: wanted,
                    })
                }
            }
        }
    }

    fn desired_state(&self) -> ResourceState {
        match &self.ensure {
            FileEnsure::File { owner, group, mode } => ResourceState::Present {
                details: Some(Self::wanted(owner, group, *mode)),
            },
            FileEnsure::Absent { .. } => ResourceState::Absent,
        }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        match &self.ensure {
            FileEnsure::File { owner, group, mode } => {
                if self.enforce_metadata(owner, group, *mode)? {
                    Ok(ApplyResult::Modified)
                } else {
                    if ctx.refresh {
                        log::debug!("{} refreshed, metadata already in sync", self.id());
                    }
                    Ok(ApplyResult::NoChange)
                }
            }
            FileEnsure::Absent { force } => self.remove(*force),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Owner and group of the test process, so no privileges are needed
    fn me() -> (String, String) {
        let dir = tempfile::tempdir().unwrap();
        let probe = dir.path().join("probe");
        fs::write(&probe, b"").unwrap();
        let meta = fs::metadata(&probe).unwrap();
        (meta.uid().to_string(), meta.gid().to_string())
    }

    #[test]
    fn test_enforces_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.jar");
        fs::write(&path, b"jar").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o644)).unwrap();

        let (uid, gid) = me();
        let file = ManagedFile::file(&path, &uid, &gid, JAR_MODE);
        assert!(matches!(
            file.current_state().unwrap(),
            ResourceState::Modified { .. }
        ));

        let result = file.apply(&mut ApplyContext::default()).unwrap();
        assert_eq!(result, ApplyResult::Modified);
        assert_eq!(
            fs::metadata(&path).unwrap().permissions().mode() & 0o7777,
            0o640
        );
        assert_eq!(file.current_state().unwrap(), file.desired_state());

        let again = file.apply(&mut ApplyContext::default().refreshed()).unwrap();
        assert_eq!(again, ApplyResult::NoChange);
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (uid, gid) = me();
        let file = ManagedFile::file(dir.path().join("sample.jar"), &uid, &gid, JAR_MODE);
        assert_eq!(file.current_state().unwrap(), ResourceState::Absent);
        assert!(file.apply(&mut ApplyContext::default()).is_err());
    }

    #[test]
    fn test_absent_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.jar");
        fs::write(&path, b"jar").unwrap();

        let file = ManagedFile::absent(&path, false);
        assert!(file.current_state().unwrap().is_present());
        assert_eq!(
            file.apply(&mut ApplyContext::default()).unwrap(),
            ApplyResult::Removed
        );
        assert!(!path.exists());
        assert_eq!(
            file.apply(&mut ApplyContext::default()).unwrap(),
            ApplyResult::NoChange
        );
    }

    #[test]
    fn test_absent_without_force_keeps_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.jar");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("inner"), b"x").unwrap();

        let result = ManagedFile::absent(&path, false)
            .apply(&mut ApplyContext::default())
            .unwrap();
        assert!(matches!(result, ApplyResult::Skipped { .. }));
        assert!(path.exists());
    }

    #[test]
    fn test_absent_with_force_removes_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample");
        fs::create_dir_all(path.join("WEB-INF/classes")).unwrap();
        fs::write(path.join("WEB-INF/classes/A.class"), b"x").unwrap();

        let result = ManagedFile::absent(&path, true)
            .apply(&mut ApplyContext::default())
            .unwrap();
        assert_eq!(result, ApplyResult::Removed);
        assert!(!path.exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.jar");
        fs::write(&path, b"jar").unwrap();

        let mut ctx = ApplyContext::new(true, false);
        let result = ManagedFile::absent(&path, false).apply(&mut ctx).unwrap();
        assert!(matches!(result, ApplyResult::Skipped { .. }));
        assert!(path.exists());
    }

    #[test]
    fn test_serializes_mode_as_octal() {
        let file = ManagedFile::file("/opt/apache-tomcat/lib/sample.jar", "tomcat", "tomcat", JAR_MODE);
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["mode"], "0640");
        assert_eq!(json["ensure"], "file");
        assert_eq!(json["owner"], "tomcat");
    }
}
