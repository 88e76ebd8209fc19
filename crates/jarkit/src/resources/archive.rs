//! Staging resource - brings jar content from its source to the target path

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Cursor, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::fetch::Fetcher;
use crate::source::Source;

/// Stages the content of `source` at `path`
///
/// Local sources are compared by content digest, so a changed source
/// file is re-staged. A remote source is not downloaded again once the
/// target exists.
pub struct StageArchive {
    pub name: String,
    pub source: Source,
    pub path: PathBuf,
    pub allow_insecure: bool,
    fetcher: Arc<dyn Fetcher>,
}

impl fmt::Debug for StageArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageArchive")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("path", &self.path)
            .field("allow_insecure", &self.allow_insecure)
            .finish_non_exhaustive()
    }
}

/// Digest of a file, `None` if it does not exist
fn digest(path: &Path) -> Result<Option<blake3::Hash>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(blake3::hash(&bytes))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn short(hash: &blake3::Hash) -> String {
    format!("blake3:{}", &hash.to_hex()[..16])
}

/// Check that content is a readable jar (zip) archive
pub fn verify_jar(bytes: &[u8]) -> Result<()> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes)).context("not a valid jar archive")?;
    log::debug!("jar archive with {} entries", archive.len());
    Ok(())
}

impl StageArchive {
    pub fn new(
        name: &str,
        source: Source,
        path: impl Into<PathBuf>,
        allow_insecure: bool,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            name: name.to_string(),
            source,
            path: path.into(),
            allow_insecure,
            fetcher,
        }
    }

    /// Write through a sibling temporary file so the target is never half-written
    fn write_atomically(&self, bytes: &[u8]) -> Result<()> {
        let parent = self
            .path
            .parent()
            .context("Target path has no parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        let file_name = self
            .path
            .file_name()
            .context("Target path has no file name")?
            .to_string_lossy();
        let staging = parent.join(format!(".{file_name}.staging"));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;

        let written = file
            .write_all(bytes)
            .and_then(|()| file.sync_all())
            .with_context(|| format!("Failed to write {}", staging.display()))
            .and_then(|()| {
                fs::rename(&staging, &self.path).with_context(|| {
                    format!(
                        "Failed to move {} into place at {}",
                        staging.display(),
                        self.path.display()
                    )
                })
            });

        if written.is_err()
            && let Err(e) = fs::remove_file(&staging)
            && e.kind() != io::ErrorKind::NotFound
        {
            log::warn!("Could not remove {}: {e}", staging.display());
        }
        written
    }
}

impl Resource for StageArchive {
    fn id(&self) -> String {
        format!("archive:{}", self.path.display())
    }

    fn description(&self) -> String {
        let transport = if self.allow_insecure {
            " (insecure transport allowed)"
        } else {
            ""
        };
        format!(
            "Stage {} from {}{}",
            self.path.display(),
            self.source,
            transport
        )
    }

    fn resource_type(&self) -> &'static str {
        "jar_archive"
    }

    fn current_state(&self) -> Result<ResourceState> {
        if self.path.is_dir() {
            return Ok(ResourceState::Modified {
                from: "directory".to_string(),
                to: "staged jar".to_string(),
            });
        }

        match &self.source {
            Source::Local(_) => Ok(match digest(&self.path)? {
                Some(hash) => ResourceState::Present {
                    details: Some(short(&hash)),
                },
                None => ResourceState::Absent,
            }),
            Source::Remote(_) => Ok(if self.path.exists() {
                ResourceState::Present { details: None }
            } else {
                ResourceState::Absent
            }),
        }
    }

    fn desired_state(&self) -> ResourceState {
        let details = match &self.source {
            Source::Local(path) => digest(path).ok().flatten().map(|h| short(&h)),
            Source::Remote(_) => None,
        };
        ResourceState::Present { details }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        if self.path.is_dir() {
            bail!(
                "{} is a directory, refusing to stage a jar over it",
                self.path.display()
            );
        }

        let existing = digest(&self.path)?;
        if existing.is_some() && !self.source.is_local() {
            return Ok(ApplyResult::NoChange);
        }

        let bytes = self
            .fetcher
            .fetch(&self.source, self.allow_insecure)
            .with_context(|| format!("Failed to fetch {}", self.source))?;
        verify_jar(&bytes).with_context(|| format!("Content from {}", self.source))?;

        if existing == Some(blake3::hash(&bytes)) {
            return Ok(ApplyResult::NoChange);
        }

        self.write_atomically(&bytes)?;
        log::info!("Staged {} from {}", self.path.display(), self.source);

        Ok(if existing.is_some() {
            ApplyResult::Modified
        } else {
            ApplyResult::Created
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fetch::tests::StubFetcher;

    /// A minimal jar with a manifest and one class entry
    pub(crate) fn jar_bytes(marker: &str) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
            writer.write_all(b"Manifest-Version: 1.0\n").unwrap();
            writer.start_file("Sample.class", options).unwrap();
            writer.write_all(marker.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn stage(source: &Path, target: &Path) -> StageArchive {
        StageArchive::new(
            "sample.jar",
            Source::Local(source.to_path_buf()),
            target,
            false,
            Arc::new(StubFetcher::default()),
        )
    }

    #[test]
    fn test_stages_local_jar() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.jar");
        fs::write(&source, jar_bytes("v1")).unwrap();
        let target = dir.path().join("tomcat/lib/sample.jar");

        let resource = stage(&source, &target);
        assert_eq!(resource.current_state().unwrap(), ResourceState::Absent);

        let result = resource.apply(&mut ApplyContext::default()).unwrap();
        assert_eq!(result, ApplyResult::Created);
        assert_eq!(fs::read(&target).unwrap(), fs::read(&source).unwrap());
        assert_eq!(resource.current_state().unwrap(), resource.desired_state());
        assert!(!dir.path().join("tomcat/lib/.sample.jar.staging").exists());

        let again = resource.apply(&mut ApplyContext::default()).unwrap();
        assert_eq!(again, ApplyResult::NoChange);
    }

    #[test]
    fn test_failed_rename_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.jar");
        fs::write(&source, jar_bytes("v1")).unwrap();

        // A non-empty directory cannot be replaced by a rename
        let target = dir.path().join("sample.jar");
        fs::create_dir_all(target.join("META-INF")).unwrap();

        let resource = stage(&source, &target);
        let err = resource.write_atomically(&jar_bytes("v1")).unwrap_err();
        assert!(format!("{err:#}").contains("into place"));
        assert!(!dir.path().join(".sample.jar.staging").exists());
        assert!(target.join("META-INF").is_dir());
    }

    #[test]
    fn test_restages_changed_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.jar");
        let target = dir.path().join("sample.jar");
        fs::write(&source, jar_bytes("v1")).unwrap();

        let resource = stage(&source, &target);
        resource.apply(&mut ApplyContext::default()).unwrap();

        fs::write(&source, jar_bytes("v2")).unwrap();
        assert!(resource.needs_apply().unwrap());
        assert_eq!(
            resource.apply(&mut ApplyContext::default()).unwrap(),
            ApplyResult::Modified
        );
    }

    #[test]
    fn test_rejects_non_jar_content() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.jar");
        fs::write(&source, b"not a zip").unwrap();
        let target = dir.path().join("sample.jar");

        let err = stage(&source, &target)
            .apply(&mut ApplyContext::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("not a valid jar archive"));
        assert!(!target.exists());
    }

    #[test]
    fn test_remote_forwards_allow_insecure_and_is_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sample.jar");
        let url = "https://repo.example.com/sample.jar";
        let fetcher = Arc::new(StubFetcher::with_remote(url, jar_bytes("remote")));

        let resource = StageArchive::new(
            "sample.jar",
            Source::Remote(url::Url::parse(url).unwrap()),
            &target,
            true,
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        );

        assert_eq!(
            resource.apply(&mut ApplyContext::default()).unwrap(),
            ApplyResult::Created
        );
        assert_eq!(
            resource.apply(&mut ApplyContext::default()).unwrap(),
            ApplyResult::NoChange
        );
        assert_eq!(fetcher.calls(), vec![(url.to_string(), true)]);
    }
}
