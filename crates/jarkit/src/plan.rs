//! Resolution of a validated request into concrete filesystem actions

use crate::error::Result;
use crate::fetch::Fetcher;
use crate::params::{JarParams, ServerDefaults};
use crate::request::{JarEnsure, JarRequest};
use crate::resources::{JAR_MODE, ManagedFile, StageArchive};
use crate::source::Source;
use declarative::ExecutionPlan;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Content staging step of a present jar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStep {
    pub source: Source,
    pub path: PathBuf,
    pub allow_insecure: bool,
}

/// Terminal outcome of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "ensure", rename_all = "snake_case")]
pub enum Outcome {
    /// Stage the content, then enforce file metadata (subscribed to the stage)
    Present { stage: StageStep, file: ManagedFile },
    /// Remove the file, and the extracted directory when purging
    Absent {
        file: ManagedFile,
        purge: Option<ManagedFile>,
    },
}

/// Resolved desired filesystem state of one jar declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    pub name: String,
    pub target: PathBuf,
    pub outcome: Outcome,
}

impl JarRequest {
    /// Resolve the request into its plan
    ///
    /// This is where the source is checked against what the fetch backend
    /// can handle, so a malformed source only fails here.
    pub fn resolve(&self, fetcher: &dyn Fetcher) -> Result<DeploymentPlan> {
        let target = self.target_path();

        let outcome = match &self.ensure {
            JarEnsure::Present {
                source,
                allow_insecure,
            } => Outcome::Present {
                stage: StageStep {
                    source: Source::resolve(source, fetcher)?,
                    path: target.clone(),
                    allow_insecure: *allow_insecure,
                },
                file: ManagedFile::file(&target, &self.user, &self.group, JAR_MODE),
            },
            JarEnsure::Absent { purge } => Outcome::Absent {
                file: ManagedFile::absent(&target, false),
                purge: purge.then(|| ManagedFile::absent(self.purge_path(), true)),
            },
        };

        Ok(DeploymentPlan {
            name: self.name.clone(),
            target,
            outcome,
        })
    }
}

impl DeploymentPlan {
    /// All managed files of the plan, in execution order
    pub fn files(&self) -> Vec<&ManagedFile> {
        match &self.outcome {
            Outcome::Present { file, .. } => vec![file],
            Outcome::Absent { file, purge } => std::iter::once(file).chain(purge).collect(),
        }
    }

    /// Directory removed recursively by this plan, if any
    pub fn purge_dir(&self) -> Option<&PathBuf> {
        match &self.outcome {
            Outcome::Absent {
                purge: Some(dir), ..
            } => Some(&dir.path),
            _ => None,
        }
    }

    /// Build the ordered execution plan
    ///
    /// For a present jar the file step subscribes to the stage step.
    pub fn into_execution_plan(self, fetcher: Arc<dyn Fetcher>) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new(&self.name);

        match self.outcome {
            Outcome::Present { stage, file } => {
                let staged = plan.add(Box::new(StageArchive::new(
                    &self.name,
                    stage.source,
                    stage.path,
                    stage.allow_insecure,
                    fetcher,
                )));
                plan.add_subscribed(Box::new(file), &[staged]);
            }
            Outcome::Absent { file, purge } => {
                plan.add(Box::new(file));
                if let Some(dir) = purge {
                    plan.add(Box::new(dir));
                }
            }
        }

        plan
    }
}

/// Two plans claiming the same path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{first} and {second} both manage {}", path.display())]
pub struct PathCollision {
    pub first: String,
    pub second: String,
    pub path: PathBuf,
}

/// Check that every plan owns its paths alone
///
/// Targets must be distinct, and no purged directory may hold another
/// plan's target.
pub fn check_collisions(plans: &[DeploymentPlan]) -> std::result::Result<(), PathCollision> {
    for (i, a) in plans.iter().enumerate() {
        for b in &plans[i + 1..] {
            if a.target == b.target {
                return Err(PathCollision {
                    first: a.name.clone(),
                    second: b.name.clone(),
                    path: a.target.clone(),
                });
            }
            for (purger, other) in [(a, b), (b, a)] {
                if let Some(dir) = purger.purge_dir()
                    && other.target.starts_with(dir)
                {
                    return Err(PathCollision {
                        first: purger.name.clone(),
                        second: other.name.clone(),
                        path: other.target.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Validate and resolve one declaration in a single call
pub fn deploy(
    name: &str,
    params: &JarParams,
    defaults: &ServerDefaults,
    fetcher: &dyn Fetcher,
) -> Result<DeploymentPlan> {
    params.validate(name, defaults)?.resolve(fetcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JarError;
    use crate::fetch::tests::StubFetcher;
    use crate::params::ParamValue;
    use crate::resources::FileEnsure;
    use crate::resources::archive::tests::jar_bytes;
    use declarative::{ExecuteOptions, execute_simple};
    use std::fs;

    fn run(name: &str, params: JarParams) -> Result<DeploymentPlan> {
        deploy(
            name,
            &params,
            &ServerDefaults::default(),
            &StubFetcher::default(),
        )
    }

    fn present_file(plan: &DeploymentPlan) -> (&StageStep, &ManagedFile) {
        match &plan.outcome {
            Outcome::Present { stage, file } => (stage, file),
            Outcome::Absent { .. } => panic!("expected a present outcome"),
        }
    }

    #[test]
    fn test_basic_deployment() {
        let plan = run(
            "sample.jar",
            JarParams {
                jar_source: Some("/tmp/sample.jar".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let (stage, file) = present_file(&plan);
        assert_eq!(stage.source, Source::Local(PathBuf::from("/tmp/sample.jar")));
        assert_eq!(stage.path, PathBuf::from("/opt/apache-tomcat/lib/sample.jar"));
        assert!(!stage.allow_insecure);
        assert_eq!(
            *file,
            ManagedFile::file("/opt/apache-tomcat/lib/sample.jar", "tomcat", "tomcat", 0o640)
        );
    }

    #[test]
    fn test_everything_set() {
        let plan = run(
            "sample.jar",
            JarParams {
                catalina_base: Some("/opt/apache-tomcat/test".into()),
                jar_base: Some("lib2".into()),
                jar_ensure: Some("present".into()),
                jar_name: Some("sample2.jar".into()),
                jar_source: Some("/tmp/sample.jar".into()),
                allow_insecure: Some(true.into()),
                ..Default::default()
            },
        )
        .unwrap();

        let (stage, file) = present_file(&plan);
        assert_eq!(
            stage.path,
            PathBuf::from("/opt/apache-tomcat/test/lib2/sample2.jar")
        );
        assert!(stage.allow_insecure);
        assert_eq!(file.path, stage.path);
    }

    #[test]
    fn test_owner_group_propagate() {
        let plan = run(
            "sample.jar",
            JarParams {
                catalina_base: Some("/opt/apache-tomcat".into()),
                jar_base: Some("lib2".into()),
                jar_name: Some("sample2.jar".into()),
                jar_source: Some("/tmp/sample.jar".into()),
                allow_insecure: Some(true.into()),
                user: Some("tomcat2".into()),
                group: Some("tomcat2".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let (_, file) = present_file(&plan);
        assert_eq!(
            *file,
            ManagedFile::file("/opt/apache-tomcat/lib2/sample2.jar", "tomcat2", "tomcat2", 0o640)
        );
    }

    #[test]
    fn test_basic_undeployment_purges() {
        let plan = run(
            "sample.jar",
            JarParams {
                jar_ensure: Some("absent".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let files = plan.files();
        assert_eq!(files.len(), 2);
        assert_eq!(
            *files[0],
            ManagedFile::absent("/opt/apache-tomcat/lib/sample.jar", false)
        );
        assert_eq!(
            *files[1],
            ManagedFile::absent("/opt/apache-tomcat/lib/sample", true)
        );
    }

    #[test]
    fn test_purge_false_only_removes_file() {
        let plan = run(
            "sample.jar",
            JarParams {
                jar_ensure: Some("absent".into()),
                jar_purge: Some(ParamValue::Bool(false)),
                ..Default::default()
            },
        )
        .unwrap();

        let files = plan.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].ensure, FileEnsure::Absent { force: false });
        assert!(
            !files
                .iter()
                .any(|f| f.path == PathBuf::from("/opt/apache-tomcat/lib/sample"))
        );
    }

    #[test]
    fn test_invalid_source_only_fails_at_resolution() {
        let params = JarParams {
            jar_source: Some("foo".into()),
            ..Default::default()
        };
        let request = params
            .validate("sample.jar", &ServerDefaults::default())
            .unwrap();

        let err = request.resolve(&StubFetcher::default()).unwrap_err();
        assert!(matches!(err, JarError::SourceResolution { .. }));
        assert!(err.to_string().contains("invalid source url"));
    }

    #[test]
    fn test_execution_plan_order_and_subscription() {
        let plan = run(
            "sample.jar",
            JarParams {
                jar_source: Some("/tmp/sample.jar".into()),
                ..Default::default()
            },
        )
        .unwrap()
        .into_execution_plan(Arc::new(StubFetcher::default()));

        let steps = plan.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].resource.resource_type(), "jar_archive");
        assert_eq!(steps[1].resource.resource_type(), "file");
        assert_eq!(steps[1].subscribes_to.len(), 1);
        assert_eq!(steps[1].subscribes_to[0].index(), 0);
    }

    #[test]
    fn test_shared_target_collides() {
        let present = run(
            "a.jar",
            JarParams {
                jar_name: Some("x.jar".into()),
                jar_source: Some("/tmp/x.jar".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let absent = run(
            "b.jar",
            JarParams {
                jar_name: Some("x.jar".into()),
                jar_ensure: Some("absent".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let err = check_collisions(&[present.clone(), absent]).unwrap_err();
        assert_eq!(err.first, "a.jar");
        assert_eq!(err.second, "b.jar");
        assert_eq!(err.path, PathBuf::from("/opt/apache-tomcat/lib/x.jar"));

        let other = run(
            "c.jar",
            JarParams {
                jar_source: Some("/tmp/c.jar".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(check_collisions(&[present, other]).is_ok());
    }

    #[test]
    fn test_purge_dir_holding_another_target_collides() {
        let purging = run(
            "app.jar",
            JarParams {
                jar_base: Some("shared".into()),
                jar_ensure: Some("absent".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let nested = run(
            "lib.jar",
            JarParams {
                jar_base: Some("shared/app".into()),
                jar_source: Some("/tmp/lib.jar".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let err = check_collisions(&[nested, purging]).unwrap_err();
        assert_eq!(err.first, "app.jar");
        assert_eq!(
            err.path,
            PathBuf::from("/opt/apache-tomcat/shared/app/lib.jar")
        );
    }

    #[test]
    fn test_converges_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dist/sample.jar");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, jar_bytes("v1")).unwrap();

        let meta = fs::metadata(&source).unwrap();
        let (uid, gid) = {
            use std::os::unix::fs::MetadataExt;
            (meta.uid().to_string(), meta.gid().to_string())
        };
        let base = dir.path().join("tomcat");

        let params = JarParams {
            catalina_base: Some(base.to_string_lossy().to_string()),
            jar_source: Some(source.to_string_lossy().to_string()),
            user: Some(uid.clone()),
            group: Some(gid.clone()),
            ..Default::default()
        };
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher::default());

        let build = |p: &JarParams| {
            deploy("sample.jar", p, &ServerDefaults::default(), fetcher.as_ref())
                .unwrap()
                .into_execution_plan(Arc::clone(&fetcher))
        };

        let first = execute_simple(vec![build(&params)], ExecuteOptions::default()).unwrap();
        assert!(first.is_success());
        assert_eq!(first.created, 1);

        let target = base.join("lib/sample.jar");
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o7777;
            assert_eq!(mode, 0o640);
        }

        // Converged: a second run has nothing to do
        let second = execute_simple(vec![build(&params)], ExecuteOptions::default()).unwrap();
        assert_eq!(second.total(), 0);

        // Removal with purge takes the extracted directory too
        fs::create_dir_all(base.join("lib/sample/META-INF")).unwrap();
        let absent = JarParams {
            jar_ensure: Some("absent".into()),
            jar_source: None,
            ..params
        };
        let third = execute_simple(vec![build(&absent)], ExecuteOptions::default()).unwrap();
        assert_eq!(third.removed, 2);
        assert!(!target.exists());
        assert!(!base.join("lib/sample").exists());
    }
}
