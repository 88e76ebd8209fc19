//! # jarkit
//!
//! Declarative deployment of a single JAR file into a Tomcat server's
//! library directory.
//!
//! A declaration goes through two phases:
//!
//! 1. [`JarParams::validate`] checks the declared parameters without
//!    touching the system and yields a [`JarRequest`].
//! 2. [`JarRequest::resolve`] checks the source against the fetch
//!    backend and yields a [`DeploymentPlan`].
//!
//! The plan converts into a [`declarative::ExecutionPlan`] of ordered
//! steps: stage the content, then enforce owner/group/mode (subscribed to
//! the stage step); or remove the file and, when purging, the directory
//! the jar was extracted into.
//!
//! ## Example
//!
//! ```no_run
//! use jarkit::{DefaultFetcher, JarParams, ServerDefaults, deploy};
//! use std::sync::Arc;
//!
//! let params = JarParams {
//!     jar_source: Some("/tmp/sample.jar".into()),
//!     ..Default::default()
//! };
//! let fetcher = Arc::new(DefaultFetcher::new());
//! let plan = deploy("sample.jar", &params, &ServerDefaults::default(), fetcher.as_ref())
//!     .expect("invalid declaration");
//! assert_eq!(plan.target.to_str(), Some("/opt/apache-tomcat/lib/sample.jar"));
//!
//! let steps = plan.into_execution_plan(fetcher);
//! declarative::execute_simple(vec![steps], Default::default()).unwrap();
//! ```

pub mod error;
pub mod fetch;
pub mod params;
pub mod plan;
pub mod request;
pub mod resources;
pub mod source;

pub use error::{JarError, Result};
pub use fetch::{DefaultFetcher, FetchError, Fetcher, RetryConfig};
pub use params::{JarParams, ParamValue, ServerDefaults};
pub use plan::{DeploymentPlan, Outcome, PathCollision, StageStep, check_collisions, deploy};
pub use request::{JarEnsure, JarLocation, JarRequest};
pub use resources::{FileEnsure, ManagedFile, StageArchive};
pub use source::Source;
