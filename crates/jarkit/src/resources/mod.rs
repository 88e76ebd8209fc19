//! Filesystem resources a deployment plan is made of
//!
//! - [`StageArchive`]: fetch content into the target path
//! - [`ManagedFile`]: enforce ownership/mode, or absence, of one path

pub mod archive;
pub mod file;
pub mod owner;

pub use archive::{StageArchive, verify_jar};
pub use file::{FileEnsure, JAR_MODE, ManagedFile};
