//! Environment-driven configuration
//!
//! Only the variables git itself honours for locating repository pieces are
//! read here. Identity variables (`GIT_AUTHOR_*`, `GIT_COMMITTER_*`) are read
//! by `Signature::load_from_env`.

use std::path::PathBuf;

pub const GIT_DIR: &str = "GIT_DIR";
pub const GIT_OBJECT_DIRECTORY: &str = "GIT_OBJECT_DIRECTORY";
pub const GIT_ALTERNATE_OBJECT_DIRECTORIES: &str = "GIT_ALTERNATE_OBJECT_DIRECTORIES";
pub const GIT_INDEX_FILE: &str = "GIT_INDEX_FILE";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub git_dir: Option<PathBuf>,
    pub object_directory: Option<PathBuf>,
    pub alternate_object_directories: Vec<PathBuf>,
    pub index_file: Option<PathBuf>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self::from_lookup(|name| std::env::var_os(name).map(|value| value.to_string_lossy().into_owned()))
    }

    /// Build from any variable source, empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |name: &str| lookup(name).filter(|value| !value.is_empty()).map(PathBuf::from);

        Environment {
            git_dir: path(GIT_DIR),
            object_directory: path(GIT_OBJECT_DIRECTORY),
            alternate_object_directories: lookup(GIT_ALTERNATE_OBJECT_DIRECTORIES)
                .map(|value| {
                    value
                        .split(':')
                        .filter(|entry| !entry.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default(),
            index_file: path(GIT_INDEX_FILE),
        }
    }
}
