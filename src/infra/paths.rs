// src/infra/paths.rs — Config and data locations
//
// OUROBOROS_HOME, when set, holds both config and data. Otherwise config
// lives in ~/.ouroboros/ and data in the platform data dir.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<Option<ProjectDirs>> = OnceLock::new();

fn project_dirs() -> Option<&'static ProjectDirs> {
    PROJECT_DIRS
        .get_or_init(|| ProjectDirs::from("", "", "ouroboros"))
        .as_ref()
}

fn ouroboros_home() -> Option<PathBuf> {
    std::env::var_os("OUROBOROS_HOME").map(PathBuf::from)
}

/// Home directory, or the working directory when none can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// $OUROBOROS_HOME/ or ~/.ouroboros/
pub fn config_dir() -> PathBuf {
    if let Some(home) = ouroboros_home() {
        return home;
    }
    dirs_home().join(".ouroboros")
}

/// $OUROBOROS_HOME/data/ or the platform-local data dir.
pub fn data_dir() -> PathBuf {
    if let Some(home) = ouroboros_home() {
        return home.join("data");
    }
    match project_dirs() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

pub fn db_path() -> PathBuf {
    data_dir().join("skills.db")
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_and_config_are_distinct() {
        assert_ne!(db_path(), config_file_path());
        assert!(db_path().ends_with("skills.db"));
        assert!(config_file_path().ends_with("config.toml"));
    }
}
