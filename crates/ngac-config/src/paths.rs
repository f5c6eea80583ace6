//! Configuration file locations.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::ConfigError;

/// File name of the shared project configuration.
pub const PROJECT_CONFIG_FILE: &str = "ngac.toml";

/// File name of the uncommitted, machine-local overrides.
pub const LOCAL_CONFIG_FILE: &str = "ngac.local.toml";

/// Platform configuration directories (XDG on Linux).
#[derive(Debug, Clone)]
pub struct Paths {
    dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            dirs: ProjectDirs::from("org", "NGAC", "ngac"),
        }
    }

    /// Per-user configuration directory, e.g. `~/.config/ngac`.
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.dirs {
            Some(dirs) => Ok(dirs.config_dir().to_path_buf()),
            None => Err(ConfigError::XdgError(
                "no home directory to place user configuration in".to_string(),
            )),
        }
    }

    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        self.user_config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(PROJECT_CONFIG_FILE)
    }

    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(LOCAL_CONFIG_FILE)
    }

    /// Whether the directory carries a project configuration file.
    pub fn is_initialized(project_dir: impl AsRef<Path>) -> bool {
        Self::project_config_file(project_dir).is_file()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_user_file_lives_in_user_dir() {
        let paths = Paths::new();
        // Headless CI runners may have no home directory.
        if let (Ok(dir), Ok(file)) = (paths.user_config_dir(), paths.user_config_file()) {
            assert!(file.starts_with(&dir));
            assert!(dir.to_string_lossy().contains("ngac"));
        }
    }

    #[test]
    fn test_project_files_and_initialization() {
        let dir = tempdir().expect("temp dir");
        let root = dir.path();

        assert_eq!(Paths::project_config_file(root), root.join(PROJECT_CONFIG_FILE));
        assert_eq!(Paths::local_config_file(root), root.join(LOCAL_CONFIG_FILE));
        assert!(!Paths::is_initialized(root));

        std::fs::write(Paths::project_config_file(root), "").expect("write config");
        assert!(Paths::is_initialized(root));
    }
}
