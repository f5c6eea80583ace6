//! Layered configuration loading.
//!
//! Sources, lowest precedence first: built-in defaults, the user file,
//! `ngac.toml`, `ngac.local.toml`, then `NGAC_*` environment variables.
//! Nested keys use a double underscore: `NGAC_ENGINE__TOLERATE_CYCLES=false`.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

use crate::{NgacConfig, Paths};

/// Builder for a layered [`NgacConfig`] load.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "NGAC".to_string(),
            include_user_config: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Ignores the per-user file, so the result depends only on the project
    /// directory and the environment.
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Existing configuration files, lowest precedence first.
    pub fn file_layers(&self) -> Vec<PathBuf> {
        let user = self
            .include_user_config
            .then(|| Paths::new().user_config_file().ok())
            .flatten();

        user.into_iter()
            .chain([
                Paths::project_config_file(&self.project_dir),
                Paths::local_config_file(&self.project_dir),
            ])
            .filter(|path| path.exists())
            .collect()
    }

    /// Merges every layer and validates the result.
    pub fn load(self) -> Result<NgacConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&NgacConfig::default())?);

        for path in self.file_layers() {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let merged: NgacConfig = builder
            .build()
            .context("failed to merge configuration sources")?
            .try_deserialize()
            .context("configuration does not match the expected schema")?;
        merged.validate()?;
        Ok(merged)
    }

    /// Like [`load`](Self::load), falling back to defaults on any error.
    pub fn load_or_default(self) -> NgacConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = tempdir().expect("temp dir");
        for (name, content) in files {
            fs::write(dir.path().join(name), content).expect("write config file");
        }
        dir
    }

    fn load_in(dir: &TempDir) -> Result<NgacConfig> {
        ConfigLoader::new()
            .with_project_dir(dir.path())
            .with_env_prefix("NGAC_LOADER_TEST")
            .without_user_config()
            .load()
    }

    #[test]
    fn test_empty_project_yields_defaults() {
        let dir = project(&[]);
        assert_eq!(load_in(&dir).unwrap(), NgacConfig::default());
    }

    #[test]
    fn test_project_file_applies() {
        let dir = project(&[(
            "ngac.toml",
            "[machine]\nuuid = \"hospital-pm\"\nname = \"hospital\"\n\n[engine]\ntolerate_cycles = false\n",
        )]);
        let config = load_in(&dir).unwrap();

        assert_eq!(config.machine.uuid.as_deref(), Some("hospital-pm"));
        assert_eq!(config.machine.name, "hospital");
        assert!(!config.engine.tolerate_cycles);
        assert!(config.engine.prefer_adapter_fast_paths);
    }

    #[test]
    fn test_local_file_wins_over_project_file() {
        let dir = project(&[
            ("ngac.toml", "[engine]\nprefer_adapter_fast_paths = true\n"),
            ("ngac.local.toml", "[engine]\nprefer_adapter_fast_paths = false\n"),
        ]);
        assert!(!load_in(&dir).unwrap().engine.prefer_adapter_fast_paths);
    }

    #[test]
    fn test_file_layers_in_precedence_order() {
        let dir = project(&[("ngac.local.toml", ""), ("ngac.toml", "")]);
        let loader = ConfigLoader::new()
            .with_project_dir(dir.path())
            .without_user_config();
        assert_eq!(
            loader.file_layers(),
            vec![dir.path().join("ngac.toml"), dir.path().join("ngac.local.toml")]
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = project(&[("ngac.toml", "[machine]\nname = \"\"\n")]);
        assert!(load_in(&dir).is_err());
        assert_eq!(
            ConfigLoader::new()
                .with_project_dir(dir.path())
                .without_user_config()
                .load_or_default(),
            NgacConfig::default()
        );
    }
}
