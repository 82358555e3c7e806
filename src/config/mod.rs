use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::gateway::document::document_path;
use crate::gateway::Principal;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Klartext";
const APP_NAME: &str = "klartext";

pub const CONFIG_ENV: &str = "KLARTEXT_CONFIG";
pub const DATA_ENV: &str = "KLARTEXT_DATA";
pub const FALLBACK_PRINCIPAL: &str = "local";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        Self::with_overrides(None, None)
    }

    /// Explicit paths win over the environment, which wins over XDG defaults.
    pub fn with_overrides(config: Option<PathBuf>, data: Option<PathBuf>) -> Result<Self> {
        let paths = ConfigPaths::discover(config, data)?;
        Ok(Self { paths })
    }

    pub fn from_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            self.write_default_config(&default_cfg)?;
            default_cfg.post_load(&self.paths);
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths);
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        tracing::info!(path = %self.paths.config_file.display(), "wrote default config");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub document_path: PathBuf,
    pub uploads_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover(config: Option<PathBuf>, data: Option<PathBuf>) -> Result<Self> {
        let override_config = config.or_else(|| env::var(CONFIG_ENV).ok().map(PathBuf::from));
        let override_data = data.or_else(|| env::var(DATA_ENV).ok().map(PathBuf::from));

        let project_dirs = || {
            ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
                .context("resolving XDG project directories")
        };

        let config_file = match override_config {
            Some(p) if p.is_dir() => p.join("config.toml"),
            Some(p) => p,
            None => project_dirs()?.config_dir().join("config.toml"),
        };
        let data_dir = match override_data {
            Some(p) => p,
            None => project_dirs()?.data_dir().to_path_buf(),
        };

        Ok(Self::rooted(config_file, data_dir))
    }

    /// Lays out every path under `data_dir`, next to `config_file`.
    pub fn rooted(config_file: PathBuf, data_dir: PathBuf) -> Self {
        let config_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_dir.clone());
        Self {
            config_dir,
            config_file,
            database_path: data_dir.join("klartext.db"),
            document_path: document_path(&data_dir),
            uploads_dir: data_dir.join("uploads"),
            data_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    /// Single JSON document, no server-side scoping.
    Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: Backend,
    /// Empty disables every mutation.
    pub principal: String,
    pub storage: StorageOptions,
    pub attachments: AttachmentOptions,
    pub list: ListOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            principal: default_principal(),
            storage: StorageOptions::default(),
            attachments: AttachmentOptions::default(),
            list: ListOptions::default(),
        }
    }
}

impl AppConfig {
    pub fn principal(&self) -> Option<Principal> {
        let id = self.principal.trim();
        (!id.is_empty()).then(|| Principal::new(id))
    }

    fn post_load(&mut self, paths: &ConfigPaths) {
        self.storage.resolve(paths);
        if self.attachments.directory.as_os_str().is_empty() {
            self.attachments.directory = paths.uploads_dir.clone();
        }
        if self.list.limit == 0 {
            tracing::warn!("list.limit of 0 in config, using the default");
            self.list.limit = ListOptions::default().limit;
        }
    }
}

fn default_principal() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_PRINCIPAL.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    #[serde(skip)]
    pub document_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            document_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        if self.document_path.as_os_str().is_empty() {
            self.document_path = paths.document_path.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentOptions {
    pub enabled: bool,
    /// URL prefix for stored files; `file://<uploads dir>` when unset.
    pub public_base: Option<String>,
    #[serde(skip)]
    pub directory: PathBuf,
}

impl Default for AttachmentOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            public_base: None,
            directory: PathBuf::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    pub limit: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self { limit: 50 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader(temp: &TempDir) -> ConfigLoader {
        ConfigLoader::from_paths(ConfigPaths::rooted(
            temp.path().join("config").join("config.toml"),
            temp.path().join("data"),
        ))
    }

    #[test]
    fn first_run_writes_defaults_and_reloads_them() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = loader(&temp);

        let created = loader.load_or_init()?;
        assert!(loader.paths().config_file.exists());
        assert!(loader.paths().data_dir.is_dir());
        assert_eq!(created.backend, Backend::Sqlite);
        assert!(created.principal().is_some());

        let reloaded = loader.load()?;
        assert_eq!(reloaded, created);
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_sections() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = loader(&temp);
        loader.paths().ensure_directories()?;
        fs::write(
            &loader.paths().config_file,
            "backend = \"document\"\nprincipal = \"\"\n\n[list]\nlimit = 5\n",
        )?;

        let cfg = loader.load_or_init()?;
        assert_eq!(cfg.backend, Backend::Document);
        assert_eq!(cfg.principal(), None);
        assert_eq!(cfg.list.limit, 5);
        assert_eq!(cfg.storage.wal_autocheckpoint, 1000);
        assert!(cfg.attachments.enabled);
        Ok(())
    }

    #[test]
    fn resolves_storage_paths_under_data_dir() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let cfg = loader(&temp).load_or_init()?;
        let data = temp.path().join("data");
        assert_eq!(cfg.storage.database_path, data.join("klartext.db"));
        assert!(cfg.storage.document_path.starts_with(&data));
        assert_eq!(cfg.attachments.directory, data.join("uploads"));
        Ok(())
    }

    #[test]
    fn rejects_unknown_backend() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = loader(&temp);
        loader.paths().ensure_directories()?;
        fs::write(&loader.paths().config_file, "backend = \"cloud\"\n")?;
        assert!(loader.load().is_err());
        Ok(())
    }

    #[test]
    fn explicit_directory_override_gets_config_file_name() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::discover(
            Some(temp.path().to_path_buf()),
            Some(temp.path().join("data")),
        )?;
        assert_eq!(paths.config_file, temp.path().join("config.toml"));
        assert_eq!(paths.config_dir, temp.path());
        Ok(())
    }
}
