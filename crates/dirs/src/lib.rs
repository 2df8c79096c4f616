use std::env;
use std::ffi::OsString;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirError {
    #[error("Could not resolve the {0} directory. Set HOME or the matching XDG variable.")]
    Unresolved(String),
    #[error("IO error while preparing a directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type DirResult<T> = Result<T, DirError>;

/// Namespace used under every XDG base directory.
pub static APP_NAME: &str = "vigilant-dev";

/// The XDG base directories the tool reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirType {
    /// Saved figures and record tables.
    Data,
    /// `config.json` with pipeline defaults.
    Config,
    /// Downloaded encoder weights and cached embeddings.
    Cache,
}

impl Display for DirType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "~/{}/{}", self.rel_path(), APP_NAME)
    }
}

impl DirType {
    fn xdg_key(&self) -> &'static str {
        match self {
            DirType::Data => "XDG_DATA_HOME",
            DirType::Config => "XDG_CONFIG_HOME",
            DirType::Cache => "XDG_CACHE_HOME",
        }
    }

    fn rel_path(&self) -> &'static str {
        match self {
            DirType::Data => ".local/share",
            DirType::Config => ".config",
            DirType::Cache => ".cache",
        }
    }

    /// Pick the directory from an explicit XDG value or a home directory.
    ///
    /// An empty XDG value counts as unset.
    pub fn resolve(&self, xdg: Option<OsString>, home: Option<PathBuf>) -> DirResult<PathBuf> {
        match (xdg.filter(|v| !v.is_empty()), home) {
            (Some(base), _) => Ok(PathBuf::from(base).join(APP_NAME)),
            (None, Some(home)) => Ok(home.join(self.rel_path()).join(APP_NAME)),
            (None, None) => Err(DirError::Unresolved(self.to_string())),
        }
    }

    /// Resolve the directory from the process environment.
    #[allow(deprecated)]
    pub fn get_dir(&self) -> DirResult<PathBuf> {
        let home = env::home_dir()
            .or_else(|| env::var_os("HOME").map(PathBuf::from))
            .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from));
        self.resolve(env::var_os(self.xdg_key()), home)
    }

    /// Path of `name` inside this directory, without creating anything.
    pub fn file<P: AsRef<Path>>(&self, name: P) -> DirResult<PathBuf> {
        Ok(self.get_dir()?.join(name))
    }

    pub fn ensure_dir(&self) -> DirResult<PathBuf> {
        let dir = self.get_dir()?;
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub async fn ensure_dir_async(&self) -> DirResult<PathBuf> {
        let dir = self.get_dir()?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}
