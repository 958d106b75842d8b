//! Application context for CLI command execution.
//!
//! [`App`] resolves configuration, opens the storage backend once, and
//! hands out repositories bound to it.
//!
//! # Example
//!
//! ```no_run
//! use quarry::app::App;
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let app = App::from_directory(Path::new("."), None).await?;
//!     let mut tickets = app.repository("tickets").await?;
//!     println!("{} tickets", tickets.count().await?);
//!     Ok(())
//! }
//! ```

use crate::config::{EnvConfig, LayeredConfig, QuarryConfig, YamlConfig, find_config};
use crate::error::{BackendError, Error, ErrorContext, Operation, Result};
use crate::repository::Repository;
use crate::storage::{RowStorage, create_storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application context for CLI operations.
pub struct App {
    storage: Arc<dyn RowStorage>,
    config: QuarryConfig,
    /// Directory relative paths in the configuration resolve against.
    root_dir: PathBuf,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("root_dir", &self.root_dir)
            .field("config", &self.config)
            .field("storage", &"<dyn RowStorage>")
            .finish()
    }
}

impl App {
    /// Creates an App for `working_dir`.
    ///
    /// Uses `config_path` if given, else the nearest `quarry.yaml` up the
    /// directory tree, else defaults. `QUARRY_*` environment variables
    /// (and a `.env` file) override the file's scalar settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or is invalid,
    /// or if the storage backend cannot be opened.
    pub async fn from_directory(working_dir: &Path, config_path: Option<&Path>) -> Result<Self> {
        let (mut config, root_dir, yaml) = match find_config(working_dir, config_path) {
            Some(path) => {
                let content = tokio::fs::read_to_string(&path).await?;
                let root = path
                    .parent()
                    .map_or_else(|| working_dir.to_path_buf(), Path::to_path_buf);
                (
                    QuarryConfig::from_yaml(&content)?,
                    root,
                    YamlConfig::parse(&content)?,
                )
            }
            None => (
                QuarryConfig::default(),
                working_dir.to_path_buf(),
                YamlConfig::default(),
            ),
        };

        let provider = LayeredConfig::new().with(EnvConfig::load()).with(yaml);
        config.apply_overrides(&provider)?;
        Self::with_config(config, root_dir).await
    }

    /// Creates an App from an already resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unknown or cannot be opened.
    pub async fn with_config(config: QuarryConfig, root_dir: PathBuf) -> Result<Self> {
        let backend = config.storage.to_backend(&root_dir)?;
        tracing::debug!(?backend, tables = config.tables.len(), "opening storage");
        let storage = create_storage(backend, config.table_schemas())
            .await
            .map_err(open_error)?;
        Ok(Self {
            storage,
            config,
            root_dir,
        })
    }

    /// Opens a repository over `table`, named after its configured entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend does not know `table`.
    pub async fn repository(&self, table: &str) -> Result<Repository> {
        let entity = self
            .config
            .table(table)
            .map_or(table, |declared| declared.entity());
        Repository::open_with(
            Arc::clone(&self.storage),
            entity,
            table,
            self.config.repository_options(),
        )
        .await
    }

    /// The shared storage backend.
    pub fn storage(&self) -> &Arc<dyn RowStorage> {
        &self.storage
    }

    /// The resolved configuration.
    pub fn config(&self) -> &QuarryConfig {
        &self.config
    }

    /// Directory configuration paths resolve against.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Persists storage. Call after mutating commands.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot write.
    pub async fn save(&self) -> Result<()> {
        self.storage.save().await.map_err(open_error)
    }
}

fn open_error(source: BackendError) -> Error {
    Error::Storage {
        context: Box::new(ErrorContext::new("quarry", Operation::Open)),
        source,
    }
}
