//! Configuration for quarry.
//!
//! Settings come from a `quarry.yaml` file ([`QuarryConfig`]) and may be
//! overridden key by key through a [`ConfigProvider`]. Keys are dot paths
//! such as `repository.per-page`; [`EnvConfig`] maps them to
//! `QUARRY_REPOSITORY_PER_PAGE`.
//!
//! ```yaml
//! repository:
//!   per-page: 25
//!   page-name: page
//!   reset-relations: false
//! storage:
//!   backend: jsonl
//!   data-dir: .quarry
//! tables:
//!   - name: tickets
//!     entity: support::Ticket
//!     timestamps: true
//!     relations:
//!       - name: comments
//!         table: comments
//!         foreign-key: ticket_id
//!     scopes:
//!       - name: open
//!         where:
//!           - { column: status, value: open }
//! ```

use crate::error::{Error, Result};
use crate::query::ResetPolicy;
use crate::repository::{DEFAULT_PAGE_NAME, DEFAULT_PER_PAGE, RepositoryOptions};
use crate::storage::{Relation, ScopeDefinition, StorageBackend, TableSchema};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "quarry.yaml";

/// Default JSONL data directory, relative to the configuration file.
pub const DEFAULT_DATA_DIR: &str = ".quarry";

/// Prefix of environment variables read by [`EnvConfig`].
pub const ENV_PREFIX: &str = "QUARRY_";

/// A source of string settings addressed by dot-path keys.
pub trait ConfigProvider: Send + Sync {
    /// Returns the value for `key`, if this source has one.
    fn get(&self, key: &str) -> Option<String>;
}

static DOTENV_LOADED: OnceLock<bool> = OnceLock::new();

/// Settings from the process environment and an optional `.env` file.
///
/// The `.env` file is read at most once per process. Variables already
/// set in the environment take precedence over the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl EnvConfig {
    /// Creates the provider, loading `.env` on first use.
    #[must_use]
    pub fn load() -> Self {
        DOTENV_LOADED.get_or_init(|| dotenvy::dotenv().is_ok());
        Self
    }

    /// Environment variable name for a dot-path key.
    #[must_use]
    pub fn var_name(key: &str) -> String {
        let mut name = String::from(ENV_PREFIX);
        name.extend(key.chars().map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        }));
        name
    }
}

impl ConfigProvider for EnvConfig {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(Self::var_name(key))
            .ok()
            .filter(|value| !value.is_empty())
    }
}

/// Settings looked up by dot path in a YAML document.
#[derive(Debug, Clone, Default)]
pub struct YamlConfig {
    root: serde_yaml::Value,
}

impl YamlConfig {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `source` is not valid YAML.
    pub fn parse(source: &str) -> Result<Self> {
        let root = serde_yaml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { root })
    }
}

impl ConfigProvider for YamlConfig {
    fn get(&self, key: &str) -> Option<String> {
        let mut node = &self.root;
        for segment in key.split('.') {
            node = node.get(segment)?;
        }
        match node {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Providers consulted in order; the first one with a value wins.
#[derive(Default)]
pub struct LayeredConfig {
    layers: Vec<Box<dyn ConfigProvider>>,
}

impl LayeredConfig {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider below the existing ones.
    #[must_use]
    pub fn with(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.layers.push(Box::new(provider));
        self
    }
}

impl ConfigProvider for LayeredConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}

/// Repository section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct RepositoryConfig {
    /// Page size when a page request gives none.
    pub per_page: usize,
    /// Page parameter name.
    pub page_name: String,
    /// Whether executions also clear eager-load relations.
    pub reset_relations: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            page_name: DEFAULT_PAGE_NAME.to_string(),
            reset_relations: false,
        }
    }
}

/// Storage section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    /// Backend type: `memory` or `jsonl`.
    pub backend: String,
    /// JSONL directory, relative to the configuration file.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "jsonl".to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
        }
    }
}

impl StorageConfig {
    /// Resolves the backend, with `data-dir` taken relative to `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown backend name.
    pub fn to_backend(&self, base_dir: &Path) -> Result<StorageBackend> {
        match self.backend.as_str() {
            "memory" | "in-memory" => Ok(StorageBackend::InMemory),
            "jsonl" => Ok(StorageBackend::Jsonl(base_dir.join(&self.data_dir))),
            other => Err(Error::Config(format!(
                "Unknown storage backend '{other}' (expected 'memory' or 'jsonl')"
            ))),
        }
    }
}

/// One table declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct TableConfig {
    /// Table name.
    pub name: String,
    /// Entity name for error reporting; defaults to the table name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Maintain `created_at` / `updated_at`.
    #[serde(default)]
    pub timestamps: bool,
    /// Eager-loadable relations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<Relation>,
    /// Named scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<ScopeDefinition>,
}

impl TableConfig {
    /// Entity name used by repositories over this table.
    #[must_use]
    pub fn entity(&self) -> &str {
        self.entity.as_deref().unwrap_or(&self.name)
    }

    /// Converts the declaration into a storage schema.
    #[must_use]
    pub fn to_schema(&self) -> TableSchema {
        let mut schema = TableSchema::new(self.name.clone()).with_timestamps(self.timestamps);
        for relation in &self.relations {
            schema = schema.with_relation(
                relation.name.clone(),
                relation.table.clone(),
                relation.foreign_key.clone(),
            );
        }
        for scope in &self.scopes {
            schema = schema.with_scope_definition(scope.clone());
        }
        schema
    }
}

/// The `quarry.yaml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct QuarryConfig {
    /// Repository defaults.
    pub repository: RepositoryConfig,
    /// Storage backend.
    pub storage: StorageConfig,
    /// Declared tables.
    pub tables: Vec<TableConfig>,
}

impl QuarryConfig {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the YAML is invalid.
    pub fn from_yaml(source: &str) -> Result<Self> {
        serde_yaml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    /// Loads configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    /// Saves configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Applies overrides for the scalar settings from `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an override does not parse.
    pub fn apply_overrides(&mut self, provider: &dyn ConfigProvider) -> Result<()> {
        if let Some(value) = provider.get("repository.per-page") {
            self.repository.per_page = parse_setting("repository.per-page", &value)?;
        }
        if let Some(value) = provider.get("repository.page-name") {
            self.repository.page_name = value;
        }
        if let Some(value) = provider.get("repository.reset-relations") {
            self.repository.reset_relations = parse_setting("repository.reset-relations", &value)?;
        }
        if let Some(value) = provider.get("storage.backend") {
            self.storage.backend = value;
        }
        if let Some(value) = provider.get("storage.data-dir") {
            self.storage.data_dir = value;
        }
        Ok(())
    }

    /// Repository options derived from the repository section.
    #[must_use]
    pub fn repository_options(&self) -> RepositoryOptions {
        RepositoryOptions {
            reset_policy: if self.repository.reset_relations {
                ResetPolicy::Uniform
            } else {
                ResetPolicy::KeepRelations
            },
            per_page: self.repository.per_page.max(1),
            page_name: self.repository.page_name.clone(),
        }
    }

    /// Storage schemas for every declared table.
    #[must_use]
    pub fn table_schemas(&self) -> Vec<TableSchema> {
        self.tables.iter().map(TableConfig::to_schema).collect()
    }

    /// The declaration for `name`, if any.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value '{value}' for {key}")))
}

/// Finds the configuration file: `explicit` if given, else
/// [`CONFIG_FILE_NAME`] in `working_dir` or the nearest ancestor.
#[must_use]
pub fn find_config(working_dir: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(working_dir.join(path));
    }
    working_dir
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct MapConfig(BTreeMap<&'static str, &'static str>);

    impl ConfigProvider for MapConfig {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).map(ToString::to_string)
        }
    }

    const SAMPLE: &str = r"
repository:
  per-page: 10
storage:
  backend: memory
tables:
  - name: tickets
    entity: support::Ticket
    timestamps: true
    relations:
      - name: comments
        table: comments
        foreign-key: ticket_id
    scopes:
      - name: open
        where:
          - { column: status, value: open }
  - name: comments
";

    #[test]
    fn parses_tables_and_defaults() {
        let config = QuarryConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.repository.per_page, 10);
        assert_eq!(config.repository.page_name, DEFAULT_PAGE_NAME);
        assert_eq!(config.tables.len(), 2);

        let tickets = config.table("tickets").unwrap();
        assert_eq!(tickets.entity(), "support::Ticket");
        let schema = tickets.to_schema();
        assert!(schema.timestamps);
        assert_eq!(schema.relations.len(), 1);
        assert!(schema.scopes.contains("open"));

        assert_eq!(config.table("comments").unwrap().entity(), "comments");
    }

    #[rstest]
    #[case("repository.per-page", "QUARRY_REPOSITORY_PER_PAGE")]
    #[case("storage.data-dir", "QUARRY_STORAGE_DATA_DIR")]
    fn env_var_names(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(EnvConfig::var_name(key), expected);
    }

    #[test]
    fn yaml_provider_reads_dot_paths() {
        let yaml = YamlConfig::parse(SAMPLE).unwrap();
        assert_eq!(yaml.get("repository.per-page").as_deref(), Some("10"));
        assert_eq!(yaml.get("storage.backend").as_deref(), Some("memory"));
        assert_eq!(yaml.get("storage.missing"), None);
        assert_eq!(yaml.get("tables"), None);
    }

    #[test]
    fn first_layer_wins() {
        let layered = LayeredConfig::new()
            .with(MapConfig(BTreeMap::from([("storage.backend", "jsonl")])))
            .with(YamlConfig::parse(SAMPLE).unwrap());
        assert_eq!(layered.get("storage.backend").as_deref(), Some("jsonl"));
        assert_eq!(layered.get("repository.per-page").as_deref(), Some("10"));
    }

    #[test]
    fn overrides_are_validated() {
        let mut config = QuarryConfig::default();
        config
            .apply_overrides(&MapConfig(BTreeMap::from([
                ("repository.per-page", "50"),
                ("repository.reset-relations", "true"),
            ])))
            .unwrap();
        let options = config.repository_options();
        assert_eq!(options.per_page, 50);
        assert_eq!(options.reset_policy, ResetPolicy::Uniform);

        let err = config
            .apply_overrides(&MapConfig(BTreeMap::from([("repository.per-page", "many")])))
            .unwrap_err();
        assert!(err.to_string().contains("repository.per-page"));
    }

    #[test]
    fn backend_resolution() {
        let base = Path::new("/srv/app");
        let storage = StorageConfig::default();
        assert_eq!(
            storage.to_backend(base).unwrap(),
            StorageBackend::Jsonl(base.join(DEFAULT_DATA_DIR))
        );
        let bad = StorageConfig {
            backend: "postgres".to_string(),
            ..StorageConfig::default()
        };
        assert!(bad.to_backend(base).is_err());
    }

    #[tokio::test]
    async fn save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = QuarryConfig::from_yaml(SAMPLE).unwrap();

        config.save(&path).await.unwrap();
        let loaded = QuarryConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(find_config(dir.path(), None), Some(path));
    }
}
