//! Engine configuration loaded from environment variables.

use std::env;

use anyhow::Result;

/// Repository configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (PostgreSQL) or path (SQLite)
    /// For SQLite: use DATABASE_PATH or DATABASE_URL with sqlite:// prefix
    pub database_url: String,

    /// Catalog table, optionally schema-qualified
    pub table: String,

    /// Repository-wide mask predicate applied to every query
    pub repo_filter: Option<String>,

    /// Path to the queryable mapping document (JSON)
    pub mappings_path: Option<String>,

    /// Maximum connection pool size
    pub max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        // For SQLite, prefer DATABASE_URL, fall back to DATABASE_PATH
        #[cfg(feature = "sqlite")]
        let database_url = env::var("DATABASE_URL")
            .or_else(|_| env::var("DATABASE_PATH").map(|p| format!("sqlite://{p}")))
            .unwrap_or_else(|_| "sqlite://./data/catalog.db".to_string());

        #[cfg(feature = "postgres")]
        let database_url = {
            use anyhow::Context;
            env::var("DATABASE_URL").context("DATABASE_URL is required")?
        };

        Ok(Self {
            database_url,
            table: env::var("CATALOG_TABLE").unwrap_or_else(|_| "records".to_string()),
            repo_filter: env::var("CATALOG_REPO_FILTER").ok().filter(|s| !s.is_empty()),
            mappings_path: env::var("CATALOG_MAPPINGS").ok(),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        })
    }

    /// Configuration pointing at an explicit database URL and table, for
    /// embedding and tests.
    pub fn for_database(database_url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            table: table.into(),
            repo_filter: None,
            mappings_path: None,
            max_connections: 10,
        }
    }

    /// Scope every query of this repository with a fixed mask predicate.
    pub fn with_repo_filter(mut self, filter: impl Into<String>) -> Self {
        self.repo_filter = Some(filter.into());
        self
    }
}
