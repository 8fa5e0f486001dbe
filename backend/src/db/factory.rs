//! Backend selection.
//!
//! A backend is picked by [`RepositoryType`], from the environment or from a
//! `repository.toml`, and handed out as `Arc<dyn FullRepository>`.

use log::{info, warn};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::repo_config::RepositoryConfig;
use super::repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
use super::repositories::PostgresRepository;
use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use super::PostgresConfig;

/// Explicit backend override.
pub const REPOSITORY_TYPE_ENV: &str = "REPOSITORY_TYPE";

/// Either of these selects Postgres when no override is set.
pub const DATABASE_URL_ENVS: [&str; 2] = ["DATABASE_URL", "PG_DATABASE_URL"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Diesel over a pooled Postgres connection
    Postgres,
    /// In-memory maps, lost on exit
    Local,
}

impl RepositoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryType::Postgres => "postgres",
            RepositoryType::Local => "local",
        }
    }

    /// Backend chosen by the environment.
    ///
    /// `REPOSITORY_TYPE` wins when set; an unparsable value falls back to
    /// [`RepositoryType::Local`]. Otherwise a database URL selects Postgres.
    pub fn from_env() -> Self {
        if let Ok(value) = std::env::var(REPOSITORY_TYPE_ENV) {
            return value.parse().unwrap_or_else(|e| {
                warn!("{}; using the local repository", e);
                Self::Local
            });
        }

        if DATABASE_URL_ENVS
            .iter()
            .any(|name| std::env::var(name).is_ok())
        {
            Self::Postgres
        } else {
            Self::Local
        }
    }
}

impl FromStr for RepositoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "local" | "memory" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds repositories.
///
/// # Example
/// ```ignore
/// use pgpress::db::{PostgresConfig, RepositoryFactory, RepositoryType};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = PostgresConfig::from_env()?;
///     let ledger = RepositoryFactory::create(RepositoryType::Postgres, Some(&config)).await?;
///     assert!(ledger.health_check().await?);
///     Ok(())
/// }
/// ```
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Open a backend of `repo_type`. Postgres needs `postgres_config`.
    pub async fn create(
        repo_type: RepositoryType,
        postgres_config: Option<&PostgresConfig>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        Self::open(repo_type, || Ok(postgres_config.cloned())).await
    }

    /// Open a Postgres backend, running pending migrations.
    #[cfg(feature = "postgres-repo")]
    pub async fn create_postgres(
        config: &PostgresConfig,
    ) -> RepositoryResult<Arc<PostgresRepository>> {
        let config = config.clone();
        let repo = tokio::task::spawn_blocking(move || PostgresRepository::new(config))
            .await
            .map_err(|e| RepositoryError::internal(format!("Task join error: {}", e)))??;
        Ok(Arc::new(repo))
    }

    pub fn create_local() -> Arc<dyn FullRepository> {
        Arc::new(LocalRepository::new())
    }

    /// Open the backend named by the environment (see [`RepositoryType::from_env`]).
    pub async fn from_env() -> RepositoryResult<Arc<dyn FullRepository>> {
        Self::open(RepositoryType::from_env(), postgres_config_from_env).await
    }

    pub async fn from_config_file<P: AsRef<Path>>(
        config_path: P,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        let config = RepositoryConfig::from_file(config_path)?;
        Self::from_repository_config(&config).await
    }

    /// Open the backend described by the first `repository.toml` found
    /// (see [`RepositoryConfig::from_default_location`]).
    pub async fn from_default_config() -> RepositoryResult<Arc<dyn FullRepository>> {
        let config = RepositoryConfig::from_default_location()?;
        Self::from_repository_config(&config).await
    }

    pub async fn from_repository_config(
        config: &RepositoryConfig,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        Self::open(config.repository_type()?, || config.to_postgres_config()).await
    }

    /// `postgres` is only consulted for a Postgres backend.
    async fn open(
        repo_type: RepositoryType,
        postgres: impl FnOnce() -> RepositoryResult<Option<PostgresConfig>>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        let repo = match repo_type {
            RepositoryType::Local => Self::create_local(),
            RepositoryType::Postgres => Self::open_postgres(postgres()?).await?,
        };
        info!("Opened {} repository", repo_type);
        Ok(repo)
    }

    #[cfg(feature = "postgres-repo")]
    async fn open_postgres(
        config: Option<PostgresConfig>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        let config = config.ok_or_else(|| {
            RepositoryError::configuration("Postgres repository requires PostgresConfig")
        })?;
        let repo = Self::create_postgres(&config).await?;
        Ok(repo as Arc<dyn FullRepository>)
    }

    #[cfg(not(feature = "postgres-repo"))]
    async fn open_postgres(
        _config: Option<PostgresConfig>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        Err(RepositoryError::configuration(
            "Postgres repository feature not enabled",
        ))
    }
}

#[cfg(feature = "postgres-repo")]
fn postgres_config_from_env() -> RepositoryResult<Option<PostgresConfig>> {
    PostgresConfig::from_env()
        .map(Some)
        .map_err(RepositoryError::configuration)
}

#[cfg(not(feature = "postgres-repo"))]
fn postgres_config_from_env() -> RepositoryResult<Option<PostgresConfig>> {
    Ok(None)
}
