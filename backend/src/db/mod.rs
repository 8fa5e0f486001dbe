//! Database module for press cycle storage.
//!
//! Storage is accessed through repository traits so the backend can be
//! swapped without touching the accounting logic.
//!
//! # Layers
//!
//! ```text
//!   services::PressService ── validation, sagas, per-press locks
//!            │
//!   repository::{Cycle,Tool,Regeneration}Repository ── async traits
//!            │
//!   ┌────────┴─────────┐
//!   LocalRepository    PostgresRepository
//!   (memory, tests)    (Diesel + r2d2, feature "postgres-repo")
//! ```
//!
//! # Opening a repository
//!
//! ```ignore
//! use pgpress::db::RepositoryFactory;
//! use pgpress::services::PressService;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = RepositoryFactory::from_default_config().await?;
//!     let service = PressService::new(repo);
//!     let cycles = service.list_cycles_for_press(3, Some(50), None).await?;
//!     Ok(())
//! }
//! ```

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;

#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::{PoolStats, PostgresConfig};
// Stand-ins so factory signatures stay the same with Postgres compiled out.
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    _private: (),
}

pub use factory::{RepositoryFactory, RepositoryType};
pub use repo_config::{AccountingSettings, RepositoryConfig};
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    CycleRepository, ErrorContext, FullRepository, RegenerationRepository, RepositoryError,
    RepositoryResult, ToolRepository,
};

use anyhow::{Context, Result};
use std::sync::{Arc, OnceLock};
#[cfg(feature = "postgres-repo")]
use tokio::runtime::Runtime;

static REPOSITORY: OnceLock<Arc<dyn FullRepository>> = OnceLock::new();

#[cfg(feature = "postgres-repo")]
fn open_from_env() -> Result<Arc<dyn FullRepository>> {
    let runtime = Runtime::new().context("creating a runtime to open the repository")?;
    runtime
        .block_on(RepositoryFactory::from_env())
        .context("opening the repository named by the environment")
}

#[cfg(not(feature = "postgres-repo"))]
fn open_from_env() -> Result<Arc<dyn FullRepository>> {
    Ok(RepositoryFactory::create_local())
}

/// Open the process-wide repository if it is not open yet.
///
/// The backend comes from `REPOSITORY_TYPE` / `DATABASE_URL`; see
/// [`RepositoryType::from_env`]. Must not be called from inside a tokio
/// runtime when the Postgres backend is enabled.
pub fn init_repository() -> Result<()> {
    if REPOSITORY.get().is_none() {
        let repo = open_from_env()?;
        // Losing a race to another initializer keeps the winner's repository.
        let _ = REPOSITORY.set(repo);
    }
    Ok(())
}

/// The process-wide repository, opened on first use.
pub fn get_repository() -> Result<&'static Arc<dyn FullRepository>> {
    init_repository()?;
    REPOSITORY
        .get()
        .context("repository missing after initialization")
}
