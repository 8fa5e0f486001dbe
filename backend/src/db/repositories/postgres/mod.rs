//! Postgres repository implementation using Diesel.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Connection health monitoring
//! - Automatic migration execution
//! - Multi-row updates (binding, press assignment) in a single transaction
//!
//! Failed statements are never retried; the error is returned with the
//! operation name attached.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)

use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

use crate::db::repository::{
    CycleRepository, ErrorContext, RegenerationRepository, RepositoryError, RepositoryResult,
    ToolRepository,
};
use crate::models::{
    CycleId, CycleRecord, NewCycle, NewRegeneration, NewTool, Position, PressNumber,
    Regeneration, RegenerationId, Tool, ToolId, UserId,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    ///
    /// See the module documentation for the variables read.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", 10),
            min_pool_size: env_or("PG_POOL_MIN", 1),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", 30),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", 600),
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Pool health statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of connections currently in use
    pub connections_in_use: u32,
    /// Number of idle connections
    pub idle_connections: u32,
    /// Maximum pool size
    pub max_size: u32,
    /// Total statements executed
    pub total_queries: u64,
    /// Total failed statements
    pub failed_queries: u64,
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
    total_queries: Arc<AtomicU64>,
    failed_queries: Arc<AtomicU64>,
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

fn tool_not_found(id: ToolId, operation: &str) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!("Tool {} not found", id),
        ErrorContext::new(operation)
            .with_entity("tools")
            .with_entity_id(id),
    )
}

fn cycle_not_found(id: CycleId, operation: &str) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!("Press cycle {} not found", id),
        ErrorContext::new(operation)
            .with_entity("press_cycles")
            .with_entity_id(id),
    )
}

fn lock_tool(conn: &mut PgConnection, id: ToolId, operation: &str) -> RepositoryResult<ToolRow> {
    tools::table
        .find(id.value())
        .select(ToolRow::as_select())
        .for_update()
        .get_result::<ToolRow>(conn)
        .optional()
        .map_err(map_diesel_error)?
        .ok_or_else(|| tool_not_found(id, operation))
}

fn set_press(conn: &mut PgConnection, id: i64, press: Option<i16>) -> RepositoryResult<usize> {
    diesel::update(tools::table.find(id))
        .set(tools::press.eq(press))
        .execute(conn)
        .map_err(map_diesel_error)
}

fn set_binding(conn: &mut PgConnection, id: i64, binding: Option<i64>) -> RepositoryResult<usize> {
    diesel::update(tools::table.find(id))
        .set(tools::binding.eq(binding))
        .execute(conn)
        .map_err(map_diesel_error)
}

fn decode_cycles(rows: Vec<CycleRow>) -> RepositoryResult<Vec<CycleRecord>> {
    rows.into_iter().map(CycleRow::into_record).collect()
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    ///
    /// # Returns
    /// * `Ok(PostgresRepository)` on success
    /// * `Err(RepositoryError)` if connection or migration fails
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self {
            pool,
            config,
            total_queries: Arc::new(AtomicU64::new(0)),
            failed_queries: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run pending database migrations.
    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Run `f` on a pooled connection inside `spawn_blocking`.
    ///
    /// Errors are tagged with `operation` and returned as-is.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();

        task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| {
                failed_queries.fetch_add(1, Ordering::Relaxed);
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new(operation).with_details("get_connection"),
                )
            })?;

            total_queries.fetch_add(1, Ordering::Relaxed);
            f(&mut conn).map_err(|e| {
                failed_queries.fetch_add(1, Ordering::Relaxed);
                e.with_context(ErrorContext::new(operation))
            })
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new(operation).with_details("spawn_blocking"),
            )
        })?
    }

    /// Get pool health statistics.
    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
        }
    }

    /// Check if the database connection is healthy.
    pub async fn is_healthy(&self) -> bool {
        self.health_check().await.unwrap_or(false)
    }
}

#[async_trait]
impl CycleRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn("health_check", |conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn insert_cycle(
        &self,
        press: PressNumber,
        cycle: NewCycle,
        performed_by: UserId,
    ) -> RepositoryResult<CycleRecord> {
        let values = CycleValuesRow::from_model(press, &cycle, performed_by);
        self.with_conn("insert_cycle", move |conn| {
            diesel::insert_into(press_cycles::table)
                .values(&values)
                .returning(CycleRow::as_returning())
                .get_result::<CycleRow>(conn)
                .map_err(map_diesel_error)?
                .into_record()
        })
        .await
    }

    async fn get_cycle(&self, id: CycleId) -> RepositoryResult<CycleRecord> {
        self.with_conn("get_cycle", move |conn| {
            press_cycles::table
                .find(id.value())
                .select(CycleRow::as_select())
                .first::<CycleRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| cycle_not_found(id, "get_cycle"))?
                .into_record()
        })
        .await
    }

    async fn list_cycles_for_tool(&self, tool_id: ToolId) -> RepositoryResult<Vec<CycleRecord>> {
        self.with_conn("list_cycles_for_tool", move |conn| {
            let rows = press_cycles::table
                .filter(press_cycles::tool_id.eq(tool_id.value()))
                .order((press_cycles::date.desc(), press_cycles::id.desc()))
                .select(CycleRow::as_select())
                .load::<CycleRow>(conn)
                .map_err(map_diesel_error)?;
            decode_cycles(rows)
        })
        .await
    }

    async fn list_cycles_for_press(
        &self,
        press: PressNumber,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<CycleRecord>> {
        self.with_conn("list_cycles_for_press", move |conn| {
            let mut query = press_cycles::table
                .filter(press_cycles::press_number.eq(press.value()))
                .order((press_cycles::date.desc(), press_cycles::id.desc()))
                .select(CycleRow::as_select())
                .into_boxed();
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            if let Some(offset) = offset {
                query = query.offset(offset);
            }
            let rows = query.load::<CycleRow>(conn).map_err(map_diesel_error)?;
            decode_cycles(rows)
        })
        .await
    }

    async fn update_cycle(
        &self,
        id: CycleId,
        press: PressNumber,
        cycle: NewCycle,
        performed_by: UserId,
    ) -> RepositoryResult<CycleRecord> {
        let values = CycleValuesRow::from_model(press, &cycle, performed_by);
        self.with_conn("update_cycle", move |conn| {
            diesel::update(press_cycles::table.find(id.value()))
                .set(&values)
                .returning(CycleRow::as_returning())
                .get_result::<CycleRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| cycle_not_found(id, "update_cycle"))?
                .into_record()
        })
        .await
    }

    async fn delete_cycle(&self, id: CycleId) -> RepositoryResult<()> {
        self.with_conn("delete_cycle", move |conn| {
            let deleted = diesel::delete(press_cycles::table.find(id.value()))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if deleted == 0 {
                return Err(cycle_not_found(id, "delete_cycle"));
            }
            Ok(())
        })
        .await
    }

    async fn previous_slot_total(
        &self,
        press: PressNumber,
        position: Position,
        before: CycleId,
    ) -> RepositoryResult<Option<i64>> {
        self.with_conn("previous_slot_total", move |conn| {
            press_cycles::table
                .filter(press_cycles::press_number.eq(press.value()))
                .filter(press_cycles::tool_position.eq(position.as_str()))
                .filter(press_cycles::id.lt(before.value()))
                .order(press_cycles::id.desc())
                .select(press_cycles::total_cycles)
                .first::<i64>(conn)
                .optional()
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn last_cycle_for_tool(&self, tool_id: ToolId) -> RepositoryResult<Option<CycleRecord>> {
        self.with_conn("last_cycle_for_tool", move |conn| {
            press_cycles::table
                .filter(press_cycles::tool_id.eq(tool_id.value()))
                .order((press_cycles::date.desc(), press_cycles::id.desc()))
                .select(CycleRow::as_select())
                .first::<CycleRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(CycleRow::into_record)
                .transpose()
        })
        .await
    }
}

#[async_trait]
impl ToolRepository for PostgresRepository {
    async fn insert_tool(&self, tool: NewTool) -> RepositoryResult<Tool> {
        let row = NewToolRow::from_model(&tool)?;
        self.with_conn("insert_tool", move |conn| {
            diesel::insert_into(tools::table)
                .values(&row)
                .returning(ToolRow::as_returning())
                .get_result::<ToolRow>(conn)
                .map_err(map_diesel_error)?
                .into_tool()
        })
        .await
    }

    async fn get_tool(&self, id: ToolId) -> RepositoryResult<Tool> {
        self.with_conn("get_tool", move |conn| {
            tools::table
                .find(id.value())
                .select(ToolRow::as_select())
                .first::<ToolRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| tool_not_found(id, "get_tool"))?
                .into_tool()
        })
        .await
    }

    async fn list_tools(&self) -> RepositoryResult<Vec<Tool>> {
        self.with_conn("list_tools", |conn| {
            tools::table
                .order(tools::id.asc())
                .select(ToolRow::as_select())
                .load::<ToolRow>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(ToolRow::into_tool)
                .collect()
        })
        .await
    }

    async fn set_regenerating(&self, id: ToolId, regenerating: bool) -> RepositoryResult<()> {
        self.with_conn("set_regenerating", move |conn| {
            let updated = diesel::update(tools::table.find(id.value()))
                .set(tools::regenerating.eq(regenerating))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if updated == 0 {
                return Err(tool_not_found(id, "set_regenerating"));
            }
            Ok(())
        })
        .await
    }

    async fn assign_press(&self, id: ToolId, press: Option<PressNumber>) -> RepositoryResult<()> {
        let press = press.map(|p| p.value());
        self.with_conn("assign_press", move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let tool = lock_tool(tx, id, "assign_press")?;
                set_press(tx, tool.id, press)?;
                if let Some(partner) = tool.binding {
                    set_press(tx, partner, press)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn bind_tools(&self, cassette: ToolId, target: ToolId) -> RepositoryResult<()> {
        self.with_conn("bind_tools", move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let cassette_row = lock_tool(tx, cassette, "bind_tools")?;
                let target_row = lock_tool(tx, target, "bind_tools")?;
                if cassette_row.binding.is_some() || target_row.binding.is_some() {
                    return Err(RepositoryError::validation_with_context(
                        "tool is already bound",
                        ErrorContext::new("bind_tools")
                            .with_entity("tools")
                            .with_details(format!("cassette={}, target={}", cassette, target)),
                    ));
                }
                let press = target_row.press;

                set_binding(tx, cassette.value(), Some(target.value()))?;
                set_binding(tx, target.value(), Some(cassette.value()))?;
                if let Some(press) = press {
                    diesel::update(
                        tools::table
                            .filter(tools::position.eq(Position::TopCassette.as_str()))
                            .filter(tools::press.eq(press))
                            .filter(tools::id.ne(cassette.value())),
                    )
                    .set(tools::press.eq(None::<i16>))
                    .execute(tx)
                    .map_err(map_diesel_error)?;
                }
                set_press(tx, cassette.value(), press)?;
                Ok(())
            })
        })
        .await
    }

    async fn unbind_tool(&self, id: ToolId) -> RepositoryResult<Option<ToolId>> {
        self.with_conn("unbind_tool", move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let tool = lock_tool(tx, id, "unbind_tool")?;
                let Some(partner) = tool.binding else {
                    return Ok(None);
                };
                set_binding(tx, id.value(), None)?;
                set_binding(tx, partner, None)?;
                Ok(Some(ToolId(partner)))
            })
        })
        .await
    }
}

#[async_trait]
impl RegenerationRepository for PostgresRepository {
    async fn insert_regeneration(
        &self,
        regeneration: NewRegeneration,
    ) -> RepositoryResult<Regeneration> {
        let row = NewRegenerationRow::from(&regeneration);
        self.with_conn("insert_regeneration", move |conn| {
            diesel::insert_into(tool_regenerations::table)
                .values(&row)
                .returning(RegenerationRow::as_returning())
                .get_result::<RegenerationRow>(conn)
                .map(RegenerationRow::into_regeneration)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn restore_regeneration(&self, regeneration: &Regeneration) -> RepositoryResult<()> {
        let row = RegenerationRow::from_model(regeneration);
        self.with_conn("restore_regeneration", move |conn| {
            diesel::insert_into(tool_regenerations::table)
                .values(&row)
                .execute(conn)
                .map(|_| ())
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn delete_regeneration(&self, id: RegenerationId) -> RepositoryResult<()> {
        self.with_conn("delete_regeneration", move |conn| {
            let deleted = diesel::delete(tool_regenerations::table.find(id.value()))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if deleted == 0 {
                return Err(RepositoryError::not_found_with_context(
                    format!("Regeneration {} not found", id),
                    ErrorContext::new("delete_regeneration")
                        .with_entity("tool_regenerations")
                        .with_entity_id(id),
                ));
            }
            Ok(())
        })
        .await
    }

    async fn last_regeneration_for_tool(
        &self,
        tool_id: ToolId,
    ) -> RepositoryResult<Option<Regeneration>> {
        self.with_conn("last_regeneration_for_tool", move |conn| {
            tool_regenerations::table
                .filter(tool_regenerations::tool_id.eq(tool_id.value()))
                .order(tool_regenerations::id.desc())
                .select(RegenerationRow::as_select())
                .first::<RegenerationRow>(conn)
                .optional()
                .map(|row| row.map(RegenerationRow::into_regeneration))
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn regeneration_history(&self, tool_id: ToolId) -> RepositoryResult<Vec<Regeneration>> {
        self.with_conn("regeneration_history", move |conn| {
            tool_regenerations::table
                .filter(tool_regenerations::tool_id.eq(tool_id.value()))
                .order(tool_regenerations::id.desc())
                .select(RegenerationRow::as_select())
                .load::<RegenerationRow>(conn)
                .map(|rows| {
                    rows.into_iter()
                        .map(RegenerationRow::into_regeneration)
                        .collect()
                })
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn has_regenerations_for_cycle(&self, cycle_id: CycleId) -> RepositoryResult<bool> {
        self.with_conn("has_regenerations_for_cycle", move |conn| {
            diesel::select(diesel::dsl::exists(
                tool_regenerations::table
                    .filter(tool_regenerations::cycle_id.eq(cycle_id.value())),
            ))
            .get_result::<bool>(conn)
            .map_err(map_diesel_error)
        })
        .await
    }
}
