//! Repository trait definitions for database operations.
//!
//! The storage surface is split into one trait per table:
//!
//! - [`error`]: Error types for repository operations
//! - [`cycles`]: Counter readings (`press_cycles`)
//! - [`tools`]: Press assignment, binding and regeneration flag (`tools`)
//! - [`regenerations`]: Regeneration events (`tool_regenerations`)
//!
//! # Convenience Trait Bound
//!
//! Services that touch more than one table take a [`FullRepository`]:
//!
//! ```ignore
//! async fn my_service<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<()> {
//!     let tool = repo.get_tool(tool_id).await?;
//!     let readings = repo.list_cycles_for_tool(tool.id).await?;
//!     Ok(())
//! }
//! ```

pub mod cycles;
pub mod error;
pub mod regenerations;
pub mod tools;

// Re-export error types
pub use error::{ErrorContext, RepositoryError, RepositoryResult};

// Re-export all traits
pub use cycles::CycleRepository;
pub use regenerations::RegenerationRepository;
pub use tools::ToolRepository;

/// Composite trait bound for a complete repository implementation.
///
/// Automatically implemented for any type that implements all three
/// repository traits.
pub trait FullRepository: CycleRepository + ToolRepository + RegenerationRepository {}

impl<T> FullRepository for T where T: CycleRepository + ToolRepository + RegenerationRepository {}
