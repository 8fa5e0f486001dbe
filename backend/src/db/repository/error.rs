//! Error types for repository and service operations.
//!
//! Every variant carries an [`ErrorContext`] naming the operation and entity
//! the failure belongs to. Persistence failures are never retried; they are
//! wrapped with context and returned to the caller.

use std::fmt;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Where an error happened: operation, table, row and free-form details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// e.g. "add_cycle", "bind_tools"
    pub operation: Option<String>,
    /// Table name, e.g. "press_cycles"
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Fields already set win over `other`.
    fn merge_missing(&mut self, other: ErrorContext) {
        self.operation = self.operation.take().or(other.operation);
        self.entity = self.entity.take().or(other.entity);
        self.entity_id = self.entity_id.take().or(other.entity_id);
        self.details = self.details.take().or(other.details);
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("operation", &self.operation),
            ("entity", &self.entity),
            ("id", &self.entity_id),
            ("details", &self.details),
        ];
        let parts: Vec<String> = fields
            .iter()
            .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}={}", label, v)))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[derive(Debug, thiserror::Error)]
#[allow(clippy::result_large_err)]
pub enum RepositoryError {
    /// Pool exhausted, connection refused or dropped.
    #[error("Connection error: {message} {context}")]
    ConnectionError {
        message: String,
        context: ErrorContext,
    },

    #[error("Query error: {message} {context}")]
    QueryError {
        message: String,
        context: ErrorContext,
    },

    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// Input rejected before any mutation took place.
    #[error("Validation error: {message} {context}")]
    ValidationError {
        message: String,
        context: ErrorContext,
    },

    /// The requested state already holds (e.g. the pair is already bound).
    #[error("Already exists: {message} {context}")]
    AlreadyExists {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message} {context}")]
    ConfigurationError {
        message: String,
        context: ErrorContext,
    },

    #[error("Internal error: {message} {context}")]
    InternalError {
        message: String,
        context: ErrorContext,
    },

    /// Commit or rollback failed.
    #[error("Transaction error: {message} {context}")]
    TransactionError {
        message: String,
        context: ErrorContext,
    },

    /// A multi-step write failed and undoing its completed steps failed too.
    /// The store may be left in an intermediate state.
    #[error("Compensation failed: {message}: {primary}; compensation error: {compensation} {context}")]
    CompensationFailed {
        message: String,
        #[source]
        primary: Box<RepositoryError>,
        compensation: Box<RepositoryError>,
        context: ErrorContext,
    },
}

/// `$plain(message)` and `$with_context(message, context)` for `$variant`.
macro_rules! constructors {
    ($($plain:ident, $with_context:ident => $variant:ident;)+) => {
        $(
            pub fn $plain(message: impl Into<String>) -> Self {
                Self::$with_context(message, ErrorContext::default())
            }

            pub fn $with_context(message: impl Into<String>, context: ErrorContext) -> Self {
                Self::$variant {
                    message: message.into(),
                    context,
                }
            }
        )+
    };
}

impl RepositoryError {
    constructors! {
        connection, connection_with_context => ConnectionError;
        query, query_with_context => QueryError;
        not_found, not_found_with_context => NotFound;
        validation, validation_with_context => ValidationError;
        already_exists, already_exists_with_context => AlreadyExists;
        configuration, configuration_with_context => ConfigurationError;
        internal, internal_with_context => InternalError;
        transaction, transaction_with_context => TransactionError;
    }

    /// Combine the failure of a step with the failure of its compensation.
    pub fn compensation_failed(
        message: impl Into<String>,
        primary: RepositoryError,
        compensation: RepositoryError,
        context: ErrorContext,
    ) -> Self {
        Self::CompensationFailed {
            message: message.into(),
            primary: Box::new(primary),
            compensation: Box::new(compensation),
            context,
        }
    }

    /// True for input rejected before mutation, including already-bound pairs.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::ValidationError { .. } | Self::AlreadyExists { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for failures that originate in the storage layer.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. } | Self::QueryError { .. } | Self::TransactionError { .. }
        )
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::ConnectionError { context, .. }
            | Self::QueryError { context, .. }
            | Self::NotFound { context, .. }
            | Self::ValidationError { context, .. }
            | Self::AlreadyExists { context, .. }
            | Self::ConfigurationError { context, .. }
            | Self::InternalError { context, .. }
            | Self::TransactionError { context, .. }
            | Self::CompensationFailed { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::ConnectionError { context, .. }
            | Self::QueryError { context, .. }
            | Self::NotFound { context, .. }
            | Self::ValidationError { context, .. }
            | Self::AlreadyExists { context, .. }
            | Self::ConfigurationError { context, .. }
            | Self::InternalError { context, .. }
            | Self::TransactionError { context, .. }
            | Self::CompensationFailed { context, .. } => context,
        }
    }

    /// Attribute the error to `operation`, replacing any earlier one.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Fill in any context fields the error does not carry yet.
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context_mut().merge_missing(context);
        self
    }
}

#[cfg(feature = "postgres-repo")]
mod diesel_errors {
    use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

    use super::{ErrorContext, RepositoryError};

    fn database_context(
        kind: &DatabaseErrorKind,
        info: &(dyn DatabaseErrorInformation + Send + Sync),
    ) -> ErrorContext {
        let mut details = format!("db_error_kind={:?}", kind);
        if let Some(constraint) = info.constraint_name() {
            details.push_str(&format!(", constraint={}", constraint));
        }
        let context = ErrorContext::default().with_details(details);
        match info.table_name() {
            Some(table) => context.with_entity(table),
            None => context,
        }
    }

    impl From<DieselError> for RepositoryError {
        fn from(err: DieselError) -> Self {
            match err {
                DieselError::NotFound => RepositoryError::not_found("Record not found"),
                DieselError::DatabaseError(kind, info) => {
                    let context = database_context(&kind, info.as_ref());
                    let message = info.message().to_string();
                    match kind {
                        // Unique keys only guard the id columns; a clash means the row exists.
                        DatabaseErrorKind::UniqueViolation => {
                            RepositoryError::already_exists_with_context(message, context)
                        }
                        DatabaseErrorKind::CheckViolation
                        | DatabaseErrorKind::NotNullViolation
                        | DatabaseErrorKind::ForeignKeyViolation => {
                            RepositoryError::validation_with_context(message, context)
                        }
                        DatabaseErrorKind::ClosedConnection => {
                            RepositoryError::connection_with_context(message, context)
                        }
                        _ => RepositoryError::query_with_context(message, context),
                    }
                }
                DieselError::RollbackTransaction
                | DieselError::AlreadyInTransaction
                | DieselError::NotInTransaction => RepositoryError::transaction(err.to_string()),
                DieselError::DeserializationError(e) | DieselError::SerializationError(e) => {
                    RepositoryError::internal(format!("Row conversion failed: {}", e))
                }
                other => RepositoryError::query(other.to_string()),
            }
        }
    }

    impl From<diesel::r2d2::PoolError> for RepositoryError {
        fn from(err: diesel::r2d2::PoolError) -> Self {
            RepositoryError::connection_with_context(
                err.to_string(),
                ErrorContext::default().with_details("pool_error"),
            )
        }
    }
}
