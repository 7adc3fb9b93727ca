use diesel::result::DatabaseErrorKind;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A derived-query token, sort property or view accessor that maps to no attribute.
    #[error("Unresolved query `{method}`: no attribute matches `{token}`{}", suggestion_suffix(.suggestion))]
    UnresolvedQuery {
        method: String,
        token: String,
        suggestion: Option<String>,
    },

    #[error("Parameter binding error: {0}")]
    ParameterBinding(String),

    #[error("Projection `{projection}` expects {expected} columns but the query selects {actual}")]
    ProjectionArity {
        projection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Incorrect result size: expected at most {expected}, got {actual}")]
    IncorrectResultSize { expected: usize, actual: usize },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Execution-time failure tagged with the query that raised it.
    #[error("Query `{query}` failed: {source}")]
    Query {
        query: String,
        source: Box<AppError>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean `{}`?)", s),
        None => String::new(),
    }
}

impl AppError {
    /// Wrap an execution error with the identity of the query that failed.
    pub fn in_query(self, query: impl Into<String>) -> Self {
        match self {
            // Already tagged by an inner statement
            AppError::Query { .. } => self,
            other => AppError::Query {
                query: query.into(),
                source: Box::new(other),
            },
        }
    }

    /// The error underneath any `Query` wrappers.
    pub fn root_cause(&self) -> &AppError {
        match self {
            AppError::Query { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), AppError::NotFound(_))
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.root_cause(), AppError::ConstraintViolation(_))
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self.root_cause(), AppError::StoreUnavailable(_))
    }
}

fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("database is locked") || lower.contains("database is busy")
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => {
                AppError::NotFound("Record not found in database".to_string())
            }
            diesel::result::Error::DatabaseError(kind, info) => {
                let message = info.message().to_string();
                match kind {
                    DatabaseErrorKind::UniqueViolation
                    | DatabaseErrorKind::ForeignKeyViolation
                    | DatabaseErrorKind::NotNullViolation
                    | DatabaseErrorKind::CheckViolation => AppError::ConstraintViolation(message),
                    DatabaseErrorKind::ClosedConnection => AppError::StoreUnavailable(message),
                    _ if message.contains("constraint failed") => {
                        AppError::ConstraintViolation(message)
                    }
                    _ if is_transient_message(&message) => AppError::StoreUnavailable(message),
                    _ => AppError::DatabaseError(message),
                }
            }
            other => AppError::DatabaseError(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for AppError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        AppError::StoreUnavailable(format!("Database pool error: {}", err))
    }
}

impl From<diesel::ConnectionError> for AppError {
    fn from(err: diesel::ConnectionError) -> Self {
        AppError::StoreUnavailable(format!("Failed to connect: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError(format!("Unit of work task failed: {}", err))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(err: std::num::ParseIntError) -> Self {
        AppError::InvalidInput(format!("Invalid number: {}", err))
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Turns an absent lookup into `NotFound` when the caller demands a value.
pub trait OptionExt<T> {
    fn or_not_found(self, what: impl FnOnce() -> String) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, what: impl FnOnce() -> String) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(what()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_wrapper_keeps_root_cause() {
        let err = AppError::ConstraintViolation("FOREIGN KEY constraint failed".to_string())
            .in_query("Member.delete");

        assert!(err.is_constraint_violation());
        assert!(err.to_string().contains("Member.delete"));

        // Wrapping twice keeps the innermost query name
        let rewrapped = err.in_query("outer");
        match rewrapped {
            AppError::Query { query, .. } => assert_eq!(query, "Member.delete"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unresolved_query_mentions_suggestion() {
        let err = AppError::UnresolvedQuery {
            method: "findByUsernme".to_string(),
            token: "usernme".to_string(),
            suggestion: Some("username".to_string()),
        };
        assert!(err.to_string().contains("did you mean `username`"));
    }

    #[test]
    fn absent_option_becomes_not_found() {
        let missing: Option<i32> = None;
        let err = missing.or_not_found(|| "member 7".to_string()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn errors_serialize_with_type_tag() {
        let json = serde_json::to_value(AppError::InvalidInput("size".to_string())).unwrap();
        assert_eq!(json["type"], "InvalidInput");
        assert_eq!(json["message"], "size");
    }
}
