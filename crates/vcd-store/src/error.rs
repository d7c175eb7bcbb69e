//! Store errors

use thiserror::Error;

/// Errors that can occur when reading or writing the relational store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind (table)
        entity: &'static str,
        /// Key that was looked up
        id: String,
    },

    /// Unique or referential constraint violated
    #[error("{entity} conflict: {detail}")]
    Conflict {
        /// Entity kind (table)
        entity: &'static str,
        /// Which constraint was hit
        detail: String,
    },

    /// Database unreachable or pool exhausted
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be mapped back to a model
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Any other database error
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn conflict(entity: &'static str, detail: impl Into<String>) -> Self {
        StoreError::Conflict {
            entity,
            detail: detail.into(),
        }
    }

    /// Whether the error is a uniqueness or reference violation
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Whether the error means the row is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Map a sqlx error raised while writing `entity`
    pub(crate) fn from_sqlx(entity: &'static str, e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            let constraint = db.constraint().map(str::to_string);
            match db.code().as_deref() {
                // unique_violation
                Some("23505") => {
                    return StoreError::conflict(
                        entity,
                        constraint.unwrap_or_else(|| "unique constraint".to_string()),
                    );
                }
                // foreign_key_violation
                Some("23503") => {
                    return StoreError::conflict(
                        entity,
                        format!("still referenced ({})", constraint.unwrap_or_else(|| "foreign key".to_string())),
                    );
                }
                _ => {}
            }
        }
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}
