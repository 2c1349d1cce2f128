//! Persistence error types

use thiserror::Error;

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Row decode error: {0}")]
    Decode(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<scylla::transport::query_result::RowsExpectedError> for PersistenceError {
    fn from(err: scylla::transport::query_result::RowsExpectedError) -> Self {
        PersistenceError::Decode(err.to_string())
    }
}

impl From<scylla::transport::query_result::MaybeFirstRowTypedError> for PersistenceError {
    fn from(err: scylla::transport::query_result::MaybeFirstRowTypedError) -> Self {
        PersistenceError::Decode(err.to_string())
    }
}

impl From<scylla::cql_to_rust::FromRowError> for PersistenceError {
    fn from(err: scylla::cql_to_rust::FromRowError) -> Self {
        PersistenceError::Decode(err.to_string())
    }
}

impl From<PersistenceError> for outdial_core::Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(what) => outdial_core::Error::NotFound(what),
            other => outdial_core::Error::Persistence(other.to_string()),
        }
    }
}
