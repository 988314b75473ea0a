//! Error types for the CMS object model.

use std::time::Duration;

use reddot_rql::{Guid, RqlError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CmsError {
    #[error("RQL error: {0}")]
    Rql(#[from] RqlError),

    #[error("User is already logged in ({} existing login(s))", .login_guids.len())]
    AlreadyLoggedIn { login_guids: Vec<Guid> },

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("{entity} has no value for '{field}' after a full load")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("Timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CmsError {
    /// The server error code, when the server reported one.
    pub fn server_code(&self) -> Option<u32> {
        match self {
            CmsError::Rql(e) => e.server_code(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CmsError>;
