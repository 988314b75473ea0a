//! Error types for the RQL protocol layer.
//!
//! Failures are split into three kinds so callers can react differently:
//! the server could not be reached ([`RqlError::Transport`]), the server
//! answered with an application error ([`RqlError::Server`]), or the answer
//! did not contain what the client needs ([`RqlError::UnexpectedResponse`]).

use thiserror::Error;

/// Errors below the RQL layer: HTTP, SOAP envelope, unreachable endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed SOAP envelope: {0}")]
    Envelope(String),

    #[error("SOAP fault: {0}")]
    Fault(String),

    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),
}

/// Errors that can occur while executing RQL requests.
#[derive(Debug, Error)]
pub enum RqlError {
    /// The request never produced a reply.
    #[error("Transport error: {source}")]
    Transport {
        request: String,
        #[source]
        source: TransportError,
    },

    /// The server processed the request and reported an application error.
    #[error("Server error{}: {message}", code_suffix(.code))]
    Server {
        code: Option<u32>,
        message: String,
        request: String,
        response: String,
    },

    /// The reply is missing an element or attribute the client relies on.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        message: String,
        request: String,
        response: String,
    },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Missing credential: no {0} available (not logged in or no project selected)")]
    MissingCredential(&'static str),

    #[error("Invalid GUID: {0}")]
    InvalidGuid(String),
}

fn code_suffix(code: &Option<u32>) -> String {
    code.map(|c| format!(" RDError{c}")).unwrap_or_default()
}

impl RqlError {
    /// The server error code, if this is a [`RqlError::Server`] with a code.
    pub fn server_code(&self) -> Option<u32> {
        match self {
            RqlError::Server { code, .. } => *code,
            _ => None,
        }
    }

    /// The request text attached to the error, for diagnostics.
    pub fn request(&self) -> Option<&str> {
        match self {
            RqlError::Transport { request, .. }
            | RqlError::Server { request, .. }
            | RqlError::UnexpectedResponse { request, .. } => Some(request),
            _ => None,
        }
    }

    /// The response text attached to the error, for diagnostics.
    pub fn response(&self) -> Option<&str> {
        match self {
            RqlError::Server { response, .. } | RqlError::UnexpectedResponse { response, .. } => {
                Some(response)
            }
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RqlError::Transport { .. })
    }

    pub fn is_server(&self) -> bool {
        matches!(self, RqlError::Server { .. })
    }
}

pub type Result<T> = std::result::Result<T, RqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display_includes_code() {
        let err = RqlError::Server {
            code: Some(15805),
            message: "page is locked".into(),
            request: "<IODATA/>".into(),
            response: "RDError15805".into(),
        };
        assert_eq!(err.to_string(), "Server error RDError15805: page is locked");
        assert_eq!(err.server_code(), Some(15805));
        assert!(err.is_server());
        assert_eq!(err.request(), Some("<IODATA/>"));
    }

    #[test]
    fn test_server_error_display_without_code() {
        let err = RqlError::Server {
            code: None,
            message: "failed".into(),
            request: String::new(),
            response: String::new(),
        };
        assert_eq!(err.to_string(), "Server error: failed");
    }

    #[test]
    fn test_transport_error_keeps_request() {
        let err = RqlError::Transport {
            request: "<IODATA><X/></IODATA>".into(),
            source: TransportError::Unreachable("connection refused".into()),
        };
        assert!(err.is_transport());
        assert_eq!(err.request(), Some("<IODATA><X/></IODATA>"));
        assert_eq!(err.response(), None);
    }
}
