//! High-level RQL connection.
//!
//! `RqlConnection` renders requests with the caller's credentials, sends
//! them through a [`Transport`] and classifies the outcome into a parsed
//! [`Reply`] or one of the error kinds of [`RqlError`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Result, RqlError, TransportError};
use crate::protocol::{self, Credentials, Reply, RqlRequest};
use crate::transport::{HttpConfig, HttpTransport, Transport};
use crate::xml::XmlElement;

/// A connection to an RQL endpoint.
#[derive(Clone)]
pub struct RqlConnection {
    transport: Arc<dyn Transport>,
    request_counter: Arc<AtomicU64>,
}

impl std::fmt::Debug for RqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RqlConnection")
            .field("requests_sent", &self.requests_sent())
            .finish_non_exhaustive()
    }
}

impl RqlConnection {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            request_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Connect over SOAP/HTTP.
    pub fn http(config: &HttpConfig) -> Result<Self> {
        let transport = HttpTransport::new(config).map_err(|source| RqlError::Transport {
            request: String::new(),
            source,
        })?;
        tracing::debug!("Using RQL endpoint {}", transport.url());
        Ok(Self::new(Arc::new(transport)))
    }

    /// Number of requests handed to the transport so far.
    pub fn requests_sent(&self) -> u64 {
        self.request_counter.load(Ordering::Relaxed)
    }

    /// Execute a request and parse its reply.
    pub async fn execute(&self, request: &RqlRequest, credentials: &Credentials) -> Result<Reply> {
        let rendered = request.render(credentials)?;
        let diagnostic = request.diagnostic_text(&rendered);
        let n = self.request_counter.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::debug!("RQL #{n} ({:?} scope)", request.scope());
        tracing::trace!("RQL #{n} request: {diagnostic}");

        let raw = self
            .transport
            .execute(&rendered)
            .await
            .map_err(|source| transport_error(&diagnostic, source))?;

        tracing::trace!("RQL #{n} response: {}", raw.body);

        if let Some(error) = raw.error.as_deref().filter(|e| !e.trim().is_empty()) {
            tracing::debug!("RQL #{n} failed: {error}");
            return Err(RqlError::Server {
                code: protocol::parse_error_code(error),
                message: error.trim().to_string(),
                request: diagnostic,
                response: raw.body,
            });
        }

        let root = parse_body(&raw.body).map_err(|e| RqlError::UnexpectedResponse {
            message: format!("reply is not well-formed XML: {e}"),
            request: diagnostic.clone(),
            response: raw.body.clone(),
        })?;

        if let Some(message) = protocol::embedded_error(&raw.body, Some(&root)) {
            tracing::debug!("RQL #{n} failed: {message}");
            return Err(RqlError::Server {
                code: protocol::parse_error_code(&message),
                message,
                request: diagnostic,
                response: raw.body,
            });
        }

        Ok(Reply::new(diagnostic, raw.body, root, raw.result_info))
    }
}

fn transport_error(request: &str, source: TransportError) -> RqlError {
    tracing::warn!("RQL transport failure: {source}");
    RqlError::Transport {
        request: request.to_string(),
        source,
    }
}

/// Parse a reply body. Empty and plain-text bodies become an `<IODATA>`
/// element holding the text.
fn parse_body(body: &str) -> Result<XmlElement> {
    let trimmed = body.trim();
    if !trimmed.starts_with('<') {
        let mut root = XmlElement::new("IODATA");
        root.text = trimmed.to_string();
        return Ok(root);
    }
    XmlElement::parse(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::types::Guid;

    fn creds() -> Credentials {
        let guid: Guid = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".parse().unwrap();
        Credentials::login(guid).with_session_key("KEY")
    }

    fn connection(mock: &Arc<MockTransport>) -> RqlConnection {
        RqlConnection::new(mock.clone())
    }

    #[tokio::test]
    async fn test_execute_success_parses_reply() {
        let mock = Arc::new(MockTransport::new());
        mock.on("PAGE action=\"load\"", r#"<IODATA><PAGE guid="BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB" id="3"/></IODATA>"#);
        let conn = connection(&mock);

        let reply = conn
            .execute(&RqlRequest::session(r#"<PAGE action="load"/>"#), &creds())
            .await
            .unwrap();
        assert_eq!(reply.require("PAGE").unwrap().attr("id"), Some("3"));
        assert_eq!(conn.requests_sent(), 1);
        assert!(mock.requests()[0].contains(r#"sessionkey="KEY""#));
    }

    #[tokio::test]
    async fn test_execute_server_error_from_error_part() {
        let mock = Arc::new(MockTransport::new());
        mock.on_error("PAGE", "#RDError15805");
        let conn = connection(&mock);

        let err = conn
            .execute(&RqlRequest::session("<PAGE/>"), &creds())
            .await
            .unwrap_err();
        match err {
            RqlError::Server { code, request, .. } => {
                assert_eq!(code, Some(15805));
                assert!(request.contains("<PAGE/>"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_server_error_embedded_in_reply() {
        let mock = Arc::new(MockTransport::new());
        mock.on("X", "<IODATA><ERROR>RDError16</ERROR></IODATA>");
        let conn = connection(&mock);
        let err = conn
            .execute(&RqlRequest::session("<X/>"), &creds())
            .await
            .unwrap_err();
        assert_eq!(err.server_code(), Some(16));
        assert_eq!(err.response(), Some("<IODATA><ERROR>RDError16</ERROR></IODATA>"));
    }

    #[tokio::test]
    async fn test_execute_transport_error_keeps_request() {
        let mock = Arc::new(MockTransport::new());
        mock.once_unreachable("X");
        let conn = connection(&mock);
        let err = conn
            .execute(&RqlRequest::session("<X/>"), &creds())
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(err.request().unwrap().contains("<X/>"));
    }

    #[tokio::test]
    async fn test_execute_malformed_reply_is_unexpected() {
        let mock = Arc::new(MockTransport::new());
        mock.on("X", "<IODATA><PAGE></IODATA>");
        let conn = connection(&mock);
        let err = conn
            .execute(&RqlRequest::session("<X/>"), &creds())
            .await
            .unwrap_err();
        assert!(matches!(err, RqlError::UnexpectedResponse { .. }));
    }

    #[tokio::test]
    async fn test_execute_empty_and_text_replies() {
        let mock = Arc::new(MockTransport::new());
        mock.on("EMPTY", "").on("TEXT", "ok");
        let conn = connection(&mock);

        let reply = conn
            .execute(&RqlRequest::session("<EMPTY/>"), &creds())
            .await
            .unwrap();
        assert!(reply.is_empty());

        let reply = conn
            .execute(&RqlRequest::session("<TEXT/>"), &creds())
            .await
            .unwrap();
        assert_eq!(reply.root().text, "ok");
    }

    #[tokio::test]
    async fn test_missing_credentials_never_reach_transport() {
        let mock = Arc::new(MockTransport::new());
        let conn = connection(&mock);
        let err = conn
            .execute(&RqlRequest::session("<X/>"), &Credentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RqlError::MissingCredential(_)));
        assert!(mock.requests().is_empty());
        assert_eq!(conn.requests_sent(), 0);
    }

    #[tokio::test]
    async fn test_sensitive_request_redacted_in_errors() {
        let mock = Arc::new(MockTransport::new());
        mock.on_error("login", "#RDError1");
        let conn = connection(&mock);
        let req = RqlRequest::anonymous(r#"<ADMINISTRATION action="login" password="hunter2"/>"#).sensitive();
        let err = conn.execute(&req, &Credentials::default()).await.unwrap_err();
        assert!(!err.request().unwrap().contains("hunter2"));
    }
}
