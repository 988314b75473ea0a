//! SOAP transport for RQL.
//!
//! The server exposes a single SOAP 1.1 operation, `Execute`, with three
//! string parts:
//! - `sParamA`: the RQL document (escaped as text)
//! - `sErrorA`: filled by the server with an error message, if any
//! - `sResultInfo`: filled by the server with additional result information
//!
//! The reply document comes back in the `Result` part of `ExecuteResponse`.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::escape::escape;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};

use crate::error::TransportError;
use crate::xml::XmlElement;

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// Namespace of the RQL service messages.
pub const RQL_SERVICE_NS: &str = "http://tempuri.org/RDCMSXMLServer/message/";
/// SOAPAction header value for `Execute`.
pub const RQL_EXECUTE_ACTION: &str = "http://tempuri.org/RDCMSXMLServer/action/XmlServer.Execute";

/// Default location of the RQL web service on a server.
pub const DEFAULT_SERVICE_URL: &str = "http://localhost/CMS/WebService/RqlWebService.svc";

/// User agent sent when none is configured.
pub const USER_AGENT_VALUE: &str = concat!("reddot-rql/", env!("CARGO_PKG_VERSION"));

/// What the server sent back for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReply {
    /// The reply document (may be empty for some mutations).
    pub body: String,
    /// Error text from the `sErrorA` part, if non-empty.
    pub error: Option<String>,
    /// Text from the `sResultInfo` part, if non-empty.
    pub result_info: Option<String>,
}

impl RawReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Sends a rendered RQL document to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, command: &str) -> Result<RawReply, TransportError>;
}

// ============================================================================
// HTTP
// ============================================================================

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Full URL of the RQL web service.
    pub url: String,
    /// Timeout for one request. Default: 60 seconds.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVICE_URL.to_string(),
            timeout: Duration::from_secs(60),
            user_agent: USER_AGENT_VALUE.to_string(),
        }
    }
}

/// RQL over SOAP over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let mut default_headers = HeaderMap::new();
        let agent = HeaderValue::from_str(&config.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(USER_AGENT_VALUE));
        default_headers.insert(USER_AGENT, agent);
        default_headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/xml; charset=utf-8"),
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, command: &str) -> Result<RawReply, TransportError> {
        let envelope = soap_envelope(command);
        tracing::trace!("POST {} ({} bytes)", self.url, envelope.len());

        let response = self
            .client
            .post(&self.url)
            .header("SOAPAction", format!("\"{RQL_EXECUTE_ACTION}\""))
            .body(envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TransportError::Unreachable(format!("{}: {e}", self.url))
                } else {
                    TransportError::Http(e)
                }
            })?;

        let status = response.status();
        let body = response.text().await?;

        // SOAP faults come back with status 500 and a Fault body.
        if status.is_server_error() {
            match parse_soap_response(&body) {
                Err(TransportError::Envelope(_)) => {}
                other => return other,
            }
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_soap_response(&body)
    }
}

/// Wrap an RQL document into an `Execute` SOAP envelope.
pub fn soap_envelope(command: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<s:Envelope xmlns:s="{env}"><s:Body>"#,
            r#"<Execute xmlns="{svc}"><sParamA>{cmd}</sParamA><sErrorA></sErrorA><sResultInfo></sResultInfo></Execute>"#,
            r#"</s:Body></s:Envelope>"#
        ),
        env = SOAP_ENV_NS,
        svc = RQL_SERVICE_NS,
        cmd = escape(command),
    )
}

/// Extract the reply parts from an `ExecuteResponse` envelope.
pub fn parse_soap_response(body: &str) -> Result<RawReply, TransportError> {
    let envelope = XmlElement::parse(body)
        .map_err(|e| TransportError::Envelope(format!("unparseable SOAP response: {e}")))?;

    if let Some(fault) = envelope.find("Fault") {
        let message = fault
            .find("faultstring")
            .map(|f| f.text.clone())
            .unwrap_or_else(|| "unknown fault".to_string());
        return Err(TransportError::Fault(message));
    }

    let response = envelope
        .find("ExecuteResponse")
        .ok_or_else(|| TransportError::Envelope("missing ExecuteResponse".into()))?;

    let part = |name: &str| {
        response
            .find(name)
            .map(|e| e.text.clone())
            .filter(|t| !t.trim().is_empty())
    };

    Ok(RawReply {
        body: part("Result").unwrap_or_default(),
        error: part("sErrorA"),
        result_info: part("sResultInfo"),
    })
}
