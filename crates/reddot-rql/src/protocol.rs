//! RQL message conventions: `<IODATA>` wrapping, credential placement, and
//! reply classification.
//!
//! A request body is rendered inside an `<IODATA>` wrapper whose attributes
//! depend on the request [`Scope`]. Bodies may additionally reference the
//! credentials through placeholders, which are substituted just before the
//! request is sent:
//!
//! - `[!guid_login!]`: the login GUID returned by the login request
//! - `[!key!]`: the session key returned when a project is selected

use lazy_regex::regex_captures;

use crate::error::{Result, RqlError};
use crate::types::Guid;
use crate::xml::{ElementBuilder, XmlElement};

/// Placeholder for the login GUID inside request bodies.
pub const LOGIN_GUID_PLACEHOLDER: &str = "[!guid_login!]";
/// Placeholder for the session key inside request bodies.
pub const SESSION_KEY_PLACEHOLDER: &str = "[!key!]";

/// A credential placeholder inside a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    LoginGuid,
    SessionKey,
}

impl Placeholder {
    pub fn as_str(self) -> &'static str {
        match self {
            Placeholder::LoginGuid => LOGIN_GUID_PLACEHOLDER,
            Placeholder::SessionKey => SESSION_KEY_PLACEHOLDER,
        }
    }
}

/// Text stored in diagnostics instead of a sensitive request.
const REDACTED: &str = "<IODATA>[redacted]</IODATA>";

/// Server error code for "user is already logged in".
pub const ERROR_ALREADY_LOGGED_IN: u32 = 101;

// ============================================================================
// Requests
// ============================================================================

/// Which credentials a request carries on its `<IODATA>` wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// No credentials (login).
    Anonymous,
    /// `loginguid` only (administration requests).
    Login,
    /// `loginguid` and `sessionkey` (requests inside a project).
    Session,
}

/// The credentials of a logged-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub login_guid: Option<Guid>,
    pub session_key: Option<String>,
}

impl Credentials {
    pub fn login(login_guid: Guid) -> Self {
        Self {
            login_guid: Some(login_guid),
            session_key: None,
        }
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    fn require_login_guid(&self) -> Result<Guid> {
        self.login_guid.ok_or(RqlError::MissingCredential("login GUID"))
    }

    fn require_session_key(&self) -> Result<&str> {
        self.session_key
            .as_deref()
            .ok_or(RqlError::MissingCredential("session key"))
    }
}

/// An RQL request body together with the scope it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RqlRequest {
    scope: Scope,
    body: String,
    sensitive: bool,
}

impl RqlRequest {
    pub fn new(scope: Scope, body: impl Into<String>) -> Self {
        Self {
            scope,
            body: body.into(),
            sensitive: false,
        }
    }

    pub fn anonymous(body: impl Into<String>) -> Self {
        Self::new(Scope::Anonymous, body)
    }

    pub fn login(body: impl Into<String>) -> Self {
        Self::new(Scope::Login, body)
    }

    pub fn session(body: impl Into<String>) -> Self {
        Self::new(Scope::Session, body)
    }

    pub fn from_element(scope: Scope, element: &ElementBuilder) -> Self {
        Self::new(scope, element.to_string())
    }

    /// Mark the request as carrying secrets; it will not be logged or kept in errors.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Render the full `<IODATA>` document with the given credentials.
    ///
    /// Fails without touching the network when the scope or a placeholder
    /// needs a credential that is not available.
    pub fn render(&self, credentials: &Credentials) -> Result<String> {
        let mut wrapper = String::from("<IODATA");
        match self.scope {
            Scope::Anonymous => {}
            Scope::Login => {
                let guid = credentials.require_login_guid()?;
                wrapper.push_str(&format!(" loginguid=\"{guid}\""));
            }
            Scope::Session => {
                let guid = credentials.require_login_guid()?;
                let key = credentials.require_session_key()?;
                wrapper.push_str(&format!(
                    " loginguid=\"{guid}\" sessionkey=\"{}\"",
                    quick_xml::escape::escape(key)
                ));
            }
        }
        wrapper.push('>');

        let body = substitute_placeholders(&self.body, credentials)?;
        Ok(format!("{wrapper}{body}</IODATA>"))
    }

    /// Request text for logs and error diagnostics.
    pub(crate) fn diagnostic_text(&self, rendered: &str) -> String {
        if self.sensitive {
            REDACTED.to_string()
        } else {
            rendered.to_string()
        }
    }
}

fn substitute_placeholders(body: &str, credentials: &Credentials) -> Result<String> {
    let mut out = body.to_string();
    if out.contains(LOGIN_GUID_PLACEHOLDER) {
        let guid = credentials.require_login_guid()?;
        out = out.replace(LOGIN_GUID_PLACEHOLDER, &guid.to_string());
    }
    if out.contains(SESSION_KEY_PLACEHOLDER) {
        let key = credentials.require_session_key()?;
        out = out.replace(SESSION_KEY_PLACEHOLDER, &quick_xml::escape::escape(key));
    }
    Ok(out)
}

// ============================================================================
// Replies
// ============================================================================

/// A successfully executed request and its parsed reply.
#[derive(Debug, Clone)]
pub struct Reply {
    request: String,
    response: String,
    root: XmlElement,
    result_info: Option<String>,
}

impl Reply {
    pub fn new(
        request: String,
        response: String,
        root: XmlElement,
        result_info: Option<String>,
    ) -> Self {
        Self {
            request,
            response,
            root,
            result_info,
        }
    }

    /// The root element, normally `<IODATA>`.
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    /// Additional information the server returned next to the reply.
    pub fn result_info(&self) -> Option<&str> {
        self.result_info.as_deref()
    }

    /// Whether the reply carries no elements at all.
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty() && self.root.text.is_empty()
    }

    /// Build a contract-violation error carrying this exchange.
    pub fn unexpected(&self, message: impl Into<String>) -> RqlError {
        RqlError::UnexpectedResponse {
            message: message.into(),
            request: self.request.clone(),
            response: self.response.clone(),
        }
    }

    /// First element called `name` anywhere in the reply.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.root.find(name)
    }

    /// First element called `name`; its absence is a contract violation.
    pub fn require(&self, name: &str) -> Result<&XmlElement> {
        self.root
            .find(name)
            .ok_or_else(|| self.unexpected(format!("reply has no <{name}> element")))
    }

    /// Every element called `name` anywhere in the reply.
    pub fn find_all(&self, name: &str) -> Vec<&XmlElement> {
        self.root.find_all(name)
    }

    pub fn require_attr<'a>(&self, element: &'a XmlElement, name: &str) -> Result<&'a str> {
        element.attr(name).ok_or_else(|| {
            self.unexpected(format!("<{}> has no '{name}' attribute", element.name))
        })
    }

    pub fn require_guid(&self, element: &XmlElement, name: &str) -> Result<Guid> {
        let value = self.require_attr(element, name)?;
        Guid::parse_optional(value).ok_or_else(|| {
            self.unexpected(format!(
                "<{}> attribute '{name}' is not a GUID: {value:?}",
                element.name
            ))
        })
    }

    pub fn require_parsed<T: std::str::FromStr>(
        &self,
        element: &XmlElement,
        name: &str,
    ) -> Result<T> {
        let value = self.require_attr(element, name)?;
        value.trim().parse().map_err(|_| {
            self.unexpected(format!(
                "<{}> attribute '{name}' has unexpected value {value:?}",
                element.name
            ))
        })
    }
}

// ============================================================================
// Error classification
// ============================================================================

/// Extract the numeric code from server error text such as `#RDError15805`.
pub fn parse_error_code(text: &str) -> Option<u32> {
    regex_captures!(r"RDError(\d+)", text).and_then(|(_, code)| code.parse().ok())
}

/// Detect an application error inside an otherwise successful reply.
///
/// Returns the error message when the reply text starts with an `RDError`
/// code or the reply contains an `<ERROR>` element.
pub fn embedded_error(response: &str, root: Option<&XmlElement>) -> Option<String> {
    let trimmed = response.trim();
    let bare = trimmed.trim_start_matches('#');
    if bare.starts_with("RDError") {
        return Some(trimmed.to_string());
    }
    let error = root?.find("ERROR")?;
    let message = if error.text.is_empty() {
        error.attr("value").unwrap_or("unspecified error").to_string()
    } else {
        error.text.clone()
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn guid() -> Guid {
        "0123456789ABCDEF0123456789ABCDEF".parse().unwrap()
    }

    #[test]
    fn test_render_anonymous() {
        let req = RqlRequest::anonymous(r#"<ADMINISTRATION action="login"/>"#);
        assert_eq!(
            req.render(&Credentials::default()).unwrap(),
            r#"<IODATA><ADMINISTRATION action="login"/></IODATA>"#
        );
    }

    #[test]
    fn test_render_login_scope_places_guid() {
        let req = RqlRequest::login("<ADMINISTRATION><PROJECTS action=\"list\"/></ADMINISTRATION>");
        let rendered = req.render(&Credentials::login(guid())).unwrap();
        assert!(rendered.starts_with(r#"<IODATA loginguid="0123456789ABCDEF0123456789ABCDEF">"#));
        assert!(!rendered.contains("sessionkey"));
    }

    #[test]
    fn test_render_session_scope_places_both() {
        let creds = Credentials::login(guid()).with_session_key("K1");
        let rendered = RqlRequest::session("<PAGE/>").render(&creds).unwrap();
        assert_eq!(
            rendered,
            r#"<IODATA loginguid="0123456789ABCDEF0123456789ABCDEF" sessionkey="K1"><PAGE/></IODATA>"#
        );
    }

    #[test]
    fn test_render_requires_credentials() {
        let err = RqlRequest::session("<PAGE/>")
            .render(&Credentials::login(guid()))
            .unwrap_err();
        assert!(matches!(err, RqlError::MissingCredential("session key")));

        let err = RqlRequest::login("<X/>")
            .render(&Credentials::default())
            .unwrap_err();
        assert!(matches!(err, RqlError::MissingCredential("login GUID")));
    }

    #[test]
    fn test_placeholders_substituted() {
        let creds = Credentials::login(guid()).with_session_key("abc");
        let body = r#"<ADMINISTRATION action="validate" guid="[!guid_login!]"><X key="[!key!]"/></ADMINISTRATION>"#;
        let rendered = RqlRequest::anonymous(body).render(&creds).unwrap();
        assert!(rendered.contains(r#"guid="0123456789ABCDEF0123456789ABCDEF""#));
        assert!(rendered.contains(r#"key="abc""#));
        assert!(!rendered.contains("[!"));
    }

    #[test]
    fn test_built_values_keep_placeholder_text() {
        let creds = Credentials::login(guid()).with_session_key("SECRET");
        let body = ElementBuilder::new("PAGE")
            .attr("headline", "How to use [!key!] and [!guid_login!]")
            .placeholder_attr("owner", Placeholder::LoginGuid);
        let rendered = RqlRequest::from_element(Scope::Session, &body)
            .render(&creds)
            .unwrap();
        // Only the wrapper carries the session key.
        assert_eq!(rendered.matches("SECRET").count(), 1);
        assert!(rendered.contains(r#"headline="How to use &#91;!key!] and &#91;!guid_login!]""#));
        assert!(rendered.contains(r#"owner="0123456789ABCDEF0123456789ABCDEF""#));
    }

    #[test]
    fn test_placeholder_without_credential_fails() {
        let err = RqlRequest::anonymous(r#"<LOGOUT guid="[!guid_login!]"/>"#)
            .render(&Credentials::default())
            .unwrap_err();
        assert!(matches!(err, RqlError::MissingCredential(_)));
    }

    #[test]
    fn test_sensitive_request_is_redacted() {
        let req = RqlRequest::anonymous("<X password=\"p\"/>").sensitive();
        assert_eq!(req.diagnostic_text("<IODATA><X password=\"p\"/></IODATA>"), REDACTED);
    }

    #[test]
    fn test_parse_error_code() {
        assert_eq!(parse_error_code("#RDError15805"), Some(15805));
        assert_eq!(parse_error_code("RDError101 already logged in"), Some(101));
        assert_eq!(parse_error_code("something else"), None);
    }

    #[test]
    fn test_embedded_error_detection() {
        assert_eq!(embedded_error("#RDError110", None).as_deref(), Some("#RDError110"));

        let root = XmlElement::parse("<IODATA><ERROR>RDError16 no right</ERROR></IODATA>").unwrap();
        assert_eq!(
            embedded_error("...", Some(&root)).as_deref(),
            Some("RDError16 no right")
        );

        let ok = XmlElement::parse("<IODATA><PAGE/></IODATA>").unwrap();
        assert_eq!(embedded_error("<IODATA><PAGE/></IODATA>", Some(&ok)), None);
    }

    #[test]
    fn test_reply_require_helpers() {
        let root = XmlElement::parse(
            r#"<IODATA><LOGIN guid="0123456789ABCDEF0123456789ABCDEF" count="x"/></IODATA>"#,
        )
        .unwrap();
        let reply = Reply::new("req".into(), "resp".into(), root, None);
        let login = reply.require("LOGIN").unwrap();
        assert_eq!(reply.require_guid(login, "guid").unwrap(), guid());

        let err = reply.require("SERVER").unwrap_err();
        assert!(matches!(
            err,
            RqlError::UnexpectedResponse { ref request, ref response, .. }
                if request == "req" && response == "resp"
        ));
        assert!(reply.require_parsed::<u32>(login, "count").is_err());
        assert!(reply.require_attr(login, "missing").is_err());
    }
}
