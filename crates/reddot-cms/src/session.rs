//! Logged-in sessions.
//!
//! A [`Session`] is the entry point of the object model. It logs in, keeps
//! the credentials the server handed out and shares them with every object
//! created from it through a cheap, clonable [`SessionHandle`].
//!
//! Requests inside a project need a session key, which the server issues
//! when the project is selected. The handle remembers the selected project
//! and re-selects transparently when an object of another project sends a
//! request.

use std::fmt;
use std::sync::Arc;

use reddot_rql::protocol::ERROR_ALREADY_LOGGED_IN;
use reddot_rql::{
    Credentials, ElementBuilder, Guid, Placeholder, Reply, RqlConnection, RqlError, RqlRequest,
    Scope, Transport, XmlElement,
};
use tokio::sync::{Mutex, MutexGuard};

use crate::collection::NameIndexedList;
use crate::config::SessionConfig;
use crate::error::{CmsError, Result};
use crate::project::{self, Project};
use crate::user::User;

// ============================================================================
// SessionHandle
// ============================================================================

#[derive(Debug, Default)]
struct SessionState {
    credentials: Credentials,
    project: Option<Guid>,
}

struct SessionInner {
    connection: RqlConnection,
    state: Mutex<SessionState>,
}

/// Shared access to a logged-in session.
///
/// Requests sent through one handle (or its clones) are serialized, so a
/// project switch can never interleave with a request of another project.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("connection", &self.inner.connection)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    fn new(connection: RqlConnection, credentials: Credentials) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                connection,
                state: Mutex::new(SessionState {
                    credentials,
                    project: None,
                }),
            }),
        }
    }

    pub fn connection(&self) -> &RqlConnection {
        &self.inner.connection
    }

    pub async fn login_guid(&self) -> Option<Guid> {
        self.inner.state.lock().await.credentials.login_guid
    }

    pub async fn selected_project(&self) -> Option<Guid> {
        self.inner.state.lock().await.project
    }

    async fn logged_in(&self) -> Result<MutexGuard<'_, SessionState>> {
        let state = self.inner.state.lock().await;
        if state.credentials.login_guid.is_none() {
            return Err(CmsError::NotLoggedIn);
        }
        Ok(state)
    }

    /// Send a request with the current credentials.
    pub async fn execute(&self, request: &RqlRequest) -> Result<Reply> {
        let state = self.logged_in().await?;
        Ok(self.inner.connection.execute(request, &state.credentials).await?)
    }

    /// Send an administration request (login GUID only).
    pub async fn execute_admin(&self, body: &ElementBuilder) -> Result<Reply> {
        self.execute(&RqlRequest::from_element(Scope::Login, body)).await
    }

    /// Send a request inside `project`, selecting it first if necessary.
    pub async fn execute_in_project(&self, project: Guid, body: &ElementBuilder) -> Result<Reply> {
        let mut state = self.logged_in().await?;
        if state.project != Some(project) || state.credentials.session_key.is_none() {
            self.validate(&mut state, project).await?;
        }
        let request = RqlRequest::from_element(Scope::Session, body);
        Ok(self.inner.connection.execute(&request, &state.credentials).await?)
    }

    /// Select `project` and obtain a session key for it.
    pub async fn select_project(&self, project: Guid) -> Result<()> {
        let mut state = self.logged_in().await?;
        self.validate(&mut state, project).await
    }

    async fn validate(&self, state: &mut SessionState, project: Guid) -> Result<()> {
        let body = ElementBuilder::new("ADMINISTRATION")
            .attr("action", "validate")
            .placeholder_attr("guid", Placeholder::LoginGuid)
            .attr("useragent", "script")
            .child(ElementBuilder::new("PROJECT").attr("guid", project));
        let request = RqlRequest::from_element(Scope::Login, &body);
        let reply = self.inner.connection.execute(&request, &state.credentials).await?;

        let server = reply.require("SERVER")?;
        let key = reply.require_attr(server, "key")?.to_string();
        state.credentials.session_key = Some(key);
        state.project = Some(project);
        tracing::info!("Selected project {project}");
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        let mut state = self.logged_in().await?;
        let body = ElementBuilder::new("ADMINISTRATION")
            .child(ElementBuilder::new("LOGOUT").placeholder_attr("guid", Placeholder::LoginGuid));
        let request = RqlRequest::from_element(Scope::Login, &body);
        self.inner.connection.execute(&request, &state.credentials).await?;

        if let Some(guid) = state.credentials.login_guid {
            tracing::info!("Logged out ({guid})");
        }
        *state = SessionState::default();
        Ok(())
    }
}

// ============================================================================
// Session
// ============================================================================

/// A logged-in user on a CMS server.
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    user: User,
    projects: NameIndexedList<Project>,
}

impl Session {
    /// Log in over SOAP/HTTP.
    pub async fn login(config: &SessionConfig) -> Result<Self> {
        let connection = RqlConnection::http(&config.http_config())?;
        Self::connect(connection, config).await
    }

    /// Log in over a caller-supplied transport.
    pub async fn with_transport(transport: Arc<dyn Transport>, config: &SessionConfig) -> Result<Self> {
        Self::connect(RqlConnection::new(transport), config).await
    }

    async fn connect(connection: RqlConnection, config: &SessionConfig) -> Result<Self> {
        let body = ElementBuilder::new("ADMINISTRATION")
            .attr("action", "login")
            .attr("name", &config.username)
            .attr("password", &config.password);
        let request = RqlRequest::from_element(Scope::Anonymous, &body).sensitive();

        let reply = match connection.execute(&request, &Credentials::default()).await {
            Ok(reply) => reply,
            Err(err) if err.server_code() == Some(ERROR_ALREADY_LOGGED_IN) => {
                return Err(already_logged_in(&err));
            }
            Err(err) => return Err(err.into()),
        };

        let login_guid = reply.require_guid(reply.require("LOGIN")?, "guid")?;
        let user_element = reply.require("USER")?;
        let user_guid = reply.require_guid(user_element, "guid")?;
        tracing::info!("Logged in as {} ({login_guid})", config.username);

        let handle = SessionHandle::new(connection, Credentials::login(login_guid));
        let user = User::from_element(handle.clone(), user_guid, user_element);
        let projects = project::project_list(handle.clone());
        let session = Self {
            handle,
            user,
            projects,
        };

        if let Some(project) = config.default_project {
            if let Err(err) = session.select_project(project).await {
                if let Err(logout) = session.handle.logout().await {
                    tracing::warn!("Logout after failed project selection failed: {logout}");
                }
                return Err(err);
            }
        }
        Ok(session)
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub async fn login_guid(&self) -> Option<Guid> {
        self.handle.login_guid().await
    }

    pub async fn selected_project(&self) -> Option<Guid> {
        self.handle.selected_project().await
    }

    /// Select a project; requests of its objects then run with its session key.
    pub async fn select_project(&self, project: Guid) -> Result<()> {
        self.handle.select_project(project).await
    }

    /// Projects visible to the logged-in user.
    pub fn projects(&mut self) -> &mut NameIndexedList<Project> {
        &mut self.projects
    }

    pub fn invalidate_projects(&mut self) {
        self.projects.invalidate();
    }

    /// A project by GUID, without fetching anything yet.
    pub fn project(&self, guid: Guid) -> Project {
        Project::unloaded(self.handle.clone(), guid)
    }

    pub fn current_user(&mut self) -> &mut User {
        &mut self.user
    }

    /// Send a raw request body. It runs in the selected project when one is
    /// selected, otherwise as an administration request.
    pub async fn execute_raw(&self, body: &str) -> Result<Reply> {
        let scope = match self.handle.selected_project().await {
            Some(_) => Scope::Session,
            None => Scope::Login,
        };
        self.handle.execute(&RqlRequest::new(scope, body)).await
    }

    /// End the login on the server. The session is unusable afterwards.
    pub async fn logout(self) -> Result<()> {
        self.handle.logout().await
    }
}

/// Turn the "already logged in" server error into its typed form, listing
/// the open logins the server reported.
fn already_logged_in(err: &RqlError) -> CmsError {
    let login_guids = err
        .response()
        .and_then(|response| XmlElement::parse(response).ok())
        .map(|root| {
            root.find_all("LOGIN")
                .into_iter()
                .filter_map(|login| login.guid_attr("guid"))
                .collect()
        })
        .unwrap_or_default();
    tracing::warn!("User is already logged in");
    CmsError::AlreadyLoggedIn { login_guids }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reddot_rql::MockTransport;

    const LOGIN_REPLY: &str = r#"<IODATA><LOGIN guid="11111111111111111111111111111111"/><USER guid="22222222222222222222222222222222" name="editor"/></IODATA>"#;
    const PROJECT: &str = "33333333333333333333333333333333";

    fn config() -> SessionConfig {
        SessionConfig::new("http://cms").with_credentials("editor", "pw")
    }

    async fn session(mock: &Arc<MockTransport>) -> Session {
        mock.on(r#"action="login""#, LOGIN_REPLY);
        Session::with_transport(mock.clone(), &config()).await.unwrap()
    }

    #[tokio::test]
    async fn test_login_stores_credentials() {
        let mock = Arc::new(MockTransport::new());
        let mut session = session(&mock).await;
        assert_eq!(
            session.login_guid().await.map(|g| g.to_string()).as_deref(),
            Some("11111111111111111111111111111111")
        );
        assert_eq!(session.current_user().known_name(), Some("editor"));
        assert!(mock.requests()[0].starts_with("<IODATA><ADMINISTRATION"));
    }

    #[tokio::test]
    async fn test_already_logged_in_lists_logins() {
        let mock = Arc::new(MockTransport::new());
        mock.on_raw(
            r#"action="login""#,
            reddot_rql::RawReply {
                body: r#"<IODATA><LOGINS><LOGIN guid="AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"/><LOGIN guid="BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB"/></LOGINS></IODATA>"#.into(),
                error: Some("#RDError101".into()),
                result_info: None,
            },
        );
        let err = Session::with_transport(mock.clone(), &config()).await.unwrap_err();
        match err {
            CmsError::AlreadyLoggedIn { login_guids } => assert_eq!(login_guids.len(), 2),
            other => panic!("expected AlreadyLoggedIn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_reply_without_login_is_unexpected() {
        let mock = Arc::new(MockTransport::new());
        mock.on(r#"action="login""#, "<IODATA/>");
        let err = Session::with_transport(mock.clone(), &config()).await.unwrap_err();
        assert!(matches!(err, CmsError::Rql(RqlError::UnexpectedResponse { .. })));
    }

    #[tokio::test]
    async fn test_project_request_selects_once() {
        let mock = Arc::new(MockTransport::new());
        let session = session(&mock).await;
        mock.on(r#"action="validate""#, r#"<IODATA><SERVER key="KEY1"/></IODATA>"#)
            .on("<X", "<IODATA/>");

        let project: Guid = PROJECT.parse().unwrap();
        let handle = session.handle();
        handle.execute_in_project(project, &ElementBuilder::new("X")).await.unwrap();
        handle.execute_in_project(project, &ElementBuilder::new("X")).await.unwrap();

        assert_eq!(mock.count(r#"action="validate""#), 1);
        assert!(mock.requests().last().unwrap().contains(r#"sessionkey="KEY1""#));
        assert_eq!(session.selected_project().await, Some(project));
    }

    #[tokio::test]
    async fn test_default_project_selected_on_login() {
        let mock = Arc::new(MockTransport::new());
        mock.on(r#"action="login""#, LOGIN_REPLY)
            .on(r#"action="validate""#, r#"<IODATA><SERVER key="K"/></IODATA>"#);
        let project: Guid = PROJECT.parse().unwrap();
        let session = Session::with_transport(mock.clone(), &config().with_default_project(project))
            .await
            .unwrap();
        assert_eq!(session.selected_project().await, Some(project));
    }

    #[tokio::test]
    async fn test_failed_default_project_logs_out() {
        let mock = Arc::new(MockTransport::new());
        mock.on(r#"action="login""#, LOGIN_REPLY)
            .on_error(r#"action="validate""#, "#RDError15")
            .on("LOGOUT", "<IODATA/>");
        let project: Guid = PROJECT.parse().unwrap();
        let err = Session::with_transport(mock.clone(), &config().with_default_project(project))
            .await
            .unwrap_err();
        assert_eq!(err.server_code(), Some(15));
        assert_eq!(mock.count("LOGOUT"), 1);
    }

    #[tokio::test]
    async fn test_execute_raw_scope_follows_selection() {
        let mock = Arc::new(MockTransport::new());
        let session = session(&mock).await;
        mock.on("<PING", "<IODATA>pong</IODATA>")
            .on(r#"action="validate""#, r#"<IODATA><SERVER key="K"/></IODATA>"#);

        session.execute_raw("<PING/>").await.unwrap();
        assert!(!mock.requests().last().unwrap().contains("sessionkey"));

        session.select_project(PROJECT.parse().unwrap()).await.unwrap();
        let reply = session.execute_raw("<PING/>").await.unwrap();
        assert_eq!(reply.root().text, "pong");
        assert!(mock.requests().last().unwrap().contains(r#"sessionkey="K""#));
    }

    #[tokio::test]
    async fn test_logout_clears_credentials() {
        let mock = Arc::new(MockTransport::new());
        let session = session(&mock).await;
        let handle = session.handle().clone();
        mock.on("LOGOUT", "<IODATA/>");

        session.logout().await.unwrap();
        assert!(mock.requests().last().unwrap().contains(
            r#"<LOGOUT guid="11111111111111111111111111111111"/>"#
        ));
        let err = handle.execute_admin(&ElementBuilder::new("X")).await.unwrap_err();
        assert!(matches!(err, CmsError::NotLoggedIn));
    }
}
