//! Session configuration.

use std::fmt;
use std::time::Duration;

use reddot_rql::transport::{DEFAULT_SERVICE_URL, USER_AGENT_VALUE};
use reddot_rql::{Guid, HttpConfig};

use crate::error::{CmsError, Result};

/// Environment variable holding the RQL web-service URL.
pub const ENV_URL: &str = "REDDOT_URL";
/// Environment variable holding the login name.
pub const ENV_USER: &str = "REDDOT_USER";
/// Environment variable holding the password.
pub const ENV_PASSWORD: &str = "REDDOT_PASSWORD";
/// Environment variable holding the GUID of the project to select after login.
pub const ENV_PROJECT: &str = "REDDOT_PROJECT";
/// Environment variable holding the request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "REDDOT_TIMEOUT_SECS";

/// Connection and login settings for a [`Session`](crate::Session).
#[derive(Clone, PartialEq)]
pub struct SessionConfig {
    /// URL of the RQL web service.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Timeout for a single request. Default: 60 seconds.
    pub timeout: Duration,
    pub user_agent: String,
    /// Project selected right after login, if any.
    pub default_project: Option<Guid>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVICE_URL.to_string(),
            username: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(60),
            user_agent: USER_AGENT_VALUE.to_string(),
            default_project: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("default_project", &self.default_project)
            .finish()
    }
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_default_project(mut self, project: Guid) -> Self {
        self.default_project = Some(project);
        self
    }

    /// Read the configuration from `REDDOT_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_URL) {
            config.url = url;
        }
        if let Some(user) = lookup(ENV_USER) {
            config.username = user;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            config.password = password;
        }
        if let Some(project) = lookup(ENV_PROJECT).filter(|p| !p.trim().is_empty()) {
            let guid = project
                .trim()
                .parse()
                .map_err(|_| CmsError::Config(format!("{ENV_PROJECT} is not a GUID: {project:?}")))?;
            config.default_project = Some(guid);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                CmsError::Config(format!("{ENV_TIMEOUT_SECS} is not a number of seconds: {secs:?}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Transport settings derived from this configuration.
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            url: self.url.clone(),
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.url, DEFAULT_SERVICE_URL);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.default_project.is_none());
    }

    #[test]
    fn test_from_env_reads_all_variables() {
        let config = SessionConfig::from_lookup(lookup(&[
            (ENV_URL, "https://cms.example.com/CMS/WebService/RqlWebService.svc"),
            (ENV_USER, "editor"),
            (ENV_PASSWORD, "s3cret"),
            (ENV_PROJECT, "0123456789abcdef0123456789abcdef"),
            (ENV_TIMEOUT_SECS, "5"),
        ]))
        .unwrap();
        assert_eq!(config.username, "editor");
        assert_eq!(config.password, "s3cret");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(
            config.default_project.map(|g| g.to_string()).as_deref(),
            Some("0123456789ABCDEF0123456789ABCDEF")
        );
    }

    #[test]
    fn test_from_env_rejects_bad_values() {
        let err = SessionConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert!(matches!(err, CmsError::Config(_)));

        let err = SessionConfig::from_lookup(lookup(&[(ENV_PROJECT, "not-a-guid")])).unwrap_err();
        assert!(matches!(err, CmsError::Config(_)));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = SessionConfig::new("http://cms").with_credentials("u", "topsecret");
        assert!(!format!("{config:?}").contains("topsecret"));
    }

    #[test]
    fn test_http_config() {
        let config = SessionConfig::new("http://cms/rql").with_timeout(Duration::from_secs(9));
        let http = config.http_config();
        assert_eq!(http.url, "http://cms/rql");
        assert_eq!(http.timeout, Duration::from_secs(9));
    }
}
