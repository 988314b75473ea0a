//! CMS users.

use std::future::Future;

use reddot_rql::{ElementBuilder, Guid, XmlElement};

use crate::error::{CmsError, Result};
use crate::lazy::Partial;
use crate::session::SessionHandle;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFields {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    /// Language of the user interface, e.g. `ENG` or `DEU`.
    pub language: Option<String>,
}

impl UserFields {
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            name: element.string_attr("name"),
            full_name: element.string_attr("fullname"),
            email: element.string_attr("email"),
            language: element.string_attr("userlanguage"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    session: SessionHandle,
    guid: Guid,
    state: Partial<UserFields>,
}

impl User {
    /// A user known only by GUID.
    pub fn unloaded(session: SessionHandle, guid: Guid) -> Self {
        Self {
            session,
            guid,
            state: Partial::unloaded(),
        }
    }

    /// A user seen in a reply that carries some of its attributes.
    pub fn from_element(session: SessionHandle, guid: Guid, element: &XmlElement) -> Self {
        Self {
            session,
            guid,
            state: Partial::partial(UserFields::from_element(element)),
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn known_name(&self) -> Option<&str> {
        self.state.known().name.as_deref()
    }

    fn fetch(&self) -> impl Future<Output = Result<UserFields>> + Send + 'static {
        let session = self.session.clone();
        let guid = self.guid;
        async move {
            let body = ElementBuilder::new("ADMINISTRATION")
                .child(ElementBuilder::new("USER").attr("action", "load").attr("guid", guid));
            let reply = session.execute_admin(&body).await?;
            Ok(UserFields::from_element(reply.require("USER")?))
        }
    }

    pub async fn name(&mut self) -> Result<&str> {
        let fetch = self.fetch();
        self.state
            .get(|f| f.name.as_deref(), || fetch)
            .await?
            .ok_or(CmsError::MissingField {
                entity: "user",
                field: "name",
            })
    }

    pub async fn full_name(&mut self) -> Result<Option<&str>> {
        let fetch = self.fetch();
        self.state.get(|f| f.full_name.as_deref(), || fetch).await
    }

    pub async fn email(&mut self) -> Result<Option<&str>> {
        let fetch = self.fetch();
        self.state.get(|f| f.email.as_deref(), || fetch).await
    }

    pub async fn language(&mut self) -> Result<Option<&str>> {
        let fetch = self.fetch();
        self.state.get(|f| f.language.as_deref(), || fetch).await
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.state.is_fully_loaded()
    }

    pub fn invalidate(&mut self) {
        self.state.invalidate();
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let fields = self.fetch().await?;
        self.state.apply(fields);
        Ok(())
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl Eq for User {}
