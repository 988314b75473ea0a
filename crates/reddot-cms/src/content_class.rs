//! Content classes (page templates).

use std::future::Future;

use reddot_rql::{ElementBuilder, Guid, XmlElement};

use crate::collection::{NameIndexedList, Named};
use crate::error::{CmsError, Result};
use crate::lazy::Partial;
use crate::session::SessionHandle;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentClassFields {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Content-class folder the class lives in.
    pub folder_guid: Option<Guid>,
}

impl ContentClassFields {
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            name: element.string_attr("name"),
            description: element.string_attr("description"),
            folder_guid: element.guid_attr("folderguid"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentClass {
    session: SessionHandle,
    project: Guid,
    guid: Guid,
    state: Partial<ContentClassFields>,
}

impl ContentClass {
    pub fn unloaded(session: SessionHandle, project: Guid, guid: Guid) -> Self {
        Self {
            session,
            project,
            guid,
            state: Partial::unloaded(),
        }
    }

    pub(crate) fn listed(session: SessionHandle, project: Guid, guid: Guid, element: &XmlElement) -> Self {
        Self {
            session,
            project,
            guid,
            state: Partial::partial(ContentClassFields::from_element(element)),
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn known(&self) -> &ContentClassFields {
        self.state.known()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.state.is_fully_loaded()
    }

    fn fetch(&self) -> impl Future<Output = Result<ContentClassFields>> + Send + 'static {
        let session = self.session.clone();
        let project = self.project;
        let guid = self.guid;
        async move {
            let body = ElementBuilder::new("TEMPLATE").attr("action", "load").attr("guid", guid);
            let reply = session.execute_in_project(project, &body).await?;
            Ok(ContentClassFields::from_element(reply.require("TEMPLATE")?))
        }
    }

    pub async fn name(&mut self) -> Result<&str> {
        let fetch = self.fetch();
        self.state
            .get(|f| f.name.as_deref(), || fetch)
            .await?
            .ok_or(CmsError::MissingField {
                entity: "content class",
                field: "name",
            })
    }

    pub async fn description(&mut self) -> Result<Option<&str>> {
        let fetch = self.fetch();
        self.state.get(|f| f.description.as_deref(), || fetch).await
    }

    pub async fn folder_guid(&mut self) -> Result<Option<Guid>> {
        let fetch = self.fetch();
        Ok(self.state.get(|f| f.folder_guid.as_ref(), || fetch).await?.copied())
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

impl Named for ContentClass {
    fn name(&self) -> &str {
        self.state.known().name.as_deref().unwrap_or_default()
    }
}

impl PartialEq for ContentClass {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl Eq for ContentClass {}

pub(crate) fn content_class_list(session: SessionHandle, project: Guid) -> NameIndexedList<ContentClass> {
    NameIndexedList::by_name(move || list_content_classes(session.clone(), project))
}

async fn list_content_classes(session: SessionHandle, project: Guid) -> Result<Vec<ContentClass>> {
    let body = ElementBuilder::new("TEMPLATES").attr("action", "list");
    let reply = session.execute_in_project(project, &body).await?;
    reply
        .find_all("TEMPLATE")
        .into_iter()
        .map(|element| -> Result<ContentClass> {
            let guid = reply.require_guid(element, "guid")?;
            Ok(ContentClass::listed(session.clone(), project, guid, element))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_from_element() {
        let element = XmlElement::parse(
            r#"<TEMPLATE guid="0123456789ABCDEF0123456789ABCDEF" name="Article" description="" folderguid="AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"/>"#,
        )
        .unwrap();
        let fields = ContentClassFields::from_element(&element);
        assert_eq!(fields.name.as_deref(), Some("Article"));
        assert_eq!(fields.description, None);
        assert!(fields.folder_guid.is_some());
    }
}
