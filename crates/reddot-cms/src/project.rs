//! Projects and their collections.

use std::future::Future;

use chrono::NaiveDateTime;
use reddot_rql::{ElementBuilder, Guid, XmlElement};

use crate::category::{self, Category};
use crate::collection::{CacheEpoch, IndexedList, NameIndexedList, Named};
use crate::content_class::{self, ContentClass};
use crate::error::{CmsError, Result};
use crate::lazy::Partial;
use crate::page::{self, Page};
use crate::session::SessionHandle;
use crate::workflow::{self, Workflow};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectFields {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Lock level (`inhibitlevel`); `0` means the project is not locked.
    pub lock_level: Option<u32>,
    pub created_at: Option<NaiveDateTime>,
}

impl ProjectFields {
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            name: element.string_attr("name"),
            description: element.string_attr("description"),
            lock_level: element.parse_attr("inhibitlevel"),
            created_at: element.date_attr("createdate"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    session: SessionHandle,
    guid: Guid,
    state: Partial<ProjectFields>,
    page_epoch: CacheEpoch,
    category_epoch: CacheEpoch,
    pages: IndexedList<u32, Page>,
    content_classes: NameIndexedList<ContentClass>,
    workflows: NameIndexedList<Workflow>,
    categories: NameIndexedList<Category>,
}

impl Project {
    fn new(session: SessionHandle, guid: Guid, state: Partial<ProjectFields>) -> Self {
        let page_epoch = CacheEpoch::new();
        let category_epoch = CacheEpoch::new();
        let pages = {
            let session = session.clone();
            let epoch = page_epoch.clone();
            IndexedList::new(
                move || page::list_pages(session.clone(), guid, epoch.clone()),
                |page: &Page| page.known_id().unwrap_or_default(),
            )
            .with_epoch(page_epoch.clone())
        };
        Self {
            content_classes: content_class::content_class_list(session.clone(), guid),
            workflows: workflow::workflow_list(session.clone(), guid),
            categories: category::category_list(session.clone(), guid, category_epoch.clone()),
            pages,
            page_epoch,
            category_epoch,
            session,
            guid,
            state,
        }
    }

    /// A project known only by GUID.
    pub fn unloaded(session: SessionHandle, guid: Guid) -> Self {
        Self::new(session, guid, Partial::unloaded())
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn known(&self) -> &ProjectFields {
        self.state.known()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.state.is_fully_loaded()
    }

    fn fetch(&self) -> impl Future<Output = Result<ProjectFields>> + Send + 'static {
        let session = self.session.clone();
        let guid = self.guid;
        async move {
            let body = ElementBuilder::new("ADMINISTRATION")
                .child(ElementBuilder::new("PROJECT").attr("action", "load").attr("guid", guid));
            let reply = session.execute_admin(&body).await?;
            tracing::debug!("Loaded project {guid}");
            Ok(ProjectFields::from_element(reply.require("PROJECT")?))
        }
    }

    pub async fn name(&mut self) -> Result<&str> {
        let fetch = self.fetch();
        self.state
            .get(|f| f.name.as_deref(), || fetch)
            .await?
            .ok_or(CmsError::MissingField {
                entity: "project",
                field: "name",
            })
    }

    pub async fn description(&mut self) -> Result<Option<&str>> {
        let fetch = self.fetch();
        self.state.get(|f| f.description.as_deref(), || fetch).await
    }

    pub async fn lock_level(&mut self) -> Result<u32> {
        let fetch = self.fetch();
        Ok(self
            .state
            .get(|f| f.lock_level.as_ref(), || fetch)
            .await?
            .copied()
            .unwrap_or(0))
    }

    pub async fn is_locked(&mut self) -> Result<bool> {
        Ok(self.lock_level().await? != 0)
    }

    pub async fn created_at(&mut self) -> Result<Option<NaiveDateTime>> {
        let fetch = self.fetch();
        Ok(self.state.get(|f| f.created_at.as_ref(), || fetch).await?.copied())
    }

    pub fn invalidate(&mut self) {
        self.state.invalidate();
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let fields = self.fetch().await?;
        self.state.apply(fields);
        Ok(())
    }

    /// Select this project for the session.
    pub async fn select(&self) -> Result<()> {
        self.session.select_project(self.guid).await
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Pages of the project, indexed by page id.
    pub fn pages(&mut self) -> &mut IndexedList<u32, Page> {
        &mut self.pages
    }

    pub fn content_classes(&mut self) -> &mut NameIndexedList<ContentClass> {
        &mut self.content_classes
    }

    pub fn workflows(&mut self) -> &mut NameIndexedList<Workflow> {
        &mut self.workflows
    }

    pub fn categories(&mut self) -> &mut NameIndexedList<Category> {
        &mut self.categories
    }

    /// A page by GUID, without fetching anything yet.
    pub fn page_by_guid(&self, guid: Guid) -> Page {
        Page::new(
            self.session.clone(),
            self.guid,
            guid,
            Partial::unloaded(),
            Some(self.page_epoch.clone()),
        )
    }

    pub fn content_class_by_guid(&self, guid: Guid) -> ContentClass {
        ContentClass::unloaded(self.session.clone(), self.guid, guid)
    }

    pub fn workflow_by_guid(&self, guid: Guid) -> Workflow {
        Workflow::unloaded(self.session.clone(), self.guid, guid)
    }

    /// Create a category. The category list is fetched again on next access.
    pub async fn add_category(&mut self, name: &str) -> Result<Category> {
        category::add_category(&self.session, self.guid, name, &self.category_epoch).await
    }

    /// Delete a category and its keywords.
    pub async fn delete_category(&mut self, category: Guid) -> Result<()> {
        category::delete_category(&self.session, self.guid, category, &self.category_epoch).await
    }
}

impl Named for Project {
    fn name(&self) -> &str {
        self.state.known().name.as_deref().unwrap_or_default()
    }
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl Eq for Project {}

/// Projects visible to the logged-in user.
pub(crate) fn project_list(session: SessionHandle) -> NameIndexedList<Project> {
    NameIndexedList::by_name(move || list_projects(session.clone()))
}

async fn list_projects(session: SessionHandle) -> Result<Vec<Project>> {
    let body = ElementBuilder::new("ADMINISTRATION").child(ElementBuilder::new("PROJECTS").attr("action", "list"));
    let reply = session.execute_admin(&body).await?;
    reply
        .find_all("PROJECT")
        .into_iter()
        .map(|element| -> Result<Project> {
            let guid = reply.require_guid(element, "guid")?;
            let state = Partial::partial(ProjectFields::from_element(element));
            Ok(Project::new(session.clone(), guid, state))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_from_element() {
        let element = XmlElement::parse(
            r#"<PROJECT guid="0123456789ABCDEF0123456789ABCDEF" name="Intranet" inhibitlevel="1" createdate="36526"/>"#,
        )
        .unwrap();
        let fields = ProjectFields::from_element(&element);
        assert_eq!(fields.name.as_deref(), Some("Intranet"));
        assert_eq!(fields.lock_level, Some(1));
        assert_eq!(
            fields.created_at.map(|d| d.to_string()).as_deref(),
            Some("2000-01-01 00:00:00")
        );
    }
}
