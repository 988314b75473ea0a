//! Pages.
//!
//! Page lists only carry the GUID, id and headline of each page; everything
//! else comes from a `PAGE action="load"` request on first access.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDateTime;
use reddot_rql::{ElementBuilder, Guid, XmlElement};
use tokio::time::sleep;

use crate::collection::CacheEpoch;
use crate::content_class::ContentClass;
use crate::error::{CmsError, Result};
use crate::lazy::{LazyLoad, Partial};
use crate::session::SessionHandle;

/// Page flag set once a deleted page has arrived in the recycle bin.
pub const FLAG_IN_RECYCLE_BIN: u32 = 8192;

/// Interval between checks while waiting for a deleted page to reach the
/// recycle bin.
pub const RECYCLE_BIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageFields {
    /// Project-wide numeric page id.
    pub id: Option<u32>,
    pub headline: Option<String>,
    pub content_class_guid: Option<Guid>,
    pub status: Option<u32>,
    pub changed_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
    pub flags: Option<u32>,
}

impl PageFields {
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            id: element.parse_attr("id"),
            headline: element.string_attr("headline"),
            content_class_guid: element.guid_attr("templateguid"),
            status: element.parse_attr("status"),
            changed_at: element.date_attr("changedate"),
            created_at: element.date_attr("createdate"),
            flags: element.parse_attr("flags"),
        }
    }
}

/// Local changes not yet sent with [`Page::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
struct PendingChanges {
    headline: Option<String>,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        self.headline.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    session: SessionHandle,
    project: Guid,
    guid: Guid,
    state: Partial<PageFields>,
    pending: PendingChanges,
    content_class: LazyLoad<ContentClass>,
    /// Epoch of the page list this page was listed in.
    owner: Option<CacheEpoch>,
}

impl Page {
    pub(crate) fn new(
        session: SessionHandle,
        project: Guid,
        guid: Guid,
        state: Partial<PageFields>,
        owner: Option<CacheEpoch>,
    ) -> Self {
        Self {
            session,
            project,
            guid,
            state,
            pending: PendingChanges::default(),
            content_class: LazyLoad::new(),
            owner,
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn project_guid(&self) -> Guid {
        self.project
    }

    /// The page id, if already known.
    pub fn known_id(&self) -> Option<u32> {
        self.state.known().id
    }

    pub fn known(&self) -> &PageFields {
        self.state.known()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.state.is_fully_loaded()
    }

    fn fetch(&self) -> impl Future<Output = Result<PageFields>> + Send + 'static {
        let session = self.session.clone();
        let project = self.project;
        let guid = self.guid;
        async move {
            let body = ElementBuilder::new("PAGE").attr("action", "load").attr("guid", guid);
            let reply = session.execute_in_project(project, &body).await?;
            tracing::debug!("Loaded page {guid}");
            Ok(PageFields::from_element(reply.require("PAGE")?))
        }
    }

    fn missing(field: &'static str) -> CmsError {
        CmsError::MissingField {
            entity: "page",
            field,
        }
    }

    pub async fn id(&mut self) -> Result<u32> {
        let fetch = self.fetch();
        self.state
            .get(|f| f.id.as_ref(), || fetch)
            .await?
            .copied()
            .ok_or_else(|| Self::missing("id"))
    }

    /// The headline stored on the server (see [`Page::set_headline`]).
    pub async fn headline(&mut self) -> Result<&str> {
        let fetch = self.fetch();
        self.state
            .get(|f| f.headline.as_deref(), || fetch)
            .await?
            .ok_or_else(|| Self::missing("headline"))
    }

    pub async fn content_class_guid(&mut self) -> Result<Guid> {
        let fetch = self.fetch();
        self.state
            .get(|f| f.content_class_guid.as_ref(), || fetch)
            .await?
            .copied()
            .ok_or_else(|| Self::missing("content class"))
    }

    pub async fn status(&mut self) -> Result<Option<u32>> {
        let fetch = self.fetch();
        Ok(self.state.get(|f| f.status.as_ref(), || fetch).await?.copied())
    }

    /// Page flags; a page without flags reads as `0`.
    pub async fn flags(&mut self) -> Result<u32> {
        let fetch = self.fetch();
        Ok(self
            .state
            .get(|f| f.flags.as_ref(), || fetch)
            .await?
            .copied()
            .unwrap_or(0))
    }

    pub async fn changed_at(&mut self) -> Result<Option<NaiveDateTime>> {
        let fetch = self.fetch();
        Ok(self.state.get(|f| f.changed_at.as_ref(), || fetch).await?.copied())
    }

    pub async fn created_at(&mut self) -> Result<Option<NaiveDateTime>> {
        let fetch = self.fetch();
        Ok(self.state.get(|f| f.created_at.as_ref(), || fetch).await?.copied())
    }

    /// The content class the page is based on.
    pub async fn content_class(&mut self) -> Result<&mut ContentClass> {
        let guid = self.content_class_guid().await?;
        let session = self.session.clone();
        let project = self.project;
        self.content_class
            .get_or_load(|| async move { Ok(ContentClass::unloaded(session, project, guid)) })
            .await
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Stage a new headline; it is sent with the next [`Page::commit`].
    pub fn set_headline(&mut self, headline: impl Into<String>) {
        self.pending.headline = Some(headline.into());
    }

    pub fn pending_headline(&self) -> Option<&str> {
        self.pending.headline.as_deref()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn discard_changes(&mut self) {
        self.pending = PendingChanges::default();
    }

    /// Save staged changes.
    ///
    /// On success the new values are kept and all other fields are fetched
    /// again on next access (the server also updates the change date). On
    /// failure the staged changes and the cached fields stay as they were.
    pub async fn commit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let body = ElementBuilder::new("PAGE")
            .attr("action", "save")
            .attr("guid", self.guid)
            .attr_opt("headline", self.pending.headline.as_deref());
        self.session.execute_in_project(self.project, &body).await?;

        let pending = std::mem::take(&mut self.pending);
        let id = self.state.known().id;
        self.state.invalidate();
        self.state.update(|f| {
            f.id = id;
            if let Some(headline) = pending.headline {
                f.headline = Some(headline);
            }
        });
        self.notify_owner();
        tracing::debug!("Saved page {}", self.guid);
        Ok(())
    }

    /// Move the page to the recycle bin.
    pub async fn delete(&mut self) -> Result<()> {
        let body = ElementBuilder::new("PAGE")
            .attr("action", "delete")
            .attr("guid", self.guid)
            .bool_attr("forcedelete2910", true)
            .bool_attr("forcedelete2911", true);
        self.session.execute_in_project(self.project, &body).await?;
        self.forget();
        tracing::info!("Deleted page {}", self.guid);
        Ok(())
    }

    /// Whether the page is in the recycle bin. Always asks the server.
    pub async fn is_in_recycle_bin(&mut self) -> Result<bool> {
        self.refresh().await?;
        Ok(self.state.known().flags.unwrap_or(0) & FLAG_IN_RECYCLE_BIN != 0)
    }

    /// Delete the page and remove it from the recycle bin.
    ///
    /// The server moves deleted pages to the recycle bin asynchronously, so
    /// this polls until the page shows up there or `timeout` elapses.
    pub async fn delete_irrevocably(&mut self, timeout: Duration) -> Result<()> {
        self.delete().await?;

        let start = tokio::time::Instant::now();
        loop {
            if self.is_in_recycle_bin().await? {
                break;
            }
            if start.elapsed() > timeout {
                return Err(CmsError::Timeout {
                    what: format!("page {} to reach the recycle bin", self.guid),
                    timeout,
                });
            }
            sleep(RECYCLE_BIN_POLL_INTERVAL).await;
        }

        let body = ElementBuilder::new("PAGE")
            .attr("action", "deletefinally")
            .attr("guid", self.guid);
        self.session.execute_in_project(self.project, &body).await?;
        self.forget();
        tracing::info!("Removed page {} from the recycle bin", self.guid);
        Ok(())
    }

    /// Forget cached state after a change on the server.
    fn forget(&mut self) {
        self.state.invalidate();
        self.content_class.invalidate();
        self.notify_owner();
    }

    fn notify_owner(&self) {
        if let Some(owner) = &self.owner {
            owner.bump();
        }
    }

    pub fn invalidate(&mut self) {
        self.state.invalidate();
        self.content_class.invalidate();
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let fields = self.fetch().await?;
        self.state.apply(fields);
        Ok(())
    }
}

impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl Eq for Page {}

/// All pages of a project, as partial objects.
pub(crate) async fn list_pages(
    session: SessionHandle,
    project: Guid,
    epoch: CacheEpoch,
) -> Result<Vec<Page>> {
    let body = ElementBuilder::new("PROJECT").child(ElementBuilder::new("PAGES").attr("action", "list"));
    let reply = session.execute_in_project(project, &body).await?;
    reply
        .find_all("PAGE")
        .into_iter()
        .map(|element| -> Result<Page> {
            let guid = reply.require_guid(element, "guid")?;
            let state = Partial::partial(PageFields::from_element(element));
            Ok(Page::new(session.clone(), project, guid, state, Some(epoch.clone())))
        })
        .collect()
}
