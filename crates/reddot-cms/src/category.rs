//! Categories and their keywords.
//!
//! Category and keyword lists carry complete records, so these objects never
//! fetch individually; only their lists are cached.

use reddot_rql::{ElementBuilder, Guid, Reply, XmlElement};

use crate::collection::{CacheEpoch, NameIndexedList, Named};
use crate::error::{CmsError, Result};
use crate::session::SessionHandle;

// ============================================================================
// Keyword
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    guid: Guid,
    category: Guid,
    name: String,
}

impl Keyword {
    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn category_guid(&self) -> Guid {
        self.category
    }
}

impl Named for Keyword {
    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Category
// ============================================================================

#[derive(Debug, Clone)]
pub struct Category {
    session: SessionHandle,
    project: Guid,
    guid: Guid,
    name: String,
    keywords: NameIndexedList<Keyword>,
    /// Epoch of the category list this category was listed in.
    owner: Option<CacheEpoch>,
}

impl Category {
    pub(crate) fn new(
        session: SessionHandle,
        project: Guid,
        guid: Guid,
        name: String,
        owner: Option<CacheEpoch>,
    ) -> Self {
        let keywords = {
            let session = session.clone();
            NameIndexedList::by_name(move || list_keywords(session.clone(), project, guid))
        };
        Self {
            session,
            project,
            guid,
            name,
            keywords,
            owner,
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn project_guid(&self) -> Guid {
        self.project
    }

    /// Rename the category. The new name is kept only if the server accepts it.
    pub async fn rename(&mut self, name: &str) -> Result<()> {
        let name = valid_name(name)?;
        let body = ElementBuilder::new("PROJECT").child(
            ElementBuilder::new("CATEGORY")
                .attr("action", "save")
                .attr("guid", self.guid)
                .attr("value", name),
        );
        self.session.execute_in_project(self.project, &body).await?;
        tracing::debug!("Renamed category {} to {name:?}", self.guid);
        self.name = name.to_string();
        if let Some(owner) = &self.owner {
            owner.bump();
        }
        Ok(())
    }

    pub fn keywords(&mut self) -> &mut NameIndexedList<Keyword> {
        &mut self.keywords
    }

    pub async fn add_keyword(&mut self, name: &str) -> Result<Keyword> {
        let name = valid_name(name)?;
        let body = ElementBuilder::new("PROJECT").child(
            ElementBuilder::new("CATEGORY").attr("guid", self.guid).child(
                ElementBuilder::new("KEYWORD")
                    .attr("action", "addnew")
                    .attr("value", name),
            ),
        );
        let reply = self.session.execute_in_project(self.project, &body).await?;
        self.keywords.invalidate();
        let keyword = keyword_from(&reply, reply.require("KEYWORD")?, self.guid)?;
        tracing::debug!("Added keyword {name:?} to category {}", self.guid);
        Ok(keyword)
    }

    pub async fn delete_keyword(&mut self, keyword: Guid) -> Result<()> {
        let body = ElementBuilder::new("PROJECT").child(
            ElementBuilder::new("KEYWORD")
                .attr("action", "delete")
                .attr("guid", keyword)
                .bool_attr("force", true),
        );
        self.session.execute_in_project(self.project, &body).await?;
        self.keywords.invalidate();
        tracing::debug!("Deleted keyword {keyword}");
        Ok(())
    }
}

impl Named for Category {
    fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl Eq for Category {}

fn valid_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CmsError::InvalidArgument("name must not be empty".into()));
    }
    Ok(trimmed)
}

fn keyword_from(reply: &Reply, element: &XmlElement, category: Guid) -> Result<Keyword> {
    Ok(Keyword {
        guid: reply.require_guid(element, "guid")?,
        category,
        name: reply.require_attr(element, "value")?.to_string(),
    })
}

async fn list_keywords(session: SessionHandle, project: Guid, category: Guid) -> Result<Vec<Keyword>> {
    let body = ElementBuilder::new("PROJECT").child(
        ElementBuilder::new("CATEGORY")
            .attr("guid", category)
            .child(ElementBuilder::new("KEYWORDS").attr("action", "load")),
    );
    let reply = session.execute_in_project(project, &body).await?;
    reply
        .find_all("KEYWORD")
        .into_iter()
        .map(|element| keyword_from(&reply, element, category))
        .collect()
}

// ============================================================================
// Project-level operations
// ============================================================================

pub(crate) fn category_list(
    session: SessionHandle,
    project: Guid,
    epoch: CacheEpoch,
) -> NameIndexedList<Category> {
    let owner = epoch.clone();
    NameIndexedList::by_name(move || list_categories(session.clone(), project, owner.clone()))
        .with_epoch(epoch)
}

async fn list_categories(session: SessionHandle, project: Guid, epoch: CacheEpoch) -> Result<Vec<Category>> {
    let body = ElementBuilder::new("PROJECT").child(ElementBuilder::new("CATEGORIES").attr("action", "list"));
    let reply = session.execute_in_project(project, &body).await?;
    reply
        .find_all("CATEGORY")
        .into_iter()
        .map(|element| -> Result<Category> {
            let guid = reply.require_guid(element, "guid")?;
            let name = reply.require_attr(element, "value")?.to_string();
            Ok(Category::new(session.clone(), project, guid, name, Some(epoch.clone())))
        })
        .collect()
}

pub(crate) async fn add_category(
    session: &SessionHandle,
    project: Guid,
    name: &str,
    epoch: &CacheEpoch,
) -> Result<Category> {
    let name = valid_name(name)?;
    let body = ElementBuilder::new("PROJECT").child(
        ElementBuilder::new("CATEGORY")
            .attr("action", "addnew")
            .attr("value", name),
    );
    let reply = session.execute_in_project(project, &body).await?;
    epoch.bump();
    let element = reply.require("CATEGORY")?;
    let guid = reply.require_guid(element, "guid")?;
    tracing::debug!("Added category {name:?} ({guid})");
    Ok(Category::new(session.clone(), project, guid, name.to_string(), Some(epoch.clone())))
}

pub(crate) async fn delete_category(
    session: &SessionHandle,
    project: Guid,
    category: Guid,
    epoch: &CacheEpoch,
) -> Result<()> {
    let body = ElementBuilder::new("PROJECT").child(
        ElementBuilder::new("CATEGORY")
            .attr("action", "delete")
            .attr("guid", category)
            .bool_attr("force", true),
    );
    session.execute_in_project(project, &body).await?;
    epoch.bump();
    tracing::debug!("Deleted category {category}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_name() {
        assert_eq!(valid_name("  News ").unwrap(), "News");
        assert!(matches!(valid_name("   "), Err(CmsError::InvalidArgument(_))));
    }
}
