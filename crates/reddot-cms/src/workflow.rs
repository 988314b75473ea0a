//! Workflows.

use std::future::Future;

use reddot_rql::{ElementBuilder, Guid, XmlElement};

use crate::collection::{NameIndexedList, Named};
use crate::error::{CmsError, Result};
use crate::lazy::Partial;
use crate::session::SessionHandle;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowFields {
    pub name: Option<String>,
    /// Whether the workflow applies to structural elements rather than content.
    pub is_structure_workflow: Option<bool>,
    /// Whether subpages inherit the workflow.
    pub inherit_to_subpages: Option<bool>,
}

impl WorkflowFields {
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            name: element.string_attr("name"),
            is_structure_workflow: element.bool_attr("structureworkflow"),
            inherit_to_subpages: element.bool_attr("inherit"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Workflow {
    session: SessionHandle,
    project: Guid,
    guid: Guid,
    state: Partial<WorkflowFields>,
}

impl Workflow {
    pub fn unloaded(session: SessionHandle, project: Guid, guid: Guid) -> Self {
        Self {
            session,
            project,
            guid,
            state: Partial::unloaded(),
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn known(&self) -> &WorkflowFields {
        self.state.known()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.state.is_fully_loaded()
    }

    fn fetch(&self) -> impl Future<Output = Result<WorkflowFields>> + Send + 'static {
        let session = self.session.clone();
        let project = self.project;
        let guid = self.guid;
        async move {
            let body = ElementBuilder::new("WORKFLOW").attr("action", "load").attr("guid", guid);
            let reply = session.execute_in_project(project, &body).await?;
            Ok(WorkflowFields::from_element(reply.require("WORKFLOW")?))
        }
    }

    pub async fn name(&mut self) -> Result<&str> {
        let fetch = self.fetch();
        self.state
            .get(|f| f.name.as_deref(), || fetch)
            .await?
            .ok_or(CmsError::MissingField {
                entity: "workflow",
                field: "name",
            })
    }

    pub async fn is_structure_workflow(&mut self) -> Result<bool> {
        let fetch = self.fetch();
        Ok(self
            .state
            .get(|f| f.is_structure_workflow.as_ref(), || fetch)
            .await?
            .copied()
            .unwrap_or(false))
    }

    pub async fn inherit_to_subpages(&mut self) -> Result<bool> {
        let fetch = self.fetch();
        Ok(self
            .state
            .get(|f| f.inherit_to_subpages.as_ref(), || fetch)
            .await?
            .copied()
            .unwrap_or(false))
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

impl Named for Workflow {
    fn name(&self) -> &str {
        self.state.known().name.as_deref().unwrap_or_default()
    }
}

impl PartialEq for Workflow {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl Eq for Workflow {}

pub(crate) fn workflow_list(session: SessionHandle, project: Guid) -> NameIndexedList<Workflow> {
    NameIndexedList::by_name(move || list_workflows(session.clone(), project))
}

async fn list_workflows(session: SessionHandle, project: Guid) -> Result<Vec<Workflow>> {
    let body = ElementBuilder::new("WORKFLOWS").attr("action", "list");
    let reply = session.execute_in_project(project, &body).await?;
    reply
        .find_all("WORKFLOW")
        .into_iter()
        .map(|element| -> Result<Workflow> {
            let guid = reply.require_guid(element, "guid")?;
            Ok(Workflow {
                session: session.clone(),
                project,
                guid,
                state: Partial::partial(WorkflowFields::from_element(element)),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_from_element() {
        let element = XmlElement::parse(r#"<WORKFLOW name="Review" structureworkflow="0" inherit="1"/>"#).unwrap();
        let fields = WorkflowFields::from_element(&element);
        assert_eq!(fields.name.as_deref(), Some("Review"));
        assert_eq!(fields.is_structure_workflow, Some(false));
        assert_eq!(fields.inherit_to_subpages, Some(true));
    }
}
