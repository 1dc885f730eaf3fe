//! Stack addressing: the (organization, project, stack) triple and the API paths derived from it.

use std::fmt;

/// Identifies one stack. Identifiers are opaque; no format validation is done here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRef {
    pub organization: String,
    pub project: String,
    pub stack: String,
}

impl StackRef {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        stack: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            stack: stack.into(),
        }
    }

    /// `preview/{org}/{project}/{stack}/deployments`
    pub fn deployments_path(&self) -> String {
        format!(
            "preview/{}/{}/{}/deployments",
            self.organization, self.project, self.stack
        )
    }

    /// `preview/{org}/{project}/{stack}/deployments/{id}`
    pub fn deployment_path(&self, id: &str) -> String {
        format!("{}/{}", self.deployments_path(), id)
    }

    /// `stacks/{org}/{project}`; the stack name travels in the request body.
    pub fn stacks_path(&self) -> String {
        format!("stacks/{}/{}", self.organization, self.project)
    }
}

impl fmt::Display for StackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.project, self.stack)
    }
}
