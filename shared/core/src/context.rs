use serde::{Deserialize, Serialize};

/// Addressing tuple for all Learning Loop paths: `/{organization}/projects/{project}/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    pub organization: String,
    pub project: String,
}

impl Context {
    pub fn new(organization: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
        }
    }
}
