use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StarAction {
    Created,
    Deleted,
}

impl StarAction {
    /// Parses the `action` field of a `star` payload, `None` for actions we don't announce.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "created" => Some(Self::Created),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: GitHubUser,
    pub stargazers_count: u64,
}

impl Repository {
    /// `owner/name`, as GitHub displays it.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner.login, self.name)
    }
}

/// Payload of a `star` event, someone starred or unstarred a repository.
///
/// On `deleted`, `stargazers_count` is already decremented.
#[derive(Debug, Deserialize)]
pub struct StarEvent {
    pub action: StarAction,
    pub repository: Repository,
    pub sender: GitHubUser,
}
