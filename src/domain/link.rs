use crate::domain::user::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A link shared by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub description: String,
    pub url: String,
    pub posted_by: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub description: String,
    pub url: String,
    pub posted_by: Option<UserId>,
}

impl NewLink {
    pub fn into_link(self, id: LinkId) -> Link {
        Link {
            id,
            description: self.description,
            url: self.url,
            posted_by: self.posted_by,
        }
    }
}
