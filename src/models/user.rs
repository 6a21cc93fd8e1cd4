// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

/// Profile obtained from a verified identity assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedIdentity {
    /// Stable subject identifier issued by the provider.
    pub subject: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    /// Hosted domain, set for workspace accounts.
    pub hosted_domain: Option<String>,
}

/// A site user. Guests carry no federated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub federated: Option<FederatedIdentity>,
}

impl User {
    pub fn guest(id: i64) -> Self {
        Self {
            id,
            federated: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.federated.is_none()
    }

    pub fn subject(&self) -> Option<&str> {
        self.federated.as_ref().map(|f| f.subject.as_str())
    }

    pub fn email(&self) -> Option<&str> {
        self.federated.as_ref().and_then(|f| f.email.as_deref())
    }
}

/// Row shape of the 'users' table as read back by queries.
#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub profile: Option<Json<FederatedIdentity>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            federated: row.profile.map(|Json(profile)| profile),
        }
    }
}
