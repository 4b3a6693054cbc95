//! User Aggregate

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::Author;
use crate::domain::value_objects::Role;
use crate::domain::Entity;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct User {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub version: i64,
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 1, max = 255))]
    pub first_name: String,
    #[validate(length(min = 1, max = 255))]
    pub last_name: String,
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    /// Locked accounts can be neither modified nor deleted.
    #[serde(default)]
    pub locked: bool,
}

impl User {
    pub fn new(email: impl Into<String>, first_name: impl Into<String>, last_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: None, version: 0, email: email.into(), first_name: first_name.into(), last_name: last_name.into(),
            password_hash: String::new(), role, locked: false,
        }
    }

    pub fn full_name(&self) -> String { format!("{} {}", self.first_name, self.last_name) }

    /// `None` until the user has been saved.
    pub fn author(&self) -> Option<Author> {
        Some(Author { id: self.id?, name: self.full_name() })
    }

    /// Identity comparison; unsaved users are never the same account.
    pub fn is_same_account(&self, other: &User) -> bool {
        matches!((self.id, other.id), (Some(a), Some(b)) if a == b)
    }
}

impl Entity for User {
    const NAME: &'static str = "User";
    fn id(&self) -> Option<Uuid> { self.id }
    fn version(&self) -> i64 { self.version }
    fn stamp(&mut self, id: Uuid, version: i64) { self.id = Some(id); self.version = version; }
}
