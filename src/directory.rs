//! Collaborators the booking core calls into: who a user is, and who is
//! making a request. Credential storage and token signing live elsewhere;
//! `MemoryDirectory` is the in-process implementation used at bootstrap
//! and in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::engine::BookingError;
use crate::model::{Department, DepartmentId, Identity, User, UserId};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup_user(&self, user_id: UserId) -> Result<Option<User>, BookingError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, BookingError>;
}

/// What a caller presents to prove who it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, BookingError>;
}

#[derive(Default)]
pub struct MemoryDirectory {
    users: DashMap<UserId, User>,
    by_email: DashMap<String, UserId>,
    sessions: DashMap<String, UserId>,
    departments: DashMap<DepartmentId, Department>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the email is taken. Returns whether the user was added.
    pub fn insert_user(&self, user: User) -> bool {
        match self.by_email.entry(normalize_email(&user.email)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(user.id);
                self.users.insert(user.id, user);
                true
            }
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn insert_department(&self, department: Department) {
        self.departments.insert(department.id, department);
    }

    /// Ordered by id.
    pub fn departments(&self) -> Vec<Department> {
        let mut out: Vec<Department> = self.departments.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|d| d.id);
        out
    }

    /// Issue an opaque bearer token for a known user.
    pub fn open_session(&self, user_id: UserId) -> Result<String, BookingError> {
        if !self.users.contains_key(&user_id) {
            return Err(BookingError::NotFound {
                kind: "user",
                key: user_id.to_string(),
            });
        }
        let token = Ulid::new().to_string();
        self.sessions.insert(token.clone(), user_id);
        Ok(token)
    }

    pub fn close_session(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn lookup_user(&self, user_id: UserId) -> Result<Option<User>, BookingError> {
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, BookingError> {
        let Some(id) = self.by_email.get(&normalize_email(email)).map(|e| *e.value()) else {
            return Ok(None);
        };
        self.lookup_user(id).await
    }
}

#[async_trait]
impl IdentityService for MemoryDirectory {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, BookingError> {
        let Credentials::Bearer(token) = credentials;
        let user_id = self
            .sessions
            .get(token.trim())
            .map(|e| *e.value())
            .ok_or(BookingError::Unauthenticated)?;
        // A session can outlive its user.
        let user = self
            .users
            .get(&user_id)
            .ok_or(BookingError::Unauthenticated)?;
        Ok(user.identity())
    }
}
