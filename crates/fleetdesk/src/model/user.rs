//! Users, roles and the acting identity passed into workflow calls.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{non_blank, ParseLabelError};
use crate::error::{Error, Result};

/// What a user is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Fleet administrator.
    Admin,
    /// May be assigned to trips.
    Driver,
    /// May book vehicles but not drive them.
    #[default]
    Other,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Driver => write!(f, "driver"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl FromStr for Role {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "driver" => Ok(Self::Driver),
            "other" => Ok(Self::Other),
            _ => Err(ParseLabelError {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// A person known to the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Email address or generated identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Contact email, when the id is not already one.
    pub email: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Role used for gating.
    pub role: Role,
    /// Inactive users cannot drive.
    pub active: bool,
    /// Credential material; opaque to fleetdesk.
    #[serde(skip_serializing)]
    pub credential: Option<String>,
    /// When the user was registered.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this user administers the fleet.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this user may be assigned to a departing trip.
    #[must_use]
    pub fn can_drive(&self) -> bool {
        self.active && self.role == Role::Driver
    }
}

/// Input for registering a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    /// Explicit id; defaults to the email, then to a generated id.
    pub id: Option<String>,
    /// Display name (required).
    pub name: String,
    /// Email address.
    pub email: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Role.
    pub role: Role,
    /// Credential material as supplied by the caller.
    pub credential: Option<String>,
}

impl NewUser {
    /// Validate the input and build an active user.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the name is blank or the email is not an
    /// address.
    pub fn into_user(self, now: DateTime<Utc>) -> Result<User> {
        let name = non_blank(Some(&self.name)).ok_or_else(|| Error::validation("name is required"))?;
        let email = non_blank(self.email.as_deref()).map(|e| e.to_lowercase());
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(Error::validation(format!("invalid email address: {email}")));
            }
        }
        let id = non_blank(self.id.as_deref())
            .or_else(|| email.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(User {
            id,
            name,
            email,
            phone: non_blank(self.phone.as_deref()),
            role: self.role,
            active: true,
            credential: self.credential,
            created_at: now,
        })
    }
}

/// Changes a user may make to their own profile. `None` leaves a field
/// unchanged; a blank phone clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileEdit {
    /// Display name, at least three characters.
    pub name: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
}

impl ProfileEdit {
    /// Shortest accepted display name.
    pub const MIN_NAME_LEN: usize = 3;

    /// A copy of `user` with the edit applied.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the name is blank or too short.
    pub fn applied_to(&self, user: &User) -> Result<User> {
        let mut edited = user.clone();
        if let Some(name) = &self.name {
            let name = non_blank(Some(name)).ok_or_else(|| Error::validation("name is required"))?;
            if name.chars().count() < Self::MIN_NAME_LEN {
                return Err(Error::validation(format!(
                    "name must have at least {} characters",
                    Self::MIN_NAME_LEN
                )));
            }
            edited.name = name;
        }
        if let Some(phone) = &self.phone {
            edited.phone = non_blank(Some(phone));
        }
        Ok(edited)
    }
}

/// The identity on whose behalf a workflow operation runs.
///
/// Session handling lives outside fleetdesk; front ends build an actor from the
/// authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// User id.
    pub id: String,
    /// User role.
    pub role: Role,
}

impl Actor {
    /// Build an actor directly.
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Whether the actor is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self::new(user.id.clone(), user.role)
    }
}
