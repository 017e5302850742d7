//! Public request and response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::schema::{DomainRecord, TeamRecord, UserRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub external_ref: Option<String>,
    pub is_active: bool,
}

impl From<TeamRecord> for Team {
    fn from(record: TeamRecord) -> Self {
        Self {
            id: record.id.to_string(),
            name: record.name,
            external_ref: record.external_ref,
            is_active: record.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub key: String,
    pub name: String,
    pub parent_domain_id: Option<String>,
    pub is_active: bool,
}

impl From<DomainRecord> for Domain {
    fn from(record: DomainRecord) -> Self {
        Self {
            id: record.id.to_string(),
            key: record.key,
            name: record.name,
            parent_domain_id: record.parent_domain_id.map(|id| id.to_string()),
            is_active: record.is_active,
        }
    }
}

/// Public user fields. Never carries the password digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id.to_string(),
            email: record.email,
            name: record.name,
            avatar_url: record.avatar_url,
            created_at: record.created_at.map(|dt| dt.0),
        }
    }
}

/// A user with its team and domain memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWithContext {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub domains: Vec<Domain>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserWithContext,
}

impl LoginResponse {
    pub fn bearer(access_token: String, user: UserWithContext) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
            user,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,
}

/// Token introspection result. Invalid tokens are reported here, never as errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    pub user: Option<UserWithContext>,
    pub error: Option<String>,
}

impl ValidateTokenResponse {
    pub fn valid(user: UserWithContext) -> Self {
        Self {
            valid: true,
            user: Some(user),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            user: None,
            error: Some(error.into()),
        }
    }
}
