use serde::{Deserialize, Serialize};
use surrealdb::{RecordId, sql::Datetime};

/// Persisted user identity. `email` is the natural key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Database identifier (table: `user`)
    pub id: RecordId,
    /// Unique email, the only cross-system identity key
    pub email: String,
    /// Display name
    pub name: String,
    /// Password digest; absent for provisioned accounts
    pub password_hash: Option<String>,
    /// Optional avatar URL
    pub avatar_url: Option<String>,
    /// Set once at creation
    pub created_at: Option<Datetime>,
}

/// Payload for creating a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
}

/// Static team reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRecord {
    pub id: RecordId,
    pub name: String,
    pub external_ref: Option<String>,
    pub is_active: bool,
}

/// Payload used when seeding a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamCreate {
    pub name: String,
    pub external_ref: Option<String>,
    pub is_active: bool,
}

/// Static domain reference data. Domains may nest through `parent_domain_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: RecordId,
    /// Unique domain key, e.g. "engineering"
    #[serde(rename = "domain_key")]
    pub key: String,
    pub name: String,
    pub parent_domain_id: Option<RecordId>,
    pub is_active: bool,
}

/// Payload used when seeding a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainCreate {
    pub key: String,
    pub name: String,
    pub parent_domain_id: Option<RecordId>,
    pub is_active: bool,
}

/// Link between a user and a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMembershipRecord {
    pub id: RecordId,
    pub user_id: RecordId,
    pub team_id: RecordId,
}

/// Link between a user and a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDomainRecord {
    pub id: RecordId,
    pub user_id: RecordId,
    pub domain_id: RecordId,
}
