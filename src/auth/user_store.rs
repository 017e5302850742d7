//! User, team and domain storage.

use anyhow::Result;
use surrealdb::RecordId;
use tracing::debug;

use crate::db::Db;
use crate::db::schema::{
    DomainCreate, DomainRecord, TeamCreate, TeamMembershipRecord, TeamRecord, UserCreate,
    UserDomainRecord, UserRecord,
};

const CREATE_ATTEMPTS: u32 = 5;

/// Record id of the user owning `email`.
pub fn user_record_id(email: &str) -> RecordId {
    RecordId::from_table_key("user", email)
}

/// Outcome of inserting a user whose email may already be taken.
#[derive(Debug, Clone)]
pub enum UserInsert {
    /// This call created the row.
    Created(UserRecord),
    /// Another writer owns the email; this is its row.
    Existing(UserRecord),
}

impl UserInsert {
    pub fn into_user(self) -> UserRecord {
        match self {
            Self::Created(user) | Self::Existing(user) => user,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// User store for database operations.
#[derive(Clone)]
pub struct UserStore {
    db: Db,
}

impl UserStore {
    /// Create a new user store.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Get reference to the database.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Get a user by email.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.get_user_by_id(&user_record_id(email)).await
    }

    /// Get a user by database ID.
    pub async fn get_user_by_id(&self, user_id: &RecordId) -> Result<Option<UserRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM $id")
            .bind(("id", user_id.clone()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Create a user.
    ///
    /// The row id is derived from the email, so concurrent creations of the
    /// same email collide on the record itself and exactly one commits. The
    /// loser gets back the winner's row as [`UserInsert::Existing`]. A
    /// conflict with a creation that has not committed yet is retried.
    pub async fn create_user(&self, create: &UserCreate) -> Result<UserInsert> {
        let mut attempt = 1;
        loop {
            match self.insert_user(create).await {
                Ok(user) => return Ok(UserInsert::Created(user)),
                Err(err) => {
                    if let Some(existing) = self.find_user_by_email(&create.email).await? {
                        debug!("User {} already exists, using existing row", existing.id);
                        return Ok(UserInsert::Existing(existing));
                    }
                    if attempt >= CREATE_ATTEMPTS {
                        return Err(err);
                    }
                    debug!("User insert conflicted (attempt {}): {}", attempt, err);
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    async fn insert_user(&self, create: &UserCreate) -> Result<UserRecord> {
        let query = r#"
            CREATE type::thing('user', $email) CONTENT {
                email: $email,
                name: $name,
                password_hash: $password_hash
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("email", create.email.clone()))
            .bind(("name", create.name.clone()))
            .bind(("password_hash", create.password_hash.clone()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Failed to create user"))
    }

    /// Replace a user's display name.
    pub async fn update_user_name(&self, user_id: &RecordId, name: &str) -> Result<UserRecord> {
        let query = "UPDATE $id SET name = $name";

        let mut res = self
            .db
            .query(query)
            .bind(("id", user_id.clone()))
            .bind(("name", name.to_string()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("User {} disappeared during update", user_id))
    }

    /// Get a team by its unique name.
    pub async fn find_team_by_name(&self, name: &str) -> Result<Option<TeamRecord>> {
        let query = "SELECT * FROM team WHERE name = $name LIMIT 1";

        let mut res = self
            .db
            .query(query)
            .bind(("name", name.to_string()))
            .await?;

        let teams: Vec<TeamRecord> = res.take(0)?;
        Ok(teams.into_iter().next())
    }

    /// Get a domain by its unique key.
    pub async fn find_domain_by_key(&self, key: &str) -> Result<Option<DomainRecord>> {
        let query = "SELECT * FROM domain WHERE domain_key = $key LIMIT 1";

        let mut res = self
            .db
            .query(query)
            .bind(("key", key.to_string()))
            .await?;

        let domains: Vec<DomainRecord> = res.take(0)?;
        Ok(domains.into_iter().next())
    }

    /// Insert a team unless one with the same name exists. Existing rows are left as is.
    pub async fn upsert_team(&self, create: &TeamCreate) -> Result<TeamRecord> {
        if let Some(team) = self.find_team_by_name(&create.name).await? {
            return Ok(team);
        }

        match self.insert_team(create).await {
            Ok(team) => Ok(team),
            Err(err) => self.find_team_by_name(&create.name).await?.ok_or(err),
        }
    }

    async fn insert_team(&self, create: &TeamCreate) -> Result<TeamRecord> {
        let query = r#"
            CREATE team CONTENT {
                name: $name,
                external_ref: $external_ref,
                is_active: $is_active
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("name", create.name.clone()))
            .bind(("external_ref", create.external_ref.clone()))
            .bind(("is_active", create.is_active))
            .await?;

        let teams: Vec<TeamRecord> = res.take(0)?;
        teams
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Failed to create team {}", create.name))
    }

    /// Insert a domain unless one with the same key exists. Existing rows are left as is.
    pub async fn upsert_domain(&self, create: &DomainCreate) -> Result<DomainRecord> {
        if let Some(domain) = self.find_domain_by_key(&create.key).await? {
            return Ok(domain);
        }

        match self.insert_domain(create).await {
            Ok(domain) => Ok(domain),
            Err(err) => self.find_domain_by_key(&create.key).await?.ok_or(err),
        }
    }

    async fn insert_domain(&self, create: &DomainCreate) -> Result<DomainRecord> {
        let query = r#"
            CREATE domain CONTENT {
                domain_key: $key,
                name: $name,
                parent_domain_id: $parent_domain_id,
                is_active: $is_active
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("key", create.key.clone()))
            .bind(("name", create.name.clone()))
            .bind(("parent_domain_id", create.parent_domain_id.clone()))
            .bind(("is_active", create.is_active))
            .await?;

        let domains: Vec<DomainRecord> = res.take(0)?;
        domains
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Failed to create domain {}", create.key))
    }

    /// Attach a user to a team. At most one row exists per pair.
    ///
    /// The row id is derived from the pair, so repeated calls rewrite the same
    /// record. A write that loses a concurrent race succeeds as long as the
    /// winner's row is visible afterwards.
    pub async fn upsert_team_membership(&self, user_id: &RecordId, team_id: &RecordId) -> Result<()> {
        let query = r#"
            UPSERT type::thing('team_membership', [$user_id, $team_id]) SET
                user_id = $user_id,
                team_id = $team_id
        "#;

        let written = self
            .db
            .query(query)
            .bind(("user_id", user_id.clone()))
            .bind(("team_id", team_id.clone()))
            .await
            .and_then(|res| res.check());

        if let Err(err) = written {
            let existing = self
                .list_team_memberships(user_id)
                .await?
                .into_iter()
                .any(|m| &m.team_id == team_id);
            if !existing {
                return Err(err.into());
            }
            debug!("Team membership for {} already present", user_id);
        }

        Ok(())
    }

    /// Attach a user to a domain. At most one row exists per pair.
    pub async fn upsert_user_domain(&self, user_id: &RecordId, domain_id: &RecordId) -> Result<()> {
        let query = r#"
            UPSERT type::thing('user_domain', [$user_id, $domain_id]) SET
                user_id = $user_id,
                domain_id = $domain_id
        "#;

        let written = self
            .db
            .query(query)
            .bind(("user_id", user_id.clone()))
            .bind(("domain_id", domain_id.clone()))
            .await
            .and_then(|res| res.check());

        if let Err(err) = written {
            let existing = self
                .list_user_domain_links(user_id)
                .await?
                .into_iter()
                .any(|link| &link.domain_id == domain_id);
            if !existing {
                return Err(err.into());
            }
            debug!("Domain link for {} already present", user_id);
        }

        Ok(())
    }

    /// All team membership rows of a user.
    pub async fn list_team_memberships(&self, user_id: &RecordId) -> Result<Vec<TeamMembershipRecord>> {
        let query = "SELECT * FROM team_membership WHERE user_id = $user_id";

        let mut res = self
            .db
            .query(query)
            .bind(("user_id", user_id.clone()))
            .await?;

        let memberships: Vec<TeamMembershipRecord> = res.take(0)?;
        Ok(memberships)
    }

    /// All domain link rows of a user.
    pub async fn list_user_domain_links(&self, user_id: &RecordId) -> Result<Vec<UserDomainRecord>> {
        let query = "SELECT * FROM user_domain WHERE user_id = $user_id";

        let mut res = self
            .db
            .query(query)
            .bind(("user_id", user_id.clone()))
            .await?;

        let links: Vec<UserDomainRecord> = res.take(0)?;
        Ok(links)
    }

    /// Fetch teams by id. Unknown ids are skipped.
    pub async fn teams_by_ids(&self, ids: Vec<RecordId>) -> Result<Vec<TeamRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = "SELECT * FROM team WHERE id IN $ids ORDER BY name";

        let mut res = self.db.query(query).bind(("ids", ids)).await?;

        let teams: Vec<TeamRecord> = res.take(0)?;
        Ok(teams)
    }

    /// Fetch domains by id. Unknown ids are skipped.
    pub async fn domains_by_ids(&self, ids: Vec<RecordId>) -> Result<Vec<DomainRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = "SELECT * FROM domain WHERE id IN $ids ORDER BY domain_key";

        let mut res = self.db.query(query).bind(("ids", ids)).await?;

        let domains: Vec<DomainRecord> = res.take(0)?;
        Ok(domains)
    }

    /// Teams the user is a member of.
    pub async fn teams_for_user(&self, user_id: &RecordId) -> Result<Vec<TeamRecord>> {
        let ids = self
            .list_team_memberships(user_id)
            .await?
            .into_iter()
            .map(|m| m.team_id)
            .collect();
        self.teams_by_ids(ids).await
    }

    /// Domains the user is linked to.
    pub async fn domains_for_user(&self, user_id: &RecordId) -> Result<Vec<DomainRecord>> {
        let ids = self
            .list_user_domain_links(user_id)
            .await?
            .into_iter()
            .map(|link| link.domain_id)
            .collect();
        self.domains_by_ids(ids).await
    }

    /// Every active team, for selection UIs.
    pub async fn list_active_teams(&self) -> Result<Vec<TeamRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM team WHERE is_active = true ORDER BY name")
            .await?;

        let teams: Vec<TeamRecord> = res.take(0)?;
        Ok(teams)
    }

    /// Every active domain, for selection UIs.
    pub async fn list_active_domains(&self) -> Result<Vec<DomainRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM domain WHERE is_active = true ORDER BY domain_key")
            .await?;

        let domains: Vec<DomainRecord> = res.take(0)?;
        Ok(domains)
    }
}
