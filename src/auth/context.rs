//! User context for response payloads.

use anyhow::Result;

use crate::auth::user_store::UserStore;
use crate::db::schema::UserRecord;
use crate::model::{Domain, Team, User, UserWithContext};

/// Joins a resolved user to its team and domain memberships.
///
/// Pure read. Membership rows pointing at missing teams or domains are
/// skipped.
#[derive(Clone)]
pub struct ContextAssembler {
    store: UserStore,
}

impl ContextAssembler {
    pub fn new(store: UserStore) -> Self {
        Self { store }
    }

    /// Build the public view of `user` with its memberships.
    pub async fn assemble(&self, user: &UserRecord) -> Result<UserWithContext> {
        let teams = self.teams(user).await?;
        let domains = self.domains(user).await?;

        Ok(UserWithContext {
            user: User::from(user.clone()),
            teams,
            domains,
        })
    }

    /// Teams the user belongs to.
    pub async fn teams(&self, user: &UserRecord) -> Result<Vec<Team>> {
        let teams = self.store.teams_for_user(&user.id).await?;
        Ok(teams.into_iter().map(Team::from).collect())
    }

    /// Domains the user is linked to.
    pub async fn domains(&self, user: &UserRecord) -> Result<Vec<Domain>> {
        let domains = self.store.domains_for_user(&user.id).await?;
        Ok(domains.into_iter().map(Domain::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::UserCreate;
    use crate::db::{DEFAULT_DOMAIN_KEY, DEFAULT_TEAM_NAME};
    use crate::test_support::seeded_db;

    async fn create(store: &UserStore, email: &str) -> UserRecord {
        store
            .create_user(&UserCreate {
                email: email.to_string(),
                name: "Alice".to_string(),
                password_hash: Some("digest".to_string()),
            })
            .await
            .unwrap()
            .into_user()
    }

    #[tokio::test]
    async fn test_assemble_without_memberships() {
        let store = UserStore::new(seeded_db().await);
        let user = create(&store, "a@x.com").await;

        let ctx = ContextAssembler::new(store).assemble(&user).await.unwrap();
        assert_eq!(ctx.user.email, "a@x.com");
        assert_eq!(ctx.user.id, user.id.to_string());
        assert!(ctx.user.created_at.is_some());
        assert!(ctx.teams.is_empty());
        assert!(ctx.domains.is_empty());
    }

    #[tokio::test]
    async fn test_assemble_joins_memberships() {
        let store = UserStore::new(seeded_db().await);
        let user = create(&store, "a@x.com").await;

        let general = store.find_team_by_name(DEFAULT_TEAM_NAME).await.unwrap().unwrap();
        let design = store.find_team_by_name("Design").await.unwrap().unwrap();
        let eng = store.find_domain_by_key(DEFAULT_DOMAIN_KEY).await.unwrap().unwrap();
        store.upsert_team_membership(&user.id, &general.id).await.unwrap();
        store.upsert_team_membership(&user.id, &design.id).await.unwrap();
        store.upsert_user_domain(&user.id, &eng.id).await.unwrap();

        let ctx = ContextAssembler::new(store).assemble(&user).await.unwrap();

        let mut names: Vec<_> = ctx.teams.iter().map(|t| t.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["Design", "General"]);
        assert_eq!(ctx.domains.len(), 1);
        assert_eq!(ctx.domains[0].key, DEFAULT_DOMAIN_KEY);
        assert_eq!(ctx.domains[0].name, "Engineering");
    }
}
