use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("AUTH_DATABASE_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("AUTH_DATABASE_NAMESPACE")
                .unwrap_or_else(|_| "promptstack".to_string()),
            database: env::var("AUTH_DATABASE_NAME").unwrap_or_else(|_| "auth".to_string()),
            username: env::var("AUTH_DATABASE_USERNAME").ok(),
            password: env::var("AUTH_DATABASE_PASSWORD").ok(),
        }
    }
}

impl DatabaseConfig {
    /// Fresh in-memory database, used by local runs and tests.
    pub fn memory() -> Self {
        Self {
            url: "memory".to_string(),
            namespace: "promptstack".to_string(),
            database: "auth".to_string(),
            username: None,
            password: None,
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define tables and unique indexes. Safe to run more than once.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Users: email is the identity key, created_at never changes
        "DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS email ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime DEFAULT time::now() READONLY;
         DEFINE INDEX IF NOT EXISTS user_email ON TABLE user COLUMNS email UNIQUE;",

        // Teams
        "DEFINE TABLE IF NOT EXISTS team SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS name ON TABLE team TYPE string;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE team TYPE bool DEFAULT true;
         DEFINE INDEX IF NOT EXISTS team_name ON TABLE team COLUMNS name UNIQUE;",

        // Domains
        "DEFINE TABLE IF NOT EXISTS domain SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS domain_key ON TABLE domain TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE domain TYPE string;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE domain TYPE bool DEFAULT true;
         DEFINE INDEX IF NOT EXISTS domain_key ON TABLE domain COLUMNS domain_key UNIQUE;",

        // Memberships: one row per pair
        "DEFINE TABLE IF NOT EXISTS team_membership SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS team_membership_pair ON TABLE team_membership COLUMNS user_id, team_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS team_membership_user ON TABLE team_membership COLUMNS user_id;",

        "DEFINE TABLE IF NOT EXISTS user_domain SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS user_domain_pair ON TABLE user_domain COLUMNS user_id, domain_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_domain_user ON TABLE user_domain COLUMNS user_id;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
