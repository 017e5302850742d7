//! Static team and domain reference data.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::auth::UserStore;
use crate::db::schema::{DomainCreate, TeamCreate};
use crate::db::{DatabaseConfig, Db, create_connection, ensure_schema};

/// Team every new account joins when it exists.
pub const DEFAULT_TEAM_NAME: &str = "General";

/// Domain every new account joins when it exists.
pub const DEFAULT_DOMAIN_KEY: &str = "engineering";

fn seed_teams() -> Vec<TeamCreate> {
    [
        (DEFAULT_TEAM_NAME, None),
        ("Engineering", Some("eng")),
        ("Product", Some("product")),
        ("Design", Some("design")),
    ]
    .into_iter()
    .map(|(name, external_ref)| TeamCreate {
        name: name.to_string(),
        external_ref: external_ref.map(str::to_string),
        is_active: true,
    })
    .collect()
}

fn seed_domains() -> Vec<DomainCreate> {
    [
        (DEFAULT_DOMAIN_KEY, "Engineering"),
        ("product", "Product Management"),
        ("design", "Design"),
        ("marketing", "Marketing"),
        ("sales", "Sales"),
    ]
    .into_iter()
    .map(|(key, name)| DomainCreate {
        key: key.to_string(),
        name: name.to_string(),
        parent_domain_id: None,
        is_active: true,
    })
    .collect()
}

/// Ensure the schema and upsert the static teams and domains.
pub async fn seed_static(db: &Db) -> Result<()> {
    ensure_schema(db).await?;

    let store = UserStore::new(db.clone());
    for team in seed_teams() {
        store.upsert_team(&team).await?;
    }
    for domain in seed_domains() {
        store.upsert_domain(&domain).await?;
    }

    info!("Static data seeded successfully");
    Ok(())
}

/// Connect to the store and run [`seed_static`], retrying both while the
/// store is not ready yet.
///
/// Gives up with the last error after `attempts` tries.
pub async fn connect_and_seed_with_retry(
    config: DatabaseConfig,
    attempts: u32,
    delay: Duration,
) -> Result<Db> {
    with_retry("Connecting and seeding", attempts, delay, || {
        let config = config.clone();
        async move {
            let db = create_connection(config).await?;
            seed_static(&db).await?;
            Ok(db)
        }
    })
    .await
}

async fn with_retry<T, F, Fut>(what: &str, attempts: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(
                    "{} failed (attempt {}/{}): {} - retrying in {:?}",
                    what, attempt, attempts, e, delay
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(e.context(format!("{} failed after {} attempts", what, attempts)));
            }
        }
    }
}
