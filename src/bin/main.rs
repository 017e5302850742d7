use anyhow::Result;
use clap::{Parser, Subcommand};
use promptstack_auth::config::{DEFAULT_SEED_ATTEMPTS, DEFAULT_SEED_RETRY_DELAY_MS};
use promptstack_auth::{AuthSettings, DatabaseConfig, TokenCodec, UserStore};
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "promptstack-auth")]
#[command(about = "Authentication service: tokens, accounts, teams and domains")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Server {
        /// Bind address, e.g. 0.0.0.0:8000
        #[arg(long, env = "AUTH_BIND", default_value = "0.0.0.0:8000")]
        bind: String,
        #[arg(long, env = "AUTH_DATABASE_URL", default_value = "memory")]
        db_url: String,
        /// Seeding attempts before giving up at startup
        #[arg(long, env = "AUTH_SEED_ATTEMPTS", default_value_t = DEFAULT_SEED_ATTEMPTS)]
        seed_attempts: u32,
        /// Delay between seeding attempts
        #[arg(long, env = "AUTH_SEED_RETRY_DELAY_MS", default_value_t = DEFAULT_SEED_RETRY_DELAY_MS)]
        seed_retry_delay_ms: u64,
        #[command(flatten)]
        settings: AuthSettings,
    },
    /// Create the schema and seed teams and domains
    Init {
        #[arg(long, env = "AUTH_DATABASE_URL", default_value = "memory")]
        db_url: String,
    },
    /// Issue a local access token for an existing account
    IssueToken {
        #[arg(long)]
        email: String,
        /// Lifetime in minutes (defaults to the configured access token lifetime)
        #[arg(long)]
        minutes: Option<i64>,
        #[arg(long, env = "AUTH_DATABASE_URL", default_value = "memory")]
        db_url: String,
        #[command(flatten)]
        settings: AuthSettings,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("promptstack_auth=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            bind,
            db_url,
            seed_attempts,
            seed_retry_delay_ms,
            settings,
        } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for auth server: {}", db_config.url);
            if settings.allow_dev_headers {
                tracing::warn!("Development headers are enabled - do not use in production");
            }
            if settings.oidc_issuer.is_some() {
                info!("Federated tokens enabled");
            }

            let app = promptstack_auth::build_app(
                &settings,
                db_config,
                seed_attempts,
                Duration::from_millis(seed_retry_delay_ms),
            )
            .await?;

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Auth server listening on http://{}", bind);
            axum::serve(listener, app).await?;
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = promptstack_auth::create_connection(db_config).await?;
            promptstack_auth::seed_static(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::IssueToken {
            email,
            minutes,
            db_url,
            settings,
        } => {
            settings.validate()?;
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            let db = promptstack_auth::create_connection(db_config).await?;
            promptstack_auth::ensure_schema(&db).await?;

            let store = UserStore::new(db);
            if store.find_user_by_email(&email).await?.is_none() {
                anyhow::bail!("No account registered for {}", email);
            }

            let codec = TokenCodec::new(&settings)?;
            let ttl = minutes
                .map(chrono::Duration::minutes)
                .unwrap_or_else(|| codec.default_ttl());
            let token = codec.issue_local(&email, ttl)?;

            println!("{}", token);
        }
    }

    Ok(())
}
