//! Account operations behind the HTTP surface.

use std::sync::Arc;

use http::HeaderMap;
use tracing::{debug, info, warn};

use crate::auth::context::ContextAssembler;
use crate::auth::error::AuthError;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::resolver::IdentityResolver;
use crate::auth::user_store::UserStore;
use crate::config::AuthSettings;
use crate::db::Db;
use crate::db::schema::{UserCreate, UserRecord};
use crate::model::{
    Domain, LoginRequest, LoginResponse, RegisterRequest, Team, UserWithContext,
    ValidateTokenResponse,
};

const INVALID_CREDENTIALS: &str = "Incorrect email or password";

/// Registration, login, token introspection and membership reads.
#[derive(Clone)]
pub struct AuthService {
    resolver: Arc<IdentityResolver>,
    contexts: ContextAssembler,
}

impl AuthService {
    pub fn new(resolver: Arc<IdentityResolver>) -> Self {
        let contexts = ContextAssembler::new(resolver.store().clone());
        Self { resolver, contexts }
    }

    /// Build the service and its resolver from settings.
    pub fn from_settings(settings: &AuthSettings, db: Db) -> anyhow::Result<Self> {
        let resolver = IdentityResolver::new(settings, UserStore::new(db))?;
        Ok(Self::new(Arc::new(resolver)))
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    fn store(&self) -> &UserStore {
        self.resolver.store()
    }

    /// Resolve the caller of a request.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<UserRecord, AuthError> {
        self.resolver.resolve_headers(headers).await
    }

    /// Create a password account, attach it to the defaults and log it in.
    pub async fn register(&self, request: RegisterRequest) -> Result<LoginResponse, AuthError> {
        let email = normalize_email(&request.email)?;

        if self.store().find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict("Email already registered".to_string()));
        }

        let password_hash = hash_blocking(request.password).await?;
        let create = UserCreate {
            email: email.clone(),
            name: request.name,
            password_hash: Some(password_hash),
        };

        let inserted = self.store().create_user(&create).await?;
        if !inserted.is_created() {
            return Err(AuthError::Conflict("Email already registered".to_string()));
        }
        let user = inserted.into_user();

        self.resolver.attach_defaults(&user).await?;
        info!("Registered account {}", user.id);

        self.login_response(&user).await
    }

    /// Exchange email and password for a local access token.
    ///
    /// Unknown accounts, accounts without a password and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AuthError> {
        let email = normalize_email(&request.email)?;

        let Some(user) = self.store().find_user_by_email(&email).await? else {
            debug!("Login for unknown account");
            return Err(AuthError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        let Some(digest) = user.password_hash.clone() else {
            debug!("Login for account {} without password", user.id);
            return Err(AuthError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        if !verify_blocking(request.password, digest).await? {
            debug!("Wrong password for account {}", user.id);
            return Err(AuthError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        self.login_response(&user).await
    }

    /// Introspect a local token. Never fails; problems are reported in the body.
    pub async fn validate(&self, token: &str) -> ValidateTokenResponse {
        let claims = match self.resolver.codec().decode_local(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Token failed validation: {}", e);
                return ValidateTokenResponse::invalid("Invalid token");
            }
        };

        let Some(email) = claims.sub else {
            return ValidateTokenResponse::invalid("Token missing subject");
        };

        let user = match self.store().find_user_by_email(&email).await {
            Ok(Some(user)) => user,
            Ok(None) => return ValidateTokenResponse::invalid("User not found"),
            Err(e) => {
                warn!("User lookup failed during token validation: {}", e);
                return ValidateTokenResponse::invalid("Token validation failed");
            }
        };

        match self.contexts.assemble(&user).await {
            Ok(context) => ValidateTokenResponse::valid(context),
            Err(e) => {
                warn!("Context lookup failed during token validation: {}", e);
                ValidateTokenResponse::invalid("Token validation failed")
            }
        }
    }

    /// The caller with its memberships.
    pub async fn me(&self, user: &UserRecord) -> Result<UserWithContext, AuthError> {
        Ok(self.contexts.assemble(user).await?)
    }

    pub async fn teams(&self, user: &UserRecord) -> Result<Vec<Team>, AuthError> {
        Ok(self.contexts.teams(user).await?)
    }

    pub async fn all_teams(&self) -> Result<Vec<Team>, AuthError> {
        let teams = self.store().list_active_teams().await?;
        Ok(teams.into_iter().map(Team::from).collect())
    }

    pub async fn domains(&self, user: &UserRecord) -> Result<Vec<Domain>, AuthError> {
        Ok(self.contexts.domains(user).await?)
    }

    pub async fn all_domains(&self) -> Result<Vec<Domain>, AuthError> {
        let domains = self.store().list_active_domains().await?;
        Ok(domains.into_iter().map(Domain::from).collect())
    }

    async fn login_response(&self, user: &UserRecord) -> Result<LoginResponse, AuthError> {
        let codec = self.resolver.codec();
        let token = codec
            .issue_local(&user.email, codec.default_ttl())
            .map_err(|e| AuthError::Internal(anyhow::anyhow!(e)))?;
        let context = self.contexts.assemble(user).await?;
        Ok(LoginResponse::bearer(token, context))
    }
}

/// Trim an email and check it looks like `local@domain.tld`.
pub fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let email = raw.trim();
    let invalid = || AuthError::BadRequest("Invalid email address".to_string());

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let well_formed = !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);

    if well_formed {
        Ok(email.to_string())
    } else {
        Err(invalid())
    }
}

async fn hash_blocking(password: String) -> Result<String, AuthError> {
    let digest = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))??;
    Ok(digest)
}

async fn verify_blocking(password: String, digest: String) -> Result<bool, AuthError> {
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &digest))
        .await
        .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))?;
    Ok(matches)
}
