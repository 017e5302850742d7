//! Request credentials to an authoritative user record.
//!
//! Bearer tokens are tried as local tokens first, always, and only then as
//! federated tokens when an issuer is configured. A federated identity or a
//! trusted header identity seen for the first time is provisioned on the fly.

use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use http::header::AUTHORIZATION;
use tracing::{debug, info};

use crate::auth::error::AuthError;
use crate::auth::jwks::KeySetCache;
use crate::auth::token::TokenCodec;
use crate::auth::user_store::UserStore;
use crate::config::AuthSettings;
use crate::db::schema::{UserCreate, UserRecord};
use crate::db::seed::{DEFAULT_DOMAIN_KEY, DEFAULT_TEAM_NAME};

pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Credentials presented with a request. Consumed once, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Trusted development headers; at least one of them was present.
    DevHeaders {
        email: Option<String>,
        name: Option<String>,
    },
    /// `Authorization: Bearer <token>`
    Bearer(String),
    None,
}

impl Credentials {
    /// Read credentials from request headers.
    ///
    /// Development headers win over a bearer token, but only when enabled.
    pub fn from_headers(headers: &HeaderMap, allow_dev_headers: bool) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        if allow_dev_headers {
            let email = header(USER_EMAIL_HEADER);
            let name = header(USER_NAME_HEADER);
            if email.is_some() || name.is_some() {
                return Self::DevHeaders { email, name };
            }
        }

        let Some(value) = header(AUTHORIZATION.as_str()) else {
            return Self::None;
        };
        // Auth schemes are case-insensitive
        match value.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
                Self::Bearer(token.trim().to_string())
            }
            _ => Self::None,
        }
    }
}

/// Identity asserted by a verified federated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub email: String,
    pub name: String,
}

/// Result of one step of bearer token resolution.
#[derive(Debug)]
pub enum Attempt {
    /// A valid local token for an existing account.
    LocalOk(UserRecord),
    /// Not a usable local token, or no such account.
    LocalFailed,
    FederatedOk(FederatedIdentity),
    FederatedFailed(AuthError),
    NoCredentials,
}

/// Federated issuer trusted for bearer tokens.
pub struct FederatedIssuer {
    pub issuer: String,
    pub audience: Option<String>,
    pub key_set: Arc<KeySetCache>,
}

impl FederatedIssuer {
    /// Issuer configuration from settings; `None` when no issuer is set.
    pub fn from_settings(settings: &AuthSettings) -> anyhow::Result<Option<Self>> {
        let Some(issuer) = settings.oidc_issuer.clone() else {
            return Ok(None);
        };

        let key_set = KeySetCache::new(
            settings.oidc_jwks_url.clone(),
            Duration::from_secs(settings.jwks_timeout_seconds),
        )?;

        Ok(Some(Self {
            issuer,
            audience: settings.oidc_audience.clone(),
            key_set: Arc::new(key_set),
        }))
    }
}

/// Resolves credentials to a user, provisioning accounts when needed.
pub struct IdentityResolver {
    codec: TokenCodec,
    store: UserStore,
    federated: Option<FederatedIssuer>,
    allow_dev_headers: bool,
}

impl IdentityResolver {
    pub fn new(settings: &AuthSettings, store: UserStore) -> anyhow::Result<Self> {
        Ok(Self::from_parts(
            TokenCodec::new(settings)?,
            store,
            FederatedIssuer::from_settings(settings)?,
            settings.allow_dev_headers,
        ))
    }

    pub fn from_parts(
        codec: TokenCodec,
        store: UserStore,
        federated: Option<FederatedIssuer>,
        allow_dev_headers: bool,
    ) -> Self {
        Self {
            codec,
            store,
            federated,
            allow_dev_headers,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &UserStore {
        &self.store
    }

    pub fn allow_dev_headers(&self) -> bool {
        self.allow_dev_headers
    }

    /// Resolve request headers to a user.
    pub async fn resolve_headers(&self, headers: &HeaderMap) -> Result<UserRecord, AuthError> {
        self.resolve(Credentials::from_headers(headers, self.allow_dev_headers))
            .await
    }

    /// Resolve credentials to a user.
    pub async fn resolve(&self, credentials: Credentials) -> Result<UserRecord, AuthError> {
        let attempt = match credentials {
            Credentials::DevHeaders { email, name } if self.allow_dev_headers => {
                let email = email
                    .ok_or_else(|| AuthError::BadRequest("X-User-Email required".to_string()))?;
                debug!("Resolving {} from development headers", email);
                return self.provision(&email, name.as_deref()).await;
            }
            Credentials::DevHeaders { .. } | Credentials::None => Attempt::NoCredentials,
            Credentials::Bearer(token) => self.attempt_bearer(&token).await?,
        };

        match attempt {
            Attempt::LocalOk(user) => Ok(user),
            Attempt::FederatedOk(identity) => {
                self.provision(&identity.email, Some(&identity.name)).await
            }
            Attempt::FederatedFailed(err) => Err(err),
            Attempt::LocalFailed | Attempt::NoCredentials => Err(AuthError::unauthorized()),
        }
    }

    /// Try the token as a local token, then as a federated one.
    async fn attempt_bearer(&self, token: &str) -> Result<Attempt, AuthError> {
        if let Attempt::LocalOk(user) = self.attempt_local(token).await? {
            return Ok(Attempt::LocalOk(user));
        }

        match &self.federated {
            Some(federated) => Ok(self.attempt_federated(token, federated).await),
            None => Ok(Attempt::LocalFailed),
        }
    }

    async fn attempt_local(&self, token: &str) -> Result<Attempt, AuthError> {
        let claims = match self.codec.decode_local(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Not a valid local token: {}", e);
                return Ok(Attempt::LocalFailed);
            }
        };

        let Some(email) = claims.sub else {
            debug!("Local token has no subject");
            return Ok(Attempt::LocalFailed);
        };

        match self.store.find_user_by_email(&email).await? {
            Some(user) => Ok(Attempt::LocalOk(user)),
            None => {
                debug!("Local token subject {} has no account", email);
                Ok(Attempt::LocalFailed)
            }
        }
    }

    async fn attempt_federated(&self, token: &str, federated: &FederatedIssuer) -> Attempt {
        let Some(key_set) = federated.key_set.get().await else {
            debug!("No key set available for federated token");
            return Attempt::FederatedFailed(AuthError::invalid_token());
        };

        let claims = match self.codec.decode_federated(
            token,
            &key_set,
            &federated.issuer,
            federated.audience.as_deref(),
        ) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Federated token rejected: {}", e);
                return Attempt::FederatedFailed(AuthError::invalid_token());
            }
        };

        let Some(email) = claims.email.filter(|e| !e.is_empty()) else {
            return Attempt::FederatedFailed(AuthError::Unauthorized(
                "Token missing email claim".to_string(),
            ));
        };

        let name = claims
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.clone());

        Attempt::FederatedOk(FederatedIdentity { email, name })
    }

    /// Find or create the user for an asserted identity.
    ///
    /// A supplied `name` that differs from the stored one replaces it. New
    /// accounts are named after the email's local part when no name is given
    /// and are attached to the default team and domain. Creation and
    /// attachment are separate writes; a failure in between leaves an account
    /// without default memberships, which is not repaired later.
    pub async fn provision(&self, email: &str, name: Option<&str>) -> Result<UserRecord, AuthError> {
        if let Some(user) = self.store.find_user_by_email(email).await? {
            return self.refresh_name(user, name).await;
        }

        let create = UserCreate {
            email: email.to_string(),
            name: name.map_or_else(|| default_name(email), str::to_string),
            password_hash: None,
        };

        let inserted = self.store.create_user(&create).await?;
        if !inserted.is_created() {
            return self.refresh_name(inserted.into_user(), name).await;
        }

        let user = inserted.into_user();
        info!("Provisioned account {} for {}", user.id, user.email);
        self.attach_defaults(&user).await?;
        Ok(user)
    }

    /// Attach a user to the default team and domain, skipping those not seeded.
    pub async fn attach_defaults(&self, user: &UserRecord) -> Result<(), AuthError> {
        match self.store.find_team_by_name(DEFAULT_TEAM_NAME).await? {
            Some(team) => self.store.upsert_team_membership(&user.id, &team.id).await?,
            None => debug!("Default team {} not seeded, skipping", DEFAULT_TEAM_NAME),
        }

        match self.store.find_domain_by_key(DEFAULT_DOMAIN_KEY).await? {
            Some(domain) => self.store.upsert_user_domain(&user.id, &domain.id).await?,
            None => debug!("Default domain {} not seeded, skipping", DEFAULT_DOMAIN_KEY),
        }

        Ok(())
    }

    async fn refresh_name(&self, user: UserRecord, name: Option<&str>) -> Result<UserRecord, AuthError> {
        match name {
            Some(name) if name != user.name => {
                debug!("Updating display name of {}", user.id);
                Ok(self.store.update_user_name(&user.id, name).await?)
            }
            _ => Ok(user),
        }
    }
}

/// Local part of an email address, or the whole input without an `@`.
pub fn default_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}
