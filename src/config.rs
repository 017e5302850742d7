use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Origins that are always allowed, regardless of configuration.
pub const DEFAULT_DEV_ORIGINS: &[&str] = &[
    "chrome-extension://*",
    "http://localhost:3000",
    "http://localhost:3001",
    "http://localhost:5173",
    "http://localhost:8000",
    "http://localhost:8001",
];

pub const DEFAULT_JWT_ALGORITHM: &str = "HS256";
pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 30;
pub const DEFAULT_JWKS_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_SEED_ATTEMPTS: u32 = 10;
pub const DEFAULT_SEED_RETRY_DELAY_MS: u64 = 1000;

pub const DEFAULT_JWT_SECRET_KEY: &str = "your-secret-key-change-in-production";

/// Service settings, normally supplied through `AUTH_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct AuthSettings {
    /// Symmetric secret for locally issued tokens
    #[arg(long, env = "AUTH_JWT_SECRET_KEY", default_value = DEFAULT_JWT_SECRET_KEY, hide_env_values = true)]
    pub jwt_secret_key: String,
    /// HMAC algorithm name for locally issued tokens (HS256, HS384, HS512)
    #[arg(long, env = "AUTH_JWT_ALGORITHM", default_value = DEFAULT_JWT_ALGORITHM)]
    pub jwt_algorithm: String,
    /// Lifetime of locally issued access tokens
    #[arg(long, env = "AUTH_JWT_ACCESS_TOKEN_EXPIRE_MINUTES", default_value_t = DEFAULT_ACCESS_TOKEN_MINUTES)]
    pub jwt_access_token_expire_minutes: i64,
    /// Federated issuer; enables the federated token path when set
    #[serde(default)]
    #[arg(long, env = "AUTH_OIDC_ISSUER")]
    pub oidc_issuer: Option<String>,
    /// Federated audience; audience is unconstrained when unset
    #[serde(default)]
    #[arg(long, env = "AUTH_OIDC_AUDIENCE")]
    pub oidc_audience: Option<String>,
    /// URL of the federated issuer's key set
    #[serde(default)]
    #[arg(long, env = "AUTH_OIDC_JWKS_URL")]
    pub oidc_jwks_url: Option<String>,
    /// Timeout for a single key-set fetch
    #[serde(default = "default_jwks_timeout_seconds")]
    #[arg(long, env = "AUTH_JWKS_TIMEOUT_SECONDS", default_value_t = DEFAULT_JWKS_TIMEOUT_SECONDS)]
    pub jwks_timeout_seconds: u64,
    /// Whether the trusted `X-User-Email` / `X-User-Name` headers are honored
    #[serde(default)]
    #[arg(long, env = "AUTH_ALLOW_DEV_HEADERS")]
    pub allow_dev_headers: bool,
    /// Allowed CORS origins; entries ending in `*` match by prefix
    #[serde(default)]
    #[arg(long = "cors-origins", env = "AUTH_API_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

fn default_jwks_timeout_seconds() -> u64 {
    DEFAULT_JWKS_TIMEOUT_SECONDS
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret_key: DEFAULT_JWT_SECRET_KEY.to_string(),
            jwt_algorithm: DEFAULT_JWT_ALGORITHM.to_string(),
            jwt_access_token_expire_minutes: DEFAULT_ACCESS_TOKEN_MINUTES,
            oidc_issuer: None,
            oidc_audience: None,
            oidc_jwks_url: None,
            jwks_timeout_seconds: DEFAULT_JWKS_TIMEOUT_SECONDS,
            allow_dev_headers: false,
            cors_origins: Vec::new(),
        }
    }
}

impl AuthSettings {
    /// Settings for local development: trusted headers are honored.
    pub fn local() -> Self {
        Self {
            allow_dev_headers: true,
            ..Default::default()
        }
    }

    /// Settings with a federated issuer configured.
    pub fn with_oidc(issuer: String, jwks_url: String, audience: Option<String>) -> Self {
        Self {
            oidc_issuer: Some(issuer),
            oidc_audience: audience,
            oidc_jwks_url: Some(jwks_url),
            ..Default::default()
        }
    }

    /// Parse and check the configured local signing algorithm.
    ///
    /// Only the HMAC family is accepted, since local tokens are signed with a
    /// shared secret.
    pub fn local_algorithm(&self) -> anyhow::Result<Algorithm> {
        let alg = Algorithm::from_str(&self.jwt_algorithm)
            .map_err(|e| anyhow::anyhow!("Unknown JWT algorithm `{}`: {}", self.jwt_algorithm, e))?;
        match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(alg),
            other => Err(anyhow::anyhow!(
                "JWT algorithm {:?} is not a symmetric algorithm",
                other
            )),
        }
    }

    /// Validate settings that would otherwise only fail at request time.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.local_algorithm()?;

        if self.jwt_secret_key.is_empty() {
            return Err(anyhow::anyhow!("JWT secret key must not be empty"));
        }

        if let Some(jwks_url) = &self.oidc_jwks_url {
            url::Url::parse(jwks_url)
                .map_err(|e| anyhow::anyhow!("Invalid key-set URL `{}`: {}", jwks_url, e))?;
        }

        if self.oidc_issuer.is_some() && self.oidc_jwks_url.is_none() {
            tracing::warn!(
                "Federated issuer configured without a key-set URL - federated tokens will be rejected"
            );
        }

        Ok(())
    }

    /// Configured origins plus the always-allowed development origins.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = self
            .cors_origins
            .iter()
            .flat_map(|raw| split_cors_origins(raw))
            .collect();
        for origin in DEFAULT_DEV_ORIGINS {
            if !origins.iter().any(|o| o == origin) {
                origins.push(origin.to_string());
            }
        }
        origins
    }
}

/// Split a comma-separated origin list, dropping empty entries.
pub fn split_cors_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

/// Check an origin against an allowlist. Entries ending in `*` match by prefix.
pub fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => origin.starts_with(prefix),
        None => origin == pattern,
    })
}
