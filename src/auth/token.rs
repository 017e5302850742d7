//! Local and federated bearer tokens.
//!
//! Local tokens are HMAC-signed with the service secret and carry the account
//! email as subject. Federated tokens are signed by an external issuer with an
//! asymmetric key published in its key set.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::jwks::KeySet;
use crate::config::AuthSettings;

/// Claims of a locally issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalClaims {
    /// Account email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

/// Claims read from a federated token.
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedClaims {
    pub iss: String,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Token verification failures.
///
/// The variants are for logs and tests; callers reject all of them the same way.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("algorithm {0:?} is not accepted")]
    UnsupportedAlgorithm(Algorithm),
    #[error("issuer or audience mismatch")]
    ClaimMismatch,
    #[error("no verification key available")]
    NoKey,
    #[error("token rejected: {0}")]
    Rejected(String),
    #[error("failed to sign token: {0}")]
    Encode(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => Self::ClaimMismatch,
            ErrorKind::InvalidToken => Self::Malformed,
            _ => Self::Rejected(err.to_string()),
        }
    }
}

const FEDERATED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Encodes and verifies bearer tokens.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    default_ttl: Duration,
}

impl TokenCodec {
    /// Build a codec from the local signing settings.
    pub fn new(settings: &AuthSettings) -> anyhow::Result<Self> {
        let algorithm = settings.local_algorithm()?;
        let secret = settings.jwt_secret_key.as_bytes();
        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            default_ttl: Duration::minutes(settings.jwt_access_token_expire_minutes),
        })
    }

    /// Lifetime used for access tokens handed out at login and registration.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a local token for `email`, expiring `ttl` from now.
    pub fn issue_local(&self, email: &str, ttl: Duration) -> Result<String, TokenError> {
        self.issue_local_at(email, ttl, Utc::now())
    }

    /// Issue a local token relative to an explicit clock reading.
    pub fn issue_local_at(
        &self,
        email: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = LocalClaims {
            sub: Some(email.to_string()),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    /// Verify a local token's signature, algorithm and expiry.
    pub fn decode_local(&self, token: &str) -> Result<LocalClaims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let data = decode::<LocalClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Verify a federated token against an issuer key set.
    ///
    /// The issuer must match exactly. The audience is checked only when one is
    /// given. Expiry is enforced when the token carries one.
    pub fn decode_federated(
        &self,
        token: &str,
        key_set: &KeySet,
        issuer: &str,
        audience: Option<&str>,
    ) -> Result<FederatedClaims, TokenError> {
        let header = decode_header(token)?;
        if !FEDERATED_ALGORITHMS.contains(&header.alg) {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = 0;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["iss"]);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let mut last_err = TokenError::NoKey;
        for key in key_set.candidates(header.kid.as_deref()) {
            if key.alg.is_some_and(|alg| alg != header.alg) {
                continue;
            }
            match decode::<FederatedClaims>(token, &key.key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => {
                    debug!("Federated token rejected by key {:?}: {}", key.kid, e);
                    last_err = e.into();
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestIssuer;
    use serde_json::json;

    const ISSUER: &str = "https://issuer.example.com";

    fn codec() -> TokenCodec {
        TokenCodec::new(&AuthSettings::default()).unwrap()
    }

    #[test]
    fn test_local_round_trip() {
        let codec = codec();
        let token = codec.issue_local("a@x.com", codec.default_ttl()).unwrap();
        let claims = codec.decode_local(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("a@x.com"));
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_issue_is_deterministic_for_fixed_clock() {
        let codec = codec();
        let now = Utc::now();
        let a = codec.issue_local_at("a@x.com", Duration::minutes(5), now).unwrap();
        let b = codec.issue_local_at("a@x.com", Duration::minutes(5), now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_expired_local_token_fails() {
        let codec = codec();
        let token = codec.issue_local("a@x.com", Duration::seconds(-1)).unwrap();
        assert_eq!(codec.decode_local(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_local_token_bound_to_secret() {
        let other = TokenCodec::new(&AuthSettings {
            jwt_secret_key: "another-secret".to_string(),
            ..Default::default()
        })
        .unwrap();
        let token = other.issue_local("a@x.com", Duration::minutes(5)).unwrap();
        assert_eq!(codec().decode_local(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_local_token_bound_to_algorithm() {
        let other = TokenCodec::new(&AuthSettings {
            jwt_algorithm: "HS512".to_string(),
            ..Default::default()
        })
        .unwrap();
        let token = other.issue_local("a@x.com", Duration::minutes(5)).unwrap();
        assert!(codec().decode_local(&token).is_err());
    }

    #[test]
    fn test_local_token_without_subject_decodes() {
        let codec = codec();
        let exp = (Utc::now() + Duration::minutes(5)).timestamp();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "exp": exp }),
            &EncodingKey::from_secret(AuthSettings::default().jwt_secret_key.as_bytes()),
        )
        .unwrap();
        let claims = codec.decode_local(&token).unwrap();
        assert!(claims.sub.is_none());
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(codec().decode_local("not.a.token").is_err());
        assert!(codec().decode_local("").is_err());
    }

    #[test]
    fn test_federated_token_verifies() {
        let issuer = TestIssuer::new("kid-1");
        let token = issuer.mint(&TestIssuer::claims(ISSUER, Some("f@x.com"), Some("Fed")));

        let claims = codec()
            .decode_federated(&token, &issuer.key_set(), ISSUER, Some("aud-1"))
            .unwrap();
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.email.as_deref(), Some("f@x.com"));
        assert_eq!(claims.name.as_deref(), Some("Fed"));
    }

    #[test]
    fn test_federated_audience_unconstrained_when_unset() {
        let issuer = TestIssuer::new("kid-1");
        let token = issuer.mint(&TestIssuer::claims(ISSUER, Some("f@x.com"), None));

        assert!(
            codec()
                .decode_federated(&token, &issuer.key_set(), ISSUER, None)
                .is_ok()
        );
        assert_eq!(
            codec()
                .decode_federated(&token, &issuer.key_set(), ISSUER, Some("other"))
                .unwrap_err(),
            TokenError::ClaimMismatch
        );
    }

    #[test]
    fn test_federated_issuer_must_match() {
        let issuer = TestIssuer::new("kid-1");
        let token = issuer.mint(&TestIssuer::claims("https://evil.example.com", Some("f@x.com"), None));

        assert_eq!(
            codec()
                .decode_federated(&token, &issuer.key_set(), ISSUER, None)
                .unwrap_err(),
            TokenError::ClaimMismatch
        );
    }

    #[test]
    fn test_federated_rejects_local_token() {
        let codec = codec();
        let issuer = TestIssuer::new("kid-1");
        let token = codec.issue_local("a@x.com", Duration::minutes(5)).unwrap();

        assert_eq!(
            codec
                .decode_federated(&token, &issuer.key_set(), ISSUER, None)
                .unwrap_err(),
            TokenError::UnsupportedAlgorithm(Algorithm::HS256)
        );
    }

    #[test]
    fn test_local_rejects_federated_token() {
        let issuer = TestIssuer::new("kid-1");
        let token = issuer.mint(&TestIssuer::claims(ISSUER, Some("f@x.com"), None));
        assert!(codec().decode_local(&token).is_err());
    }

    #[test]
    fn test_federated_expired_token_fails() {
        let issuer = TestIssuer::new("kid-1");
        let mut claims = TestIssuer::claims(ISSUER, Some("f@x.com"), None);
        claims["exp"] = json!(Utc::now().timestamp() - 10);
        let token = issuer.mint(&claims);

        assert_eq!(
            codec()
                .decode_federated(&token, &issuer.key_set(), ISSUER, None)
                .unwrap_err(),
            TokenError::Expired
        );
    }
}
