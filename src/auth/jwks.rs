//! Federated issuer key set fetching and caching.
//!
//! The key set is fetched lazily on first use and then kept for the lifetime
//! of the cache. A failed fetch is never cached, so the next caller retries.
//! Keys are not refreshed after the first successful fetch; a rotated issuer
//! key is only picked up after a restart.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// A single JSON Web Key from a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC")
    pub kty: String,
    /// Key ID, matched against the token header `kid`
    pub kid: Option<String>,
    /// Algorithm (e.g., "RS256")
    pub alg: Option<String>,
    /// Key use ("sig" or "enc")
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url encoded)
    pub n: Option<String>,
    /// RSA exponent (base64url encoded)
    pub e: Option<String>,
    /// EC curve name
    pub crv: Option<String>,
    /// EC x coordinate (base64url encoded)
    pub x: Option<String>,
    /// EC y coordinate (base64url encoded)
    pub y: Option<String>,
}

/// A JWKS document containing multiple keys.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Verification key usable for federated tokens.
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: Option<String>,
    pub alg: Option<Algorithm>,
    pub key: DecodingKey,
}

/// Parsed key set. Replaced wholesale, never mutated after construction.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: Vec<VerificationKey>,
}

impl KeySet {
    /// Build a key set from a JWKS document, skipping keys that cannot verify signatures.
    pub fn from_document(document: JwksDocument) -> Result<Self, KeySetError> {
        let mut keys = Vec::new();

        for jwk in document.keys {
            if jwk.key_use.as_deref() == Some("enc") {
                debug!("Skipping encryption key");
                continue;
            }

            match jwk_to_decoding_key(&jwk) {
                Ok(key) => {
                    let alg = jwk.alg.as_deref().and_then(|a| a.parse::<Algorithm>().ok());
                    debug!("Loaded key with kid: {:?}", jwk.kid);
                    keys.push(VerificationKey {
                        kid: jwk.kid.clone(),
                        alg,
                        key,
                    });
                }
                Err(e) => {
                    warn!("Failed to parse JWK: {}", e);
                }
            }
        }

        let key_set = Self::from_keys(keys);
        if key_set.is_empty() {
            return Err(KeySetError::NoValidKeys);
        }

        Ok(key_set)
    }

    /// Build a key set from already parsed keys.
    pub fn from_keys(keys: Vec<VerificationKey>) -> Self {
        Self { keys }
    }

    /// Find the key for a token header `kid`.
    pub fn find(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.iter().find(|key| key.kid.as_deref() == Some(kid))
    }

    /// Keys to try for a token, in order.
    ///
    /// A `kid` naming a known key selects only that key. Tokens without a
    /// `kid`, or with one the set does not know, are tried against every key.
    pub fn candidates(&self, kid: Option<&str>) -> Vec<&VerificationKey> {
        match kid.and_then(|k| self.find(k)) {
            Some(key) => vec![key],
            None => self.keys.iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Convert a JWK to a jsonwebtoken DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, KeySetError> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk
                .n
                .as_ref()
                .ok_or_else(|| KeySetError::Parse("Missing 'n' in RSA key".to_string()))?;
            let e = jwk
                .e
                .as_ref()
                .ok_or_else(|| KeySetError::Parse("Missing 'e' in RSA key".to_string()))?;

            DecodingKey::from_rsa_components(n, e)
                .map_err(|e| KeySetError::Parse(format!("Invalid RSA components: {}", e)))
        }
        "EC" => {
            let x = jwk
                .x
                .as_ref()
                .ok_or_else(|| KeySetError::Parse("Missing 'x' in EC key".to_string()))?;
            let y = jwk
                .y
                .as_ref()
                .ok_or_else(|| KeySetError::Parse("Missing 'y' in EC key".to_string()))?;

            DecodingKey::from_ec_components(x, y)
                .map_err(|e| KeySetError::Parse(format!("Invalid EC components: {}", e)))
        }
        other => Err(KeySetError::Parse(format!("Unsupported key type: {}", other))),
    }
}

/// Process-lifetime cache of the federated issuer's key set.
pub struct KeySetCache {
    /// The JWKS endpoint URL; the cache is a no-op without one.
    jwks_url: Option<String>,
    /// First successfully fetched key set.
    cached: OnceCell<Arc<KeySet>>,
    /// HTTP client for fetching JWKS.
    client: reqwest::Client,
}

impl KeySetCache {
    /// Create a cache for the given endpoint. Fetches use a bounded timeout.
    pub fn new(jwks_url: Option<String>, timeout: Duration) -> Result<Self, KeySetError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeySetError::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            jwks_url,
            cached: OnceCell::new(),
            client,
        })
    }

    /// Create a cache that already holds a key set and never fetches.
    pub fn preloaded(key_set: KeySet) -> Self {
        Self {
            jwks_url: None,
            cached: OnceCell::new_with(Some(Arc::new(key_set))),
            client: reqwest::Client::new(),
        }
    }

    /// Get the key set, fetching it on first use.
    ///
    /// Concurrent first callers share one in-flight fetch. Returns `None` when
    /// no endpoint is configured or the fetch failed; failures are not cached.
    pub async fn get(&self) -> Option<Arc<KeySet>> {
        if let Some(key_set) = self.cached.get() {
            return Some(key_set.clone());
        }

        let url = self.jwks_url.as_deref()?;

        match self
            .cached
            .get_or_try_init(|| async { self.fetch(url).await.map(Arc::new) })
            .await
        {
            Ok(key_set) => Some(key_set.clone()),
            Err(e) => {
                warn!("Key set fetch failed: {}", e);
                None
            }
        }
    }

    /// Whether a key set has been cached.
    pub fn is_cached(&self) -> bool {
        self.cached.initialized()
    }

    /// Fetch and parse keys from the JWKS endpoint.
    async fn fetch(&self, url: &str) -> Result<KeySet, KeySetError> {
        debug!("Fetching JWKS from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| KeySetError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeySetError::Fetch(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| KeySetError::Parse(e.to_string()))?;

        let key_set = KeySet::from_document(document)?;
        debug!("Successfully cached {} keys", key_set.len());
        Ok(key_set)
    }
}

/// Errors that can occur when loading the key set.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeySetError {
    /// Failed to fetch JWKS from endpoint.
    #[error("Failed to fetch JWKS: {0}")]
    Fetch(String),
    /// Failed to parse JWKS response.
    #[error("Failed to parse JWKS: {0}")]
    Parse(String),
    /// No usable keys in the JWKS.
    #[error("No valid keys found in JWKS")]
    NoValidKeys,
}
