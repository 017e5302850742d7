//! Shared helpers for unit tests: a federated test issuer, a local JSON
//! server and a seeded in-memory database.

use std::net::SocketAddr;
use std::sync::OnceLock;

use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::auth::jwks::{KeySet, VerificationKey};
use crate::db::{DatabaseConfig, Db, create_connection, seed_static};

/// Generating RSA keys is slow in debug builds, so one key serves every test.
fn shared_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("key"))
}

/// An RSA-signing identity provider for federated token tests.
pub struct TestIssuer {
    pub kid: String,
    public: RsaPublicKey,
    encoding: EncodingKey,
}

impl TestIssuer {
    pub fn new(kid: &str) -> Self {
        let key = shared_key();
        let pem = key.to_pkcs1_pem(Default::default()).expect("pem");
        Self {
            kid: kid.to_string(),
            public: RsaPublicKey::from(key),
            encoding: EncodingKey::from_rsa_pem(pem.as_bytes()).expect("enc"),
        }
    }

    fn components(&self) -> (String, String) {
        (
            URL_SAFE_NO_PAD.encode(self.public.n().to_bytes_be()),
            URL_SAFE_NO_PAD.encode(self.public.e().to_bytes_be()),
        )
    }

    /// JWKS document publishing this issuer's key.
    pub fn jwks(&self) -> Value {
        let (n, e) = self.components();
        json!({
            "keys": [{
                "kty": "RSA",
                "kid": self.kid,
                "alg": "RS256",
                "use": "sig",
                "n": n,
                "e": e
            }]
        })
    }

    /// Parsed key set holding this issuer's key.
    pub fn key_set(&self) -> KeySet {
        let (n, e) = self.components();
        KeySet::from_keys(vec![VerificationKey {
            kid: Some(self.kid.clone()),
            alg: Some(Algorithm::RS256),
            key: DecodingKey::from_rsa_components(&n, &e).expect("key"),
        }])
    }

    /// Sign arbitrary claims with RS256 and this issuer's kid.
    pub fn mint(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(&header, claims, &self.encoding).expect("token")
    }

    /// Claims valid for five minutes.
    pub fn claims(issuer: &str, email: Option<&str>, name: Option<&str>) -> Value {
        let now = chrono::Utc::now().timestamp();
        let mut claims = json!({
            "iss": issuer,
            "sub": "user-1",
            "aud": "aud-1",
            "iat": now,
            "exp": now + 300
        });
        if let Some(email) = email {
            claims["email"] = json!(email);
        }
        if let Some(name) = name {
            claims["name"] = json!(name);
        }
        claims
    }
}

/// Serve `GET path` with the handler's status and JSON body on an ephemeral port.
pub async fn spawn_json_server<F>(path: &str, handler: F) -> (SocketAddr, JoinHandle<()>)
where
    F: Fn() -> (StatusCode, Value) + Clone + Send + Sync + 'static,
{
    let app = Router::new().route(
        path,
        get(move || {
            let handler = handler.clone();
            async move {
                let (status, body) = handler();
                (status, Json(body))
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = axum::serve(listener, app.into_make_service());
    let handle = tokio::spawn(async move {
        let _ = server.await;
    });
    (addr, handle)
}

/// In-memory database with the schema and static teams and domains.
pub async fn seeded_db() -> Db {
    let db = create_connection(DatabaseConfig::memory())
        .await
        .expect("db");
    seed_static(&db).await.expect("seed");
    db
}
