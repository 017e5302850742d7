//! Authentication and user context module.
//!
//! Resolves request credentials to a single user record. Supported inputs:
//!
//! - **Local token**: HMAC-signed bearer token issued by this service at login
//! - **Federated token**: bearer token from an external issuer, verified
//!   against the issuer's published key set
//! - **Development headers**: trusted `X-User-Email` / `X-User-Name`, only
//!   when explicitly enabled
//!
//! ## Usage
//!
//! ```ignore
//! let service = AuthService::from_settings(&settings, db)?;
//! let user = service.authenticate(&headers).await?;
//! let me = service.me(&user).await?;
//! ```

mod context;
mod error;
pub mod jwks;
pub mod password;
pub mod resolver;
mod service;
pub mod token;
mod user_store;

pub use context::ContextAssembler;
pub use error::AuthError;
pub use jwks::{KeySet, KeySetCache, KeySetError};
pub use resolver::{Attempt, Credentials, FederatedIssuer, IdentityResolver};
pub use service::{AuthService, normalize_email};
pub use token::{FederatedClaims, LocalClaims, TokenCodec, TokenError};
pub use user_store::{UserInsert, UserStore};
