use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::AppState;
use crate::api::error::ApiError;
use crate::db::schema::UserRecord;

/// The resolved caller of a request. Rejects with 400 or 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRecord);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = state.authenticate(&parts.headers).await?;
        Ok(Self(user))
    }
}
