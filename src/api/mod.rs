// REST API endpoints for the auth service

pub mod error;
mod extract;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, request},
    response::Json,
    routing::{get, post},
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthService;
use crate::config::{AuthSettings, origin_allowed};
use crate::model::{
    Domain, LoginRequest, LoginResponse, RegisterRequest, Team, UserWithContext,
    ValidateTokenRequest, ValidateTokenResponse,
};

pub use error::ApiError;
pub use extract::CurrentUser;

pub type AppState = Arc<AuthService>;

pub fn create_router(state: AppState, settings: &AuthSettings) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/validate", post(validate_token))
        .route("/auth/me", get(me))
        .route("/teams", get(my_teams))
        .route("/teams/all", get(all_teams))
        .route("/domains", get(my_domains))
        .route("/domains/all", get(all_domains))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(settings)),
        )
        .with_state(state)
}

/// CORS for the configured origins plus the local development origins.
fn cors_layer(settings: &AuthSettings) -> CorsLayer {
    let allowed = settings.allowed_origins();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &request::Parts| {
                origin
                    .to_str()
                    .map(|origin| origin_allowed(origin, &allowed))
                    .unwrap_or(false)
            },
        ))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth"
    }))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(state.register(payload).await?))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(state.login(payload).await?))
}

/// Token introspection for other services. Always answers 200.
async fn validate_token(
    State(state): State<AppState>,
    Json(payload): Json<ValidateTokenRequest>,
) -> Json<ValidateTokenResponse> {
    Json(state.validate(&payload.token).await)
}

async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UserWithContext>, ApiError> {
    Ok(Json(state.me(&user).await?))
}

async fn my_teams(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Team>>, ApiError> {
    Ok(Json(state.teams(&user).await?))
}

// Full catalogs for selection UIs; still require a resolved caller.
async fn all_teams(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Vec<Team>>, ApiError> {
    Ok(Json(state.all_teams().await?))
}

async fn my_domains(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Domain>>, ApiError> {
    Ok(Json(state.domains(&user).await?))
}

async fn all_domains(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Vec<Domain>>, ApiError> {
    Ok(Json(state.all_domains().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_db;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use axum::response::Response;
    use chrono::Duration;
    use serde_json::json;
    use tower::ServiceExt;

    async fn app(settings: AuthSettings) -> (Router, AppState) {
        let service = AuthService::from_settings(&settings, seeded_db().await).unwrap();
        let state = Arc::new(service);
        (create_router(state.clone(), &settings), state)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(AuthSettings::default()).await;
        let response = app.oneshot(get_with("/health", &[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok", "service": "auth"}));
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let (app, _) = app(AuthSettings::default()).await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/auth/register",
                json!({"email": "a@x.com", "password": "pw", "name": "Alice"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let registered = body_json(response).await;
        assert_eq!(registered["token_type"], "bearer");
        assert_eq!(registered["user"]["email"], "a@x.com");
        assert!(registered["user"].get("password_hash").is_none());

        let response = app
            .clone()
            .oneshot(post_json(
                "/auth/login",
                json!({"email": "a@x.com", "password": "pw"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_json(response).await["access_token"]
            .as_str()
            .unwrap()
            .to_string();

        let bearer = format!("Bearer {token}");
        let response = app
            .oneshot(get_with("/auth/me", &[("authorization", bearer.as_str())]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me = body_json(response).await;
        assert_eq!(me["name"], "Alice");
        assert_eq!(me["teams"][0]["name"], "General");
        assert_eq!(me["domains"][0]["key"], "engineering");
    }

    #[tokio::test]
    async fn test_register_twice_is_bad_request() {
        let (app, _) = app(AuthSettings::default()).await;
        let body = json!({"email": "a@x.com", "password": "pw", "name": "Alice"});

        let first = app
            .clone()
            .oneshot(post_json("/auth/register", body.clone()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(post_json("/auth/register", body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(second).await,
            json!({"detail": "Email already registered"})
        );
    }

    #[tokio::test]
    async fn test_login_failure_is_unauthorized() {
        let (app, _) = app(AuthSettings::default()).await;
        let response = app
            .oneshot(post_json(
                "/auth/login",
                json!({"email": "nobody@x.com", "password": "pw"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
        assert_eq!(
            body_json(response).await,
            json!({"detail": "Incorrect email or password"})
        );
    }

    #[tokio::test]
    async fn test_validate_expired_token_is_ok_but_invalid() {
        let (app, state) = app(AuthSettings::default()).await;
        let token = state
            .resolver()
            .codec()
            .issue_local("a@x.com", Duration::seconds(-1))
            .unwrap();

        let response = app
            .oneshot(post_json("/auth/validate", json!({"token": token})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["valid"], false);
        assert!(body["user"].is_null());
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_dev_headers_update_name_seen_by_me() {
        let (app, _) = app(AuthSettings::local()).await;

        let response = app
            .clone()
            .oneshot(get_with(
                "/auth/me",
                &[("x-user-email", "a@x.com"), ("x-user-name", "First")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["name"], "First");

        let response = app
            .oneshot(get_with(
                "/auth/me",
                &[("x-user-email", "a@x.com"), ("x-user-name", "Second")],
            ))
            .await
            .unwrap();
        let me = body_json(response).await;
        assert_eq!(me["name"], "Second");
        assert_eq!(me["email"], "a@x.com");
    }

    #[tokio::test]
    async fn test_dev_header_without_email_is_bad_request() {
        let (app, _) = app(AuthSettings::local()).await;
        let response = app
            .oneshot(get_with("/auth/me", &[("x-user-name", "Nobody")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"detail": "X-User-Email required"})
        );
    }

    #[tokio::test]
    async fn test_dev_headers_disabled_is_unauthorized() {
        let (app, _) = app(AuthSettings::default()).await;
        let response = app
            .oneshot(get_with("/auth/me", &[("x-user-email", "a@x.com")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[tokio::test]
    async fn test_catalog_routes() {
        let (app, _) = app(AuthSettings::local()).await;
        let caller = [("x-user-email", "a@x.com")];

        let response = app
            .clone()
            .oneshot(get_with("/teams/all", &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let teams = body_json(app.clone().oneshot(get_with("/teams", &caller)).await.unwrap()).await;
        assert_eq!(teams.as_array().unwrap().len(), 1);

        let all_teams =
            body_json(app.clone().oneshot(get_with("/teams/all", &caller)).await.unwrap()).await;
        assert_eq!(all_teams.as_array().unwrap().len(), 4);

        let domains =
            body_json(app.clone().oneshot(get_with("/domains", &caller)).await.unwrap()).await;
        assert_eq!(domains.as_array().unwrap().len(), 1);

        let all_domains = body_json(app.oneshot(get_with("/domains/all", &caller)).await.unwrap()).await;
        assert_eq!(all_domains.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_cors_allows_dev_origins_only() {
        let (app, _) = app(AuthSettings::default()).await;

        let preflight = |origin: &str| {
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/auth/me")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap()
        };

        let response = app
            .clone()
            .oneshot(preflight("http://localhost:5173"))
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "http://localhost:5173"
        );

        let response = app
            .clone()
            .oneshot(preflight("chrome-extension://abcdef"))
            .await
            .unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_some());

        let response = app.oneshot(preflight("http://evil.example")).await.unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
