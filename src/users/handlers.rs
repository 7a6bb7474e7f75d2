use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, instrument, warn};

use crate::{
    auth::jwt::AuthUser,
    envelope::Envelope,
    errors::ServiceError,
    state::AppState,
    users::{
        dto::{AuthPayload, LoginRequest, RegisterRequest, UpdateUserRequest},
        repo_types::User,
        validation,
    },
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/user/register", post(register))
        .route("/user/login", post(login))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/user", get(list_users)).route(
        "/user/:id",
        get(get_user).patch(update_user).delete(delete_user),
    )
}

fn rejected<T>(e: ServiceError) -> Envelope<T> {
    warn!(error = %e, "request rejected");
    Envelope::failure(e.to_string(), e.status().unwrap_or(400))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    body.map(|Json(v)| v)
        .map_err(|e| ServiceError::BadRequest(e.body_text()))
}

fn user_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ServiceError> {
    path.map(|Path(id)| id)
        .map_err(|_| ServiceError::BadRequest("id must be a number".into()))
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Envelope<AuthPayload> {
    match json_body(body).and_then(validation::register) {
        Ok(req) => {
            state
                .users
                .register(req.username, req.email, req.password)
                .await
        }
        Err(e) => rejected(e),
    }
}

#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Envelope<AuthPayload> {
    match json_body(body).and_then(validation::login) {
        Ok(req) => state.users.authenticate(req.email, req.password).await,
        Err(e) => rejected(e),
    }
}

#[instrument(skip(state, auth))]
pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> Envelope<Vec<User>> {
    debug!(caller = auth.0.sub, "list users");
    state.users.list_all().await
}

#[instrument(skip(state, auth, path))]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Envelope<User> {
    debug!(caller = auth.0.sub, "get user");
    match user_id(path) {
        Ok(id) => state.users.get_by_id(id).await,
        Err(e) => rejected(e),
    }
}

#[instrument(skip(state, auth, path, body))]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Envelope<User> {
    debug!(caller = auth.0.sub, "update user");
    let input = user_id(path).and_then(|id| {
        let changes = json_body(body).and_then(validation::update)?;
        Ok((id, changes))
    });
    match input {
        Ok((id, changes)) => state.users.update_by_id(id, changes).await,
        Err(e) => rejected(e),
    }
}

#[instrument(skip(state, auth, path))]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Envelope<User> {
    debug!(caller = auth.0.sub, "delete user");
    match user_id(path) {
        Ok(id) => state.users.delete_by_id(id).await,
        Err(e) => rejected(e),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState};

    async fn call(
        app: &axum::Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn register_alice(app: &axum::Router) -> (i64, String) {
        let (status, body) = call(
            app,
            Method::POST,
            "/user/register",
            None,
            Some(json!({ "username": "alice", "email": "a@x.com", "password": "Secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User created successfully");
        let id = body["data"]["user"]["id"].as_i64().unwrap();
        let jwt = body["data"]["jwt"].as_str().unwrap().to_string();
        (id, jwt)
    }

    #[tokio::test]
    async fn register_then_login_over_http() {
        let app = build_app(AppState::fake());
        let (id, _) = register_alice(&app).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/user/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "Secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["id"], id);
        assert!(body["data"]["user"].get("password_hash").is_none());
        assert!(body.get("statusCode").is_none());
    }

    #[tokio::test]
    async fn duplicate_register_relays_404_envelope() {
        let app = build_app(AppState::fake());
        register_alice(&app).await;
        let (status, body) = call(
            &app,
            Method::POST,
            "/user/register",
            None,
            Some(json!({ "username": "alice", "email": "a@x.com", "password": "Secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            json!({ "data": null, "message": "User already exist", "statusCode": 404 })
        );
    }

    #[tokio::test]
    async fn invalid_input_is_a_400_envelope() {
        let app = build_app(AppState::fake());
        let (status, body) = call(
            &app,
            Method::POST,
            "/user/login",
            None,
            Some(json!({ "email": "not-an-email", "password": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["statusCode"], 400);
        assert_eq!(body["data"], Value::Null);

        let (status, _) = call(
            &app,
            Method::POST,
            "/user/register",
            None,
            Some(json!({ "email": "a@x.com" })),
        )
        .await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, Method::GET, "/user", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["statusCode"], 401);

        let (status, _) = call(&app, Method::GET, "/user", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn crud_with_token() {
        let app = build_app(AppState::fake());
        let (id, jwt) = register_alice(&app).await;
        let uri = format!("/user/{id}");

        let (status, body) = call(&app, Method::GET, "/user", Some(&jwt), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = call(
            &app,
            Method::PATCH,
            &uri,
            Some(&jwt),
            Some(json!({ "username": "alicia" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User updated successfully");
        assert_eq!(body["data"]["username"], "alicia");

        let (status, body) = call(&app, Method::DELETE, &uri, Some(&jwt), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], id);

        let (status, body) = call(&app, Method::GET, &uri, Some(&jwt), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "User not found");
    }

    #[tokio::test]
    async fn non_numeric_id_is_rejected() {
        let app = build_app(AppState::fake());
        let (_, jwt) = register_alice(&app).await;
        let (status, body) = call(&app, Method::GET, "/user/abc", Some(&jwt), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "id must be a number");
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = build_app(AppState::fake());
        let (status, _) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
