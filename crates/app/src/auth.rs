use std::time::Instant;

use axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    Form, Json,
};
use metrics::{counter, histogram};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{error, info, warn};

use credvault_core::AuthError;

use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    domain: Option<String>,
}

#[derive(Deserialize)]
pub struct SigninRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    status: &'static str,
    username: String,
}

/// Request body accepted as JSON or as an urlencoded HTML form.
pub struct CredentialBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for CredentialBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ProblemResponse;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        let parsed = if is_json {
            Json::<T>::from_request(req, state)
                .await
                .map(|Json(value)| value)
                .map_err(|_| ())
        } else {
            Form::<T>::from_request(req, state)
                .await
                .map(|Form(value)| value)
                .map_err(|_| ())
        };

        parsed.map(Self).map_err(|()| {
            ProblemResponse::new(
                StatusCode::BAD_REQUEST,
                "invalid_body",
                "expected a JSON or form body with username and password",
            )
        })
    }
}

pub async fn signup(
    State(state): State<AppState>,
    CredentialBody(request): CredentialBody<SignupRequest>,
) -> Result<(StatusCode, Json<CredentialResponse>), ProblemResponse> {
    let start = Instant::now();
    let result = state
        .credentials()
        .register_with_domain(
            &request.username,
            &request.password,
            request.domain.as_deref(),
        )
        .await;
    record("credential_register_total", "signup", &result, start);

    match result {
        Ok(()) => {
            info!(stage = "auth", username = %request.username, "signup succeeded");
            Ok((
                StatusCode::CREATED,
                Json(CredentialResponse {
                    status: "registered",
                    username: request.username,
                }),
            ))
        }
        Err(err) => {
            log_failure("signup", &request.username, &err);
            Err(ProblemResponse::from(&err))
        }
    }
}

pub async fn signin(
    State(state): State<AppState>,
    CredentialBody(request): CredentialBody<SigninRequest>,
) -> Result<Json<CredentialResponse>, ProblemResponse> {
    let start = Instant::now();
    let result = state
        .credentials()
        .verify(&request.username, &request.password)
        .await;
    record("credential_verify_total", "signin", &result, start);

    match result {
        Ok(authenticated) => {
            info!(stage = "auth", username = %authenticated.username, "signin succeeded");
            Ok(Json(CredentialResponse {
                status: "authenticated",
                username: authenticated.username,
            }))
        }
        Err(err) => {
            log_failure("signin", &request.username, &err);
            Err(ProblemResponse::from(&err))
        }
    }
}

fn record<T>(
    counter_name: &'static str,
    op: &'static str,
    result: &Result<T, AuthError>,
    start: Instant,
) {
    let label = match result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    counter!(counter_name, "result" => label).increment(1);
    histogram!("credential_request_seconds", "op" => op).record(start.elapsed().as_secs_f64());
}

fn log_failure(op: &'static str, username: &str, err: &AuthError) {
    match err {
        AuthError::StorageUnavailable(_) | AuthError::Hashing(_) => {
            error!(stage = "auth", op, %username, error = %err, "credential request failed");
        }
        _ => {
            warn!(stage = "auth", op, %username, reason = err.kind(), "credential request rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::router::{app_router, tests::setup_state};

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn form_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
        let encoded = serde_urlencoded::to_string(fields).expect("encode form");
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(encoded))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        serde_json::from_slice(&collected.to_bytes()).expect("json body")
    }

    #[tokio::test]
    async fn signup_then_signin_succeeds() {
        let (state, _db) = setup_state().await;
        let app = app_router(state);

        let response = app
            .clone()
            .oneshot(json_request(
                "/signup",
                json!({"username": "alice", "password": "p@ss1"}),
            ))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = read_json(response).await;
        assert_eq!(body["status"], "registered");
        assert_eq!(body["username"], "alice");

        let response = app
            .oneshot(json_request(
                "/signin",
                json!({"username": "alice", "password": "p@ss1"}),
            ))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "authenticated");
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let (state, _db) = setup_state().await;
        let app = app_router(state);
        let payload = json!({"username": "alice", "password": "p@ss1"});

        let first = app
            .clone()
            .oneshot(json_request("/signup", payload.clone()))
            .await
            .expect("handler should respond");
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .oneshot(json_request(
                "/signup",
                json!({"username": "alice", "password": "other"}),
            ))
            .await
            .expect("handler should respond");
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(
            second.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
        let body = read_json(second).await;
        assert_eq!(body["type"], "duplicate_username");
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_look_identical() {
        let (state, _db) = setup_state().await;
        let app = app_router(state);

        app.clone()
            .oneshot(json_request(
                "/signup",
                json!({"username": "alice", "password": "p@ss1"}),
            ))
            .await
            .expect("handler should respond");

        let wrong = app
            .clone()
            .oneshot(json_request(
                "/signin",
                json!({"username": "alice", "password": "wrong"}),
            ))
            .await
            .expect("handler should respond");
        let unknown = app
            .oneshot(json_request(
                "/signin",
                json!({"username": "bob", "password": "p@ss1"}),
            ))
            .await
            .expect("handler should respond");

        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_json(wrong).await, read_json(unknown).await);
    }

    #[tokio::test]
    async fn accepts_form_encoded_bodies() {
        let (state, db) = setup_state().await;
        let app = app_router(state);

        let response = app
            .clone()
            .oneshot(form_request(
                "/signup",
                &[
                    ("username", "erin"),
                    ("password", "hunter2"),
                    ("domain", "tenant-a"),
                ],
            ))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::CREATED);

        let stored = db
            .credentials()
            .find_by_username("erin")
            .await
            .expect("find")
            .expect("record");
        assert_eq!(stored.domain.as_deref(), Some("tenant-a"));
        assert_ne!(stored.password_hash, "hunter2");

        let response = app
            .oneshot(form_request(
                "/signin",
                &[("username", "erin"), ("password", "hunter2")],
            ))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_password_is_bad_request() {
        let (state, db) = setup_state().await;
        let app = app_router(state);

        let response = app
            .oneshot(json_request("/signup", json!({"username": "alice"})))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["type"], "missing_field");
        assert_eq!(db.credentials().count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn overlong_password_signup_is_bad_request() {
        let (state, db) = setup_state().await;
        let app = app_router(state);
        let password = format!("{}correct", "x".repeat(72));

        let response = app
            .oneshot(json_request(
                "/signup",
                json!({"username": "alice", "password": password}),
            ))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["type"], "password_too_long");
        assert_eq!(db.credentials().count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let (state, _db) = setup_state().await;
        let app = app_router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/signin")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.expect("handler should respond");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["type"], "invalid_body");
    }

    #[tokio::test]
    async fn closed_storage_returns_service_unavailable() {
        let (state, db) = setup_state().await;
        let app = app_router(state);
        db.close().await;

        let response = app
            .oneshot(json_request(
                "/signin",
                json!({"username": "alice", "password": "p@ss1"}),
            ))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = read_json(response).await;
        assert_eq!(body["type"], "storage_unavailable");
    }
}
