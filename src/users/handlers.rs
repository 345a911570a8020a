use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRef, Path, State,
    },
    http::{header, HeaderName, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest, UpdateUserRequest},
    errors::UserError,
};
use crate::{
    auth::{extractors::AuthUser, jwt::JwtKeys},
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
}

/// Every handler here takes an `AuthUser`.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/users/update", put(update))
        .route("/users/all", get(list_all))
        .route("/users/:id", get(get_by_id))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<PublicUser>), UserError> {
    let Json(payload) = payload?;
    let user = state.users.register(payload).await?;
    let location = format!("/users/{}", user.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(user.into()),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, UserError> {
    let Json(payload) = payload?;
    let user = state.users.authenticate(&payload).await?;

    let token = JwtKeys::from_ref(&state).sign(user.id, &user.login)?;
    Ok(Json(LoginResponse {
        id: user.id,
        name: user.name,
        login: user.login,
        photo: user.photo,
        token,
    }))
}

#[instrument(skip(state, payload, caller), fields(caller_id = caller.id, caller = %caller.login))]
pub async fn update(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<PublicUser>, UserError> {
    let Json(payload) = payload?;
    let user = state.users.update(payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, caller), fields(caller_id = caller.id, caller = %caller.login))]
pub async fn list_all(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<PublicUser>>, UserError> {
    let users = state.users.list_all().await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, caller), fields(caller_id = caller.id, caller = %caller.login))]
pub async fn get_by_id(
    State(state): State<AppState>,
    caller: AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<PublicUser>, UserError> {
    let Path(id) = id?;
    let user = state.users.get_by_id(id).await?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState, users::services::tests::register_req};

    struct TestApp {
        state: AppState,
        app: Router,
    }

    impl TestApp {
        /// Fresh store seeded with the root user.
        async fn start() -> Self {
            let state = AppState::fake();
            state.users.store().delete_all().await.unwrap();
            state
                .users
                .register(register_req("Root", "root@root.com", "rootroot"))
                .await
                .unwrap();
            let app = build_app(state.clone());
            Self { state, app }
        }

        async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
            let res = self.app.clone().oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
                .await
                .unwrap();
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, body)
        }
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_basic(mut req: Request<Body>, login: &str, password: &str) -> Request<Body> {
        let value = format!("Basic {}", STANDARD.encode(format!("{login}:{password}")));
        req.headers_mut()
            .insert(header::AUTHORIZATION, value.parse().unwrap());
        req
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn user_body(id: i64, name: &str, login: &str, password: &str) -> Value {
        json!({ "id": id, "name": name, "login": login, "password": password, "photo": "" })
    }

    #[tokio::test]
    async fn register_creates_user() {
        let t = TestApp::start().await;
        let (status, body) = t
            .send(json_request(
                "POST",
                "/users/register",
                user_body(0, "Gabriel Rodrigues", "gabriel@email.com.br", "12345678"),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["id"].as_i64().unwrap() > 0);
        assert_eq!(body["login"], "gabriel@email.com.br");
        assert!(body.get("password").is_none());
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn register_sets_location_header() {
        let t = TestApp::start().await;
        let res = t
            .app
            .clone()
            .oneshot(json_request(
                "POST",
                "/users/register",
                user_body(0, "Gabriel Sponda", "gabriels@email.com", "12345678"),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let location = res.headers().get(header::LOCATION).unwrap().to_str().unwrap();
        assert!(location.starts_with("/users/"));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_login() {
        let t = TestApp::start().await;
        let existing = t
            .state
            .users
            .register(register_req("Amanda Tsai", "amanda@email.com.br", "12345678"))
            .await
            .unwrap();

        let (status, body) = t
            .send(json_request(
                "POST",
                "/users/register",
                user_body(0, "Amanda Tsai", "amanda@email.com.br", "12345678"),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some());
        assert_eq!(t.state.users.get_by_id(existing.id).await.unwrap(), existing);
    }

    #[tokio::test]
    async fn register_rejects_malformed_bodies() {
        let t = TestApp::start().await;
        let (status, _) = t
            .send(json_request(
                "POST",
                "/users/register",
                json!({ "name": "No Login", "password": "12345678" }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .method("POST")
            .uri("/users/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = t.send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_returns_user_and_token() {
        let t = TestApp::start().await;
        let user = t
            .state
            .users
            .register(register_req("Gabriel Rodrigues", "gabrielr@email.com", "root1234"))
            .await
            .unwrap();

        let (status, body) = t
            .send(json_request(
                "POST",
                "/users/login",
                json!({ "login": "gabrielr@email.com", "password": "root1234" }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], user.id);
        assert_eq!(body["name"], "Gabriel Rodrigues");
        assert!(!body["token"].as_str().unwrap().is_empty());
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let t = TestApp::start().await;
        let (status, _) = t
            .send(json_request(
                "POST",
                "/users/login",
                json!({ "login": "root@root.com", "password": "wrongpass" }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = t
            .send(json_request(
                "POST",
                "/users/login",
                json!({ "login": "ghost@root.com", "password": "rootroot" }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_routes_require_credentials() {
        let t = TestApp::start().await;
        let (status, _) = t.send(get("/users/all")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = t
            .send(with_basic(get("/users/all"), "root@root.com", "not-root"))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut bearer = get("/users/all");
        bearer
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer not-a-token".parse().unwrap());
        let (status, _) = t.send(bearer).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_with_basic_auth() {
        let t = TestApp::start().await;
        let kendal = t
            .state
            .users
            .register(register_req("Kendal Katherine", "kendal@email.com.br", "12345678"))
            .await
            .unwrap();

        let req = with_basic(
            json_request(
                "PUT",
                "/users/update",
                user_body(kendal.id, "Kendal Katherine Correia", "kendalk@email.com.br", "78945612"),
            ),
            "root@root.com",
            "rootroot",
        );
        let (status, body) = t.send(req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Kendal Katherine Correia");
        assert_eq!(body["login"], "kendalk@email.com.br");

        let stored = t.state.users.get_by_id(kendal.id).await.unwrap();
        assert_eq!(stored.login, "kendalk@email.com.br");
        assert!(t
            .state
            .users
            .authenticate_credentials("kendalk@email.com.br", "78945612")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn update_unknown_user_is_not_found() {
        let t = TestApp::start().await;
        let req = with_basic(
            json_request("PUT", "/users/update", json!({ "id": 9999, "name": "Ghost" })),
            "root@root.com",
            "rootroot",
        );
        let (status, _) = t.send(req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_includes_registered_users() {
        let t = TestApp::start().await;
        for (name, login) in [
            ("Vitor Nascimento", "vitor@email.com.br"),
            ("Samara Almeida", "samara@email.com.br"),
        ] {
            t.state
                .users
                .register(register_req(name, login, "12345678"))
                .await
                .unwrap();
        }

        let (status, body) = t
            .send(with_basic(get("/users/all"), "root@root.com", "rootroot"))
            .await;
        assert_eq!(status, StatusCode::OK);
        let logins: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["login"].as_str().unwrap())
            .collect();
        assert_eq!(
            logins,
            vec!["root@root.com", "vitor@email.com.br", "samara@email.com.br"]
        );
    }

    #[tokio::test]
    async fn get_by_id_found_and_missing() {
        let t = TestApp::start().await;
        let user = t
            .state
            .users
            .register(register_req("Gabriel Sponda", "gabriels@email.com", "12345678"))
            .await
            .unwrap();

        let (status, body) = t
            .send(with_basic(
                get(&format!("/users/{}", user.id)),
                "root@root.com",
                "rootroot",
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Gabriel Sponda");

        let (status, _) = t
            .send(with_basic(
                get(&format!("/users/{}", user.id + 1000)),
                "root@root.com",
                "rootroot",
            ))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_token_opens_protected_routes() {
        let t = TestApp::start().await;
        let (_, body) = t
            .send(json_request(
                "POST",
                "/users/login",
                json!({ "login": "root@root.com", "password": "rootroot" }),
            ))
            .await;
        let token = body["token"].as_str().unwrap().to_string();

        let mut req = get("/users/all");
        req.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        let (status, _) = t.send(req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn register_login_update_list_flow() {
        let t = TestApp::start().await;

        let (status, created) = t
            .send(json_request(
                "POST",
                "/users/register",
                user_body(0, "Gabriel Rodrigues", "gabriel@email.com.br", "12345678"),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().unwrap();

        let (status, _) = t
            .send(json_request(
                "POST",
                "/users/register",
                user_body(0, "Gabriel Rodrigues", "gabriel@email.com.br", "12345678"),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = t
            .send(json_request(
                "POST",
                "/users/login",
                json!({ "login": "gabriel@email.com.br", "password": "12345678" }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = t
            .send(with_basic(
                json_request(
                    "PUT",
                    "/users/update",
                    json!({ "id": id, "name": "Gabriel R.", "login": "gabriel@email.com.br" }),
                ),
                "gabriel@email.com.br",
                "12345678",
            ))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = t
            .send(with_basic(get("/users/all"), "gabriel@email.com.br", "12345678"))
            .await;
        assert_eq!(status, StatusCode::OK);
        let gabriel = body
            .as_array()
            .unwrap()
            .iter()
            .find(|u| u["id"] == id)
            .unwrap();
        assert_eq!(gabriel["name"], "Gabriel R.");
    }

    #[tokio::test]
    async fn non_numeric_id_is_a_json_bad_request() {
        let t = TestApp::start().await;
        let res = t
            .app
            .clone()
            .oneshot(with_basic(get("/users/abc"), "root@root.com", "rootroot"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let content_type = res.headers().get(header::CONTENT_TYPE).unwrap();
        assert_eq!(content_type, "application/json");
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].as_str().unwrap().contains("abc"));
    }
}
