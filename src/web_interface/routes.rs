use crate::auth::TokenVerifier;
use crate::challenges::ChallengeCatalog;
use crate::container_management::ContainerManager;
use crate::error_handling::types::ValidationError;
use crate::session_management::SessionManager;
use crate::terminal_gateway::{TerminalGateway, TerminalQuery};
use crate::validation::ValidationCoordinator;
use crate::web_interface::responses::{
    ApiError, MessageResponse, SessionDescriptor, SessionList, StartSessionRequest,
    StartSessionResponse, ValidateResponse,
};
use log::{error, info};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::{reply, Filter, Rejection, Reply};

/// Shared dependencies of the HTTP handlers, built once at startup.
#[derive(Clone)]
pub struct ApiContext {
    pub sessions: Arc<SessionManager>,
    pub containers: Arc<ContainerManager>,
    pub validator: Arc<ValidationCoordinator>,
    pub gateway: Arc<TerminalGateway>,
    pub catalog: Arc<dyn ChallengeCatalog>,
    pub verifier: TokenVerifier,
}

fn with_ctx(
    ctx: ApiContext,
) -> impl Filter<Extract = (ApiContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn json_status<T: Serialize>(value: &T, status: StatusCode) -> warp::reply::Response {
    reply::with_status(reply::json(value), status).into_response()
}

fn error_response(message: impl Into<String>, status: StatusCode) -> warp::reply::Response {
    json_status(
        &ApiError {
            message: message.into(),
        },
        status,
    )
}

/// Bearer-token authentication; an `Err` is the ready-made 401 reply.
fn authenticate(
    ctx: &ApiContext,
    header: Option<&String>,
) -> Result<i64, warp::reply::Response> {
    ctx.verifier
        .bearer(header.map(|s| s.as_str()))
        .map_err(|e| error_response(e.to_string(), StatusCode::UNAUTHORIZED))
}

/// All session-surface routes plus the terminal upgrade.
pub fn routes(
    ctx: ApiContext,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    start_session_route(ctx.clone())
        .or(validate_route(ctx.clone()))
        .or(list_sessions_route(ctx.clone()))
        .or(get_session_route(ctx.clone()))
        .or(end_session_route(ctx.clone()))
        .or(terminal_route(ctx))
        .recover(handle_rejection)
}

/// POST /sessions/start
pub fn start_session_route(
    ctx: ApiContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / "start")
        .and(warp::post())
        .and(warp::body::json::<StartSessionRequest>())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_ctx(ctx))
        .and_then(start_session)
}

async fn start_session(
    body: StartSessionRequest,
    auth: Option<String>,
    ctx: ApiContext,
) -> Result<warp::reply::Response, Rejection> {
    let user_id = match authenticate(&ctx, auth.as_ref()) {
        Ok(user_id) => user_id,
        Err(resp) => return Ok(resp),
    };
    let challenge_id = body.challenge_id;

    if ctx.catalog.meta(challenge_id).is_none() {
        return Ok(error_response(
            format!("Challenge {} not found", challenge_id),
            StatusCode::NOT_FOUND,
        ));
    }

    // Duplicate start for the same challenge returns the live session.
    if let Some(existing) = ctx.sessions.find_for(user_id, challenge_id) {
        return Ok(json_status(
            &StartSessionResponse {
                session_id: existing.id,
                expires_at: existing.expires_at,
                message: Some("Existing session found".to_string()),
            },
            StatusCode::OK,
        ));
    }

    if ctx.sessions.is_pending(user_id, challenge_id) {
        return Ok(error_response(
            "Session creation already in progress",
            StatusCode::CONFLICT,
        ));
    }

    let decision = ctx.sessions.admit(user_id);
    if !decision.allowed {
        return Ok(error_response(
            decision
                .reason
                .unwrap_or_else(|| "Admission denied".to_string()),
            StatusCode::TOO_MANY_REQUESTS,
        ));
    }

    // Claim the pending key; losing the race means another request for
    // the same pair is already provisioning a container.
    if !ctx.sessions.mark_pending(user_id, challenge_id) {
        return Ok(error_response(
            "Session creation already in progress",
            StatusCode::CONFLICT,
        ));
    }

    // Container work happens outside every lock.
    let provisioned = async {
        ctx.containers.ensure_image().await?;
        ctx.containers.create_for_challenge(challenge_id, user_id).await
    }
    .await;

    let container_id = match provisioned {
        Ok(container_id) => container_id,
        Err(e) => {
            ctx.sessions.clear_pending(user_id, challenge_id);
            error!(
                "container provisioning failed for user {} challenge {}: {}",
                user_id, challenge_id, e
            );
            return Ok(error_response(
                "Failed to create session environment",
                StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
    };

    let created = ctx.sessions.create(user_id, challenge_id, container_id.clone());
    ctx.sessions.clear_pending(user_id, challenge_id);

    match created {
        Ok(session) => {
            info!(
                "user {} started session {} for challenge {}",
                user_id, session.id, challenge_id
            );
            Ok(json_status(
                &StartSessionResponse {
                    session_id: session.id,
                    expires_at: session.expires_at,
                    message: None,
                },
                StatusCode::OK,
            ))
        }
        Err(e) => {
            // Caps were exceeded by a racing insert; reclaim the container.
            if let Err(remove_err) = ctx.containers.remove(&container_id).await {
                error!(
                    "failed to reclaim container {} after denied insert: {}",
                    container_id, remove_err
                );
            }
            Ok(error_response(e.to_string(), StatusCode::TOO_MANY_REQUESTS))
        }
    }
}

/// POST /sessions/:id/validate
pub fn validate_route(
    ctx: ApiContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid / "validate")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_ctx(ctx))
        .and_then(validate_session)
}

async fn validate_session(
    session_id: Uuid,
    auth: Option<String>,
    ctx: ApiContext,
) -> Result<warp::reply::Response, Rejection> {
    let user_id = match authenticate(&ctx, auth.as_ref()) {
        Ok(user_id) => user_id,
        Err(resp) => return Ok(resp),
    };

    match ctx.validator.validate(user_id, session_id).await {
        Ok(outcome) => Ok(json_status(
            &ValidateResponse {
                success: outcome.success,
                message: outcome.message,
                points: outcome.points,
            },
            StatusCode::OK,
        )),
        Err(ValidationError::NotFound) => {
            Ok(error_response("Session not found", StatusCode::NOT_FOUND))
        }
        Err(ValidationError::Forbidden) => Ok(error_response(
            "Session belongs to another user",
            StatusCode::FORBIDDEN,
        )),
        Err(ValidationError::NotActive) => Ok(error_response(
            "Session is not active",
            StatusCode::BAD_REQUEST,
        )),
        Err(ValidationError::Progress(e)) => {
            error!("validation failed to record progress: {}", e);
            Ok(error_response(
                "Failed to record validation",
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

/// GET /sessions
pub fn list_sessions_route(
    ctx: ApiContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions")
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_ctx(ctx))
        .and_then(list_sessions)
}

async fn list_sessions(
    auth: Option<String>,
    ctx: ApiContext,
) -> Result<warp::reply::Response, Rejection> {
    let user_id = match authenticate(&ctx, auth.as_ref()) {
        Ok(user_id) => user_id,
        Err(resp) => return Ok(resp),
    };

    let sessions = ctx
        .sessions
        .list_user(user_id)
        .iter()
        .map(SessionDescriptor::from)
        .collect();
    Ok(json_status(&SessionList { sessions }, StatusCode::OK))
}

/// GET /sessions/:id
pub fn get_session_route(
    ctx: ApiContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid)
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_ctx(ctx))
        .and_then(get_session)
}

async fn get_session(
    session_id: Uuid,
    auth: Option<String>,
    ctx: ApiContext,
) -> Result<warp::reply::Response, Rejection> {
    let user_id = match authenticate(&ctx, auth.as_ref()) {
        Ok(user_id) => user_id,
        Err(resp) => return Ok(resp),
    };

    match ctx.sessions.get(session_id) {
        Some(session) if session.user_id == user_id => {
            Ok(json_status(&SessionDescriptor::from(&session), StatusCode::OK))
        }
        Some(_) => Ok(error_response(
            "Session belongs to another user",
            StatusCode::FORBIDDEN,
        )),
        None => Ok(error_response("Session not found", StatusCode::NOT_FOUND)),
    }
}

/// DELETE /sessions/:id
pub fn end_session_route(
    ctx: ApiContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid)
        .and(warp::delete())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_ctx(ctx))
        .and_then(end_session)
}

async fn end_session(
    session_id: Uuid,
    auth: Option<String>,
    ctx: ApiContext,
) -> Result<warp::reply::Response, Rejection> {
    let user_id = match authenticate(&ctx, auth.as_ref()) {
        Ok(user_id) => user_id,
        Err(resp) => return Ok(resp),
    };

    let session = match ctx.sessions.get(session_id) {
        Some(session) if session.user_id == user_id => session,
        Some(_) => {
            return Ok(error_response(
                "Session belongs to another user",
                StatusCode::FORBIDDEN,
            ))
        }
        None => return Ok(error_response("Session not found", StatusCode::NOT_FOUND)),
    };

    if let Err(e) = ctx.containers.remove(&session.container_id).await {
        error!(
            "failed to remove container {} for ended session {}: {}",
            session.container_id, session.id, e
        );
        return Ok(error_response(
            "Failed to tear down session environment",
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    }
    ctx.sessions.end(session.id);

    Ok(json_status(
        &MessageResponse {
            message: "Session ended".to_string(),
        },
        StatusCode::OK,
    ))
}

/// GET /terminal (WebSocket upgrade)
pub fn terminal_route(
    ctx: ApiContext,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    terminal_route_for(ctx.gateway)
}

/// Upgrade route over a bare gateway; split out so the gateway can be
/// exercised without the full context.
pub fn terminal_route_for(
    gateway: Arc<TerminalGateway>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("terminal")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<TerminalQuery>())
        .map(move |ws: warp::ws::Ws, query: TerminalQuery| {
            let gateway = gateway.clone();
            ws.on_upgrade(move |socket| gateway.handle_socket(socket, query))
        })
}

/// Maps framework rejections onto the API error payload.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
        )
    } else {
        error!("unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error".to_string(),
        )
    };
    Ok(error_response(message, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::mint;
    use crate::challenges::types::ChallengeMeta;
    use crate::configuration::types::{ContainerSettings, SessionSettings};
    use crate::container_management::test_support::MockDriver;
    use crate::progress::{DatabaseProgress, ProgressStore};
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    const SECRET: &str = "routes-test-secret";

    struct TestCatalog;

    impl ChallengeCatalog for TestCatalog {
        fn dir(&self, challenge_id: i64) -> Option<PathBuf> {
            (challenge_id == 1).then(|| PathBuf::from("/tmp/challenges/one"))
        }

        fn meta(&self, challenge_id: i64) -> Option<ChallengeMeta> {
            (challenge_id == 1).then(|| ChallengeMeta {
                id: 1,
                name: "first".to_string(),
                points: 100,
                dir: PathBuf::from("/tmp/challenges/one"),
            })
        }

        fn list(&self) -> Vec<ChallengeMeta> {
            self.meta(1).into_iter().collect()
        }
    }

    async fn context() -> (ApiContext, Arc<MockDriver>) {
        context_with(SessionSettings::default()).await
    }

    async fn context_with(settings: SessionSettings) -> (ApiContext, Arc<MockDriver>) {
        let driver = Arc::new(MockDriver::new());
        let catalog: Arc<dyn ChallengeCatalog> = Arc::new(TestCatalog);
        let containers = Arc::new(ContainerManager::new(
            driver.clone(),
            ContainerSettings::default(),
            catalog.clone(),
        ));
        let (close_tx, _close_rx) = mpsc::unbounded_channel();
        let sessions = Arc::new(SessionManager::new(settings, close_tx));

        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("routes.sqlite3");
        Box::leak(Box::new(dir));
        let progress: Arc<dyn ProgressStore> =
            Arc::new(DatabaseProgress::connect_file(db_path).await.unwrap());

        let verifier = TokenVerifier::new(SECRET);
        let gateway = Arc::new(TerminalGateway::new(
            sessions.clone(),
            containers.clone(),
            verifier.clone(),
        ));
        let validator = Arc::new(ValidationCoordinator::new(
            sessions.clone(),
            containers.clone(),
            progress,
            catalog.clone(),
        ));

        (
            ApiContext {
                sessions,
                containers,
                validator,
                gateway,
                catalog,
                verifier,
            },
            driver,
        )
    }

    fn bearer(user_id: i64) -> String {
        format!("Bearer {}", mint(SECRET, user_id))
    }

    #[tokio::test]
    async fn start_session_happy_path() {
        let (ctx, driver) = context().await;
        let api = routes(ctx.clone());

        let resp = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(42))
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: StartSessionResponse = serde_json::from_slice(resp.body()).unwrap();
        assert!(body.message.is_none());
        assert_eq!(ctx.sessions.active_count(), 1);
        // The container spec mounted the challenge read-only.
        let specs = driver.created_specs.lock().unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].mounts[0].target, "/challenge");
        assert!(specs[0].mounts[0].read_only);
    }

    #[tokio::test]
    async fn duplicate_start_returns_existing_session() {
        let (ctx, _driver) = context().await;
        let api = routes(ctx.clone());

        let first = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(42))
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api)
            .await;
        let first: StartSessionResponse = serde_json::from_slice(first.body()).unwrap();

        let second = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(42))
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api)
            .await;
        assert_eq!(second.status(), StatusCode::OK);
        let second: StartSessionResponse = serde_json::from_slice(second.body()).unwrap();

        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.message.as_deref(), Some("Existing session found"));
        assert_eq!(ctx.sessions.active_count(), 1);
    }

    #[tokio::test]
    async fn per_user_cap_yields_429_with_reason() {
        let (ctx, _driver) = context().await;
        let api = routes(ctx.clone());

        // Existing session on another challenge; same-challenge would
        // return the existing session instead.
        ctx.sessions.create(42, 99, "c-other".to_string()).unwrap();

        let resp = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(42))
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: ApiError = serde_json::from_slice(resp.body()).unwrap();
        assert!(body
            .message
            .contains("Maximum 1 active session(s) per user"));
    }

    #[tokio::test]
    async fn global_cap_yields_429_at_capacity() {
        let (ctx, _driver) = context_with(SessionSettings {
            max_total: 15,
            ..Default::default()
        })
        .await;
        let api = routes(ctx.clone());

        for user in 100..115 {
            ctx.sessions
                .create(user, 99, format!("c-{}", user))
                .unwrap();
        }

        let resp = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(16))
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: ApiError = serde_json::from_slice(resp.body()).unwrap();
        assert!(body.message.contains("System at capacity"));
    }

    #[tokio::test]
    async fn pending_creation_yields_409() {
        let (ctx, _driver) = context().await;
        let api = routes(ctx.clone());

        assert!(ctx.sessions.mark_pending(42, 1));
        let resp = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(42))
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_challenge_yields_404() {
        let (ctx, _driver) = context().await;
        let api = routes(ctx);

        let resp = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(42))
            .json(&serde_json::json!({"challengeId": 999}))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_body_field_yields_400() {
        let (ctx, _driver) = context().await;
        let api = routes(ctx);

        let resp = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(42))
            .json(&serde_json::json!({}))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_token_yields_401() {
        let (ctx, _driver) = context().await;
        let api = routes(ctx);

        let resp = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validate_solves_and_removes_session() {
        let (ctx, driver) = context().await;
        let api = routes(ctx.clone());

        let start = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(42))
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api)
            .await;
        let started: StartSessionResponse = serde_json::from_slice(start.body()).unwrap();

        let resp = warp::test::request()
            .method("POST")
            .path(&format!("/sessions/{}/validate", started.session_id))
            .header("authorization", bearer(42))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: ValidateResponse = serde_json::from_slice(resp.body()).unwrap();
        assert!(body.success);
        assert_eq!(body.points, Some(100));
        assert_eq!(body.message, "Congratulations! Challenge solved!");

        // Session is gone afterwards.
        let gone = warp::test::request()
            .method("GET")
            .path(&format!("/sessions/{}", started.session_id))
            .header("authorization", bearer(42))
            .reply(&api)
            .await;
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
        assert_eq!(driver.removed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_validate_keeps_session_alive() {
        let (ctx, driver) = context().await;
        driver.set_validate_exit(1);
        let api = routes(ctx.clone());

        let start = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(42))
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api)
            .await;
        let started: StartSessionResponse = serde_json::from_slice(start.body()).unwrap();

        let resp = warp::test::request()
            .method("POST")
            .path(&format!("/sessions/{}/validate", started.session_id))
            .header("authorization", bearer(42))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: ValidateResponse = serde_json::from_slice(resp.body()).unwrap();
        assert!(!body.success);
        assert_eq!(body.points, None);

        // Session and container both still live.
        assert!(ctx.sessions.get(started.session_id).is_some());
        assert!(driver.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_session_is_forbidden() {
        let (ctx, _driver) = context().await;
        let api = routes(ctx.clone());
        let session = ctx.sessions.create(7, 1, "c-7".to_string()).unwrap();

        for (method, path) in [
            ("GET", format!("/sessions/{}", session.id)),
            ("DELETE", format!("/sessions/{}", session.id)),
            ("POST", format!("/sessions/{}/validate", session.id)),
        ] {
            let resp = warp::test::request()
                .method(method)
                .path(&path)
                .header("authorization", bearer(42))
                .reply(&api)
                .await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{} {}", method, path);
        }
    }

    #[tokio::test]
    async fn delete_ends_session_and_reclaims_container() {
        let (ctx, driver) = context().await;
        let api = routes(ctx.clone());
        let session = ctx.sessions.create(42, 1, "c-42".to_string()).unwrap();

        let resp = warp::test::request()
            .method("DELETE")
            .path(&format!("/sessions/{}", session.id))
            .header("authorization", bearer(42))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: MessageResponse = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body.message, "Session ended");
        assert!(ctx.sessions.get(session.id).is_none());
        assert_eq!(driver.removed.lock().unwrap().as_slice(), ["c-42"]);
    }

    #[tokio::test]
    async fn list_sessions_returns_only_mine() {
        let (ctx, _driver) = context().await;
        let api = routes(ctx.clone());
        ctx.sessions.create(42, 1, "c-a".to_string()).unwrap();
        ctx.sessions.create(7, 1, "c-b".to_string()).unwrap();

        let resp = warp::test::request()
            .method("GET")
            .path("/sessions")
            .header("authorization", bearer(42))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: SessionList = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body.sessions.len(), 1);
        assert_eq!(body.sessions[0].challenge_id, 1);
    }

    #[tokio::test]
    async fn start_race_yields_single_session() {
        let (ctx, _driver) = context().await;
        let api = routes(ctx.clone());

        let left = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(5))
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api);
        let right = warp::test::request()
            .method("POST")
            .path("/sessions/start")
            .header("authorization", bearer(5))
            .json(&serde_json::json!({"challengeId": 1}))
            .reply(&api);

        let (left, right) = tokio::join!(left, right);
        let statuses = [left.status(), right.status()];

        // One definite winner; the loser saw 409 (in-flight), the
        // existing session (200), or the cap (429) depending on timing.
        assert!(statuses.contains(&StatusCode::OK));
        assert_eq!(ctx.sessions.active_count(), 1);
        assert_eq!(ctx.sessions.list_user(5).len(), 1);
    }
}
