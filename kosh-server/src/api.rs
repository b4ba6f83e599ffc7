//! HTTP boundary for the moderation engine.
//!
//! The identity context arrives in `x-user-id` / `x-user-roles` headers set
//! by the auth collaborator in front of this service; the engine itself
//! never handles credentials. Errors cross the boundary as
//! `{"success": false, "error_kind": ..., "message": ...}` and clients
//! branch on `error_kind`, never on message text.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use kosh_core::{
    AdminDecision, CorrectionType, EntityKind, IdentityContext, ReportId, Role, UserId,
    VoteDecision, WordId,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::moderation::{
    AdminGateway, CorrectionApplier, ModerationError, ModerationService, WordDraft,
};

/// Shared state for all handlers.
pub struct AppState {
    pub service: ModerationService,
    pub gateway: AdminGateway,
    pub applier: CorrectionApplier,
    /// User ids granted admin at startup (`ADMIN_USERS`), independent of the
    /// roles the identity provider sends per request.
    pub admin_users: Vec<UserId>,
}

/// Build the moderation API router.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/words", post(submit_word))
        .route("/words/:id/status", get(word_status))
        .route("/words/:id/vote", post(vote_word))
        .route("/words/:id/decision", post(decide_word))
        .route("/words/:id/corrections", post(propose_correction))
        .route("/words/:id/reports", post(file_report))
        .route("/corrections/:id/status", get(correction_status))
        .route("/corrections/:id/vote", post(vote_correction))
        .route("/corrections/:id/decision", post(decide_correction))
        .route("/corrections/:id/apply", post(apply_correction))
        .route("/reports/:id/resolve", post(resolve_report))
        .with_state(state)
}

/// Error type for the HTTP boundary: a domain error plus the cases that
/// only exist at the edge (missing identity headers).
enum ApiError {
    Unauthenticated,
    Moderation(ModerationError),
}

impl From<ModerationError> for ApiError {
    fn from(err: ModerationError) -> Self {
        Self::Moderation(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "permission_denied",
                "missing x-user-id header".to_string(),
            ),
            Self::Moderation(err) => (error_status(&err), err.kind(), err.to_string()),
        };
        (
            status,
            Json(json!({
                "success": false,
                "error_kind": kind,
                "message": message,
            })),
        )
            .into_response()
    }
}

fn error_status(err: &ModerationError) -> StatusCode {
    match err {
        ModerationError::NotFound { .. } | ModerationError::ReportNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        ModerationError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        ModerationError::SelfVote { .. }
        | ModerationError::AlreadyVoted { .. }
        | ModerationError::InvalidStateForOperation { .. }
        | ModerationError::ApplyConflict { .. }
        | ModerationError::AlreadyApplied
        | ModerationError::Conflict { .. } => StatusCode::CONFLICT,
        ModerationError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ModerationError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Extract the caller's identity from the auth collaborator's headers.
fn identity(state: &AppState, headers: &HeaderMap) -> Result<IdentityContext, ApiError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .ok_or(ApiError::Unauthenticated)?;

    let mut roles = headers
        .get("x-user-roles")
        .and_then(|v| v.to_str().ok())
        .map(|s| {
            s.split(',')
                .filter_map(|r| Role::parse(r.trim()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| vec![Role::User]);

    if state.admin_users.iter().any(|u| u.as_str() == user_id) && !roles.contains(&Role::Admin) {
        roles.push(Role::Admin);
    }

    Ok(IdentityContext::new(user_id, roles))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "kosh",
    }))
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    decision: VoteDecision,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    decision: AdminDecision,
}

#[derive(Debug, Deserialize)]
struct ProposeCorrectionRequest {
    correction_type: CorrectionType,
    #[serde(default)]
    current_value: String,
    proposed_change: String,
    explanation: String,
}

#[derive(Debug, Deserialize)]
struct FileReportRequest {
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ResolveReportRequest {
    resolution: String,
}

#[derive(Debug, Serialize)]
struct CreatedResponse {
    success: bool,
    id: Uuid,
}

async fn submit_word(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<WordDraft>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let identity = identity(&state, &headers)?;
    let word_id = state.service.submit_word(draft, &identity).await?;
    Ok(Json(CreatedResponse {
        success: true,
        id: word_id.0,
    }))
}

async fn word_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let view = state.service.load_status(EntityKind::Word, id).await?;
    Ok(Json(json!({ "success": true, "entity": view })))
}

async fn correction_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let view = state
        .service
        .load_status(EntityKind::Correction, id)
        .await?;
    Ok(Json(json!({ "success": true, "entity": view })))
}

async fn vote_word(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    vote(state, EntityKind::Word, id, headers, req).await
}

async fn vote_correction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    vote(state, EntityKind::Correction, id, headers, req).await
}

async fn vote(
    state: Arc<AppState>,
    kind: EntityKind,
    id: Uuid,
    headers: HeaderMap,
    req: VoteRequest,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = identity(&state, &headers)?;
    let outcome = state
        .service
        .vote(kind, id, &identity, req.decision, req.comment)
        .await?;
    Ok(Json(json!({
        "success": true,
        "status": outcome.status,
        "votes_for": outcome.votes_for,
        "votes_against": outcome.votes_against,
    })))
}

async fn decide_word(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    decide(state, EntityKind::Word, id, headers, req).await
}

async fn decide_correction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    decide(state, EntityKind::Correction, id, headers, req).await
}

async fn decide(
    state: Arc<AppState>,
    kind: EntityKind,
    id: Uuid,
    headers: HeaderMap,
    req: DecisionRequest,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = identity(&state, &headers)?;
    let status = state
        .gateway
        .admin_decide(kind, id, req.decision, &identity)
        .await?;
    Ok(Json(json!({ "success": true, "status": status })))
}

async fn propose_correction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<ProposeCorrectionRequest>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let identity = identity(&state, &headers)?;
    let correction_id = state
        .service
        .propose_correction(
            WordId(id),
            &identity,
            req.correction_type,
            req.current_value,
            req.proposed_change,
            req.explanation,
        )
        .await?;
    Ok(Json(CreatedResponse {
        success: true,
        id: correction_id.0,
    }))
}

async fn apply_correction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Applying is an admin action: the word mutation must not be
    // triggerable by arbitrary users re-posting the apply endpoint.
    let identity = identity(&state, &headers)?;
    if !identity.is_admin() {
        return Err(ModerationError::PermissionDenied {
            user: identity.user_id,
        }
        .into());
    }
    state
        .applier
        .apply(kosh_core::CorrectionId(id))
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn file_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<FileReportRequest>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let identity = identity(&state, &headers)?;
    let report_id = state
        .service
        .file_report(WordId(id), &identity, req.reason)
        .await?;
    Ok(Json(CreatedResponse {
        success: true,
        id: report_id.0,
    }))
}

async fn resolve_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<ResolveReportRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = identity(&state, &headers)?;
    let report = state
        .gateway
        .resolve_report(ReportId(id), req.resolution, &identity)
        .await?;
    Ok(Json(json!({
        "success": true,
        "report_id": report.id,
        "status": "resolved",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::{ChangeNotifier, InMemoryStore, ThresholdPolicy};
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn test_router() -> Router {
        test_router_with_admins(Vec::new())
    }

    fn test_router_with_admins(admin_users: Vec<UserId>) -> Router {
        let store: Arc<dyn crate::moderation::EntityStore> = Arc::new(InMemoryStore::new());
        let notifier = ChangeNotifier::default();
        let policy = ThresholdPolicy::default();
        let state = Arc::new(AppState {
            service: ModerationService::new(store.clone(), policy, notifier.clone()),
            gateway: AdminGateway::new(store.clone(), policy, notifier.clone()),
            applier: CorrectionApplier::new(store, policy, notifier),
            admin_users,
        });
        api_router(state)
    }

    fn post_json(uri: &str, user: Option<&str>, roles: &str, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-user-roles", roles);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn word_body() -> serde_json::Value {
        json!({
            "kurukh_word": "pachcho",
            "meanings": [{"language": "en", "definition": "grandmother"}],
            "part_of_speech": "noun",
        })
    }

    #[tokio::test]
    async fn test_submit_and_vote_roundtrip() {
        let app = test_router();

        let response = app
            .clone()
            .oneshot(post_json("/words", Some("u1"), "user", word_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        let id = body["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/words/{id}/vote"),
                Some("u2"),
                "user",
                json!({"decision": "approve"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["votes_for"], 1);
        assert_eq!(body["status"], "community_review");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let app = test_router();
        let response = app
            .oneshot(post_json("/words", None, "user", word_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "permission_denied");
    }

    #[tokio::test]
    async fn test_self_vote_maps_to_conflict() {
        let app = test_router();
        let response = app
            .clone()
            .oneshot(post_json("/words", Some("u1"), "user", word_body()))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(post_json(
                &format!("/words/{id}/vote"),
                Some("u1"),
                "user",
                json!({"decision": "approve"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error_kind"], "self_vote");
    }

    #[tokio::test]
    async fn test_admin_decision_requires_role() {
        let app = test_router();
        let response = app
            .clone()
            .oneshot(post_json("/words", Some("u1"), "user", word_body()))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/words/{id}/decision"),
                Some("u2"),
                "user",
                json!({"decision": "approve"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(post_json(
                &format!("/words/{id}/decision"),
                Some("a1"),
                "user,admin",
                json!({"decision": "approve"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "approved");
    }

    #[tokio::test]
    async fn test_bootstrap_admin_list_grants_role() {
        let app = test_router_with_admins(vec![UserId::from("root")]);
        let response = app
            .clone()
            .oneshot(post_json("/words", Some("u1"), "user", word_body()))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        // No admin role in the header, but the user is on the bootstrap list.
        let response = app
            .oneshot(post_json(
                &format!("/words/{id}/decision"),
                Some("root"),
                "user",
                json!({"decision": "reject"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "rejected");
    }

    #[tokio::test]
    async fn test_status_endpoint_for_missing_word() {
        let app = test_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/words/{}/status", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error_kind"], "not_found");
    }
}
