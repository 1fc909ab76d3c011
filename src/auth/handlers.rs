use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest, VerifyTokenRequest},
        services::AuthService,
    },
    rpc::{self, RpcError},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(&rpc::subject_path(rpc::AUTH_REGISTER), post(register))
        .route(&rpc::subject_path(rpc::AUTH_LOGIN), post(login))
        .route(&rpc::subject_path(rpc::AUTH_VERIFY_TOKEN), post(verify_token))
}

#[instrument(skip(svc, payload))]
pub async fn register(
    State(svc): State<AuthService>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, RpcError> {
    let Json(payload) = payload?;
    Ok(Json(handle_register(&svc, payload).await?))
}

#[instrument(skip(svc, payload))]
pub async fn login(
    State(svc): State<AuthService>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, RpcError> {
    let Json(payload) = payload?;
    Ok(Json(handle_login(&svc, payload).await?))
}

#[instrument(skip(svc, payload))]
pub async fn verify_token(
    State(svc): State<AuthService>,
    payload: Result<Json<VerifyTokenRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, RpcError> {
    let Json(payload) = payload?;
    Ok(Json(handle_verify_token(&svc, payload).await?))
}

// Transport-independent bodies, shared with the NATS listener.

pub(crate) async fn handle_register(
    svc: &AuthService,
    mut payload: RegisterRequest,
) -> Result<AuthResponse, RpcError> {
    payload.validate().map_err(|msg| {
        warn!(reason = msg, "register payload rejected");
        RpcError::bad_request(msg)
    })?;
    Ok(svc
        .register_user(&payload.email, &payload.name, &payload.password)
        .await?)
}

pub(crate) async fn handle_login(
    svc: &AuthService,
    mut payload: LoginRequest,
) -> Result<AuthResponse, RpcError> {
    payload.validate().map_err(|msg| {
        warn!(reason = msg, "login payload rejected");
        RpcError::bad_request(msg)
    })?;
    Ok(svc.login_user(&payload.email, &payload.password).await?)
}

pub(crate) async fn handle_verify_token(
    svc: &AuthService,
    mut payload: VerifyTokenRequest,
) -> Result<AuthResponse, RpcError> {
    payload.validate().map_err(RpcError::bad_request)?;
    Ok(svc.verify_token(&payload.token).await?)
}
