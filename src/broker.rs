//! NATS request/reply listener for the auth subjects.
//!
//! Payloads are either the bare request JSON or a NestJS-style frame
//! `{"pattern": "...", "data": {...}, "id": "..."}`. A framed request gets a
//! framed reply (`response` or `err`, plus `isDisposed`); a bare one gets the
//! `AuthResponse` or the `RpcError` envelope as is.

use anyhow::Context;
use axum::extract::FromRef;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::{
    auth::{
        dto::AuthResponse,
        handlers::{handle_login, handle_register, handle_verify_token},
        services::AuthService,
    },
    rpc::{self, RpcError},
    state::AppState,
};

/// Replicas share work through this queue group.
pub const QUEUE_GROUP: &str = "auth-ms";

pub const SUBJECTS: [&str; 3] = [rpc::AUTH_REGISTER, rpc::AUTH_LOGIN, rpc::AUTH_VERIFY_TOKEN];

/// Connects to `servers`, subscribes to every auth subject and serves until
/// the connection's subscriptions end.
pub async fn listen(servers: &[String], state: AppState) -> anyhow::Result<()> {
    let addrs = servers
        .iter()
        .map(|s| s.parse::<async_nats::ServerAddr>())
        .collect::<Result<Vec<_>, _>>()
        .context("parse NATS_SERVERS")?;
    let client = async_nats::connect(addrs)
        .await
        .context("connect to NATS")?;
    info!(servers = ?servers, "connected to NATS");

    let mut subscriptions = Vec::with_capacity(SUBJECTS.len());
    for subject in SUBJECTS {
        let sub = client
            .queue_subscribe(subject.to_string(), QUEUE_GROUP.to_string())
            .await
            .with_context(|| format!("subscribe to {subject}"))?;
        subscriptions.push(sub);
    }
    info!(subjects = ?SUBJECTS, queue = QUEUE_GROUP, "listening for auth messages");

    let svc = AuthService::from_ref(&state);
    let mut messages = futures_util::stream::select_all(subscriptions);
    while let Some(msg) = messages.next().await {
        let client = client.clone();
        let svc = svc.clone();
        tokio::spawn(async move {
            let subject = msg.subject.as_str().to_owned();
            let Some(reply_to) = msg.reply else {
                warn!(%subject, "message without reply subject dropped");
                return;
            };
            let reply = handle_payload(&svc, &subject, &msg.payload).await;
            if let Err(e) = client.publish(reply_to, reply.into()).await {
                error!(error = %e, %subject, "failed to publish reply");
            }
        });
    }

    warn!("NATS subscriptions closed");
    Ok(())
}

/// Runs one subject against the service.
pub async fn dispatch(
    svc: &AuthService,
    subject: &str,
    data: Value,
) -> Result<AuthResponse, RpcError> {
    debug!(%subject, "dispatching message");
    match subject {
        rpc::AUTH_REGISTER => handle_register(svc, decode(data)?).await,
        rpc::AUTH_LOGIN => handle_login(svc, decode(data)?).await,
        rpc::AUTH_VERIFY_TOKEN => handle_verify_token(svc, decode(data)?).await,
        other => Err(RpcError::bad_request(format!("Unknown subject {other}"))),
    }
}

/// Decodes the raw message, dispatches it and encodes the reply bytes.
pub async fn handle_payload(svc: &AuthService, subject: &str, payload: &[u8]) -> Vec<u8> {
    let (frame_id, result) = match serde_json::from_slice::<Value>(payload) {
        Ok(body) => {
            let (frame_id, data) = unwrap_frame(body);
            (frame_id, dispatch(svc, subject, data).await)
        }
        Err(e) => (None, Err(RpcError::bad_request(e.to_string()))),
    };
    encode_reply(frame_id, result)
}

/// Splits a NestJS frame into its id and data; bare bodies pass through.
fn unwrap_frame(body: Value) -> (Option<Value>, Value) {
    match body {
        Value::Object(mut map) if map.contains_key("pattern") && map.contains_key("data") => {
            let id = map.remove("id").unwrap_or(Value::Null);
            let data = map.remove("data").unwrap_or(Value::Null);
            (Some(id), data)
        }
        other => (None, other),
    }
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, RpcError> {
    serde_json::from_value(data).map_err(|e| RpcError::bad_request(e.to_string()))
}

fn encode_reply(frame_id: Option<Value>, result: Result<AuthResponse, RpcError>) -> Vec<u8> {
    let body = match (frame_id, result) {
        (None, Ok(res)) => serde_json::to_value(res),
        (None, Err(e)) => serde_json::to_value(e),
        (Some(id), Ok(res)) => {
            serde_json::to_value(res).map(|r| json!({"id": id, "response": r, "isDisposed": true}))
        }
        (Some(id), Err(e)) => {
            serde_json::to_value(e).map(|e| json!({"id": id, "err": e, "isDisposed": true}))
        }
    };
    match body {
        Ok(v) => v.to_string().into_bytes(),
        Err(e) => {
            error!(error = %e, "failed to encode reply");
            br#"{"status":500,"message":"Internal server error"}"#.to_vec()
        }
    }
}
