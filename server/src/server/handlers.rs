//! HTTP request handlers for the authentication server.

use super::auth::{request_meta, Authenticated};
use crate::models::{
    ChallengeRequest, ChallengeResponse, RegisterDeviceRequest, RegisterDeviceResponse,
    TokenResponse, VerifyRequest,
};
use crate::service::AuthService;
use crate::storage::{with_deadline, HealthCheck};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use common::{AuthSettings, Result};
use log::{info, warn};
use serde_json::json;

pub async fn health(
    store: web::Data<dyn HealthCheck>,
    settings: web::Data<AuthSettings>,
) -> HttpResponse {
    match with_deadline(settings.storage_timeout, store.ping()).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "timestamp": Utc::now().timestamp(),
            "services": {
                "storage": "healthy",
                "server": "healthy"
            }
        })),
        Err(e) => {
            warn!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "error",
                "timestamp": Utc::now().timestamp(),
                "services": {
                    "storage": "unhealthy",
                    "server": "healthy"
                }
            }))
        }
    }
}

pub async fn register_device(
    req: HttpRequest,
    body: web::Json<RegisterDeviceRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let device = service
        .register_device(body.user_id, &body.public_key, &request_meta(&req))
        .await?;
    Ok(HttpResponse::Created().json(RegisterDeviceResponse {
        device_id: device.device_id,
    }))
}

pub async fn request_challenge(
    req: HttpRequest,
    body: web::Json<ChallengeRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse> {
    let challenge = service
        .request_challenge(body.device_id, &request_meta(&req))
        .await?;
    Ok(HttpResponse::Ok().json(ChallengeResponse::from(challenge)))
}

pub async fn verify_challenge(
    req: HttpRequest,
    body: web::Json<VerifyRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse> {
    let token = service
        .verify_challenge(body.challenge_id, &body.signature, &request_meta(&req))
        .await?;
    Ok(HttpResponse::Ok().json(TokenResponse::from(token)))
}

pub async fn secure_data(Authenticated(context): Authenticated) -> HttpResponse {
    info!("Granted access to device {}", context.device_id);
    HttpResponse::Ok().json(json!({
        "message": "Zero Trust access granted",
        "device_id": context.device_id,
        "user_id": context.user_id,
    }))
}

pub async fn current_device(
    Authenticated(context): Authenticated,
    service: web::Data<AuthService>,
) -> Result<HttpResponse> {
    let device = service.get_device(context.device_id).await?;
    Ok(HttpResponse::Ok().json(device))
}
