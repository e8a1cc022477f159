//! Bearer-token extraction for protected routes.

use crate::security::extract_bearer;
use crate::service::AuthService;
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use common::{AuthContext, AuthError, RequestMeta};
use std::future::Future;
use std::pin::Pin;

/// An authorized caller. Handlers that take this only run for a valid token
/// whose device is still active.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub AuthContext);

impl FromRequest for Authenticated {
    type Error = AuthError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let service = req.app_data::<web::Data<AuthService>>().cloned();
        let authorization = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        Box::pin(async move {
            let service = service.ok_or_else(|| {
                AuthError::Config("authentication service is not registered".to_string())
            })?;
            let token = extract_bearer(authorization.as_deref())
                .ok_or_else(|| AuthError::Unauthorized("missing bearer token".to_string()))?;
            service.authorize(token).await.map(Authenticated)
        })
    }
}

/// Caller address and user agent, as recorded in the audit trail.
pub fn request_meta(req: &HttpRequest) -> RequestMeta {
    let ip_address = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or_default()
        .to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    RequestMeta::new(ip_address, user_agent)
}
