//! HTTP transport for the authentication service.
//!
//! Handlers only translate JSON to service calls and `AuthError` to status
//! codes; all decisions live in [`AuthService`].

use crate::service::AuthService;
use crate::storage::HealthCheck;
use actix_web::{web, App, HttpServer};
use common::{AuthError, AuthSettings, Result};
use log::{error, info};
use std::sync::Arc;

mod auth;
pub mod handlers;

pub use auth::{request_meta, Authenticated};

/// Registers every route. Callers supply `web::Data<AuthService>`,
/// `web::Data<dyn HealthCheck>` and `web::Data<AuthSettings>` as app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(web::resource("/devices/register").route(web::post().to(handlers::register_device)))
        .service(
            web::scope("/auth")
                .service(web::resource("/challenge").route(web::post().to(handlers::request_challenge)))
                .service(web::resource("/verify").route(web::post().to(handlers::verify_challenge))),
        )
        .service(
            web::scope("/api")
                .service(web::resource("/secure-data").route(web::get().to(handlers::secure_data)))
                .service(web::resource("/device").route(web::get().to(handlers::current_device))),
        );
}

pub struct AuthServer {
    service: web::Data<AuthService>,
    health: web::Data<dyn HealthCheck>,
    settings: web::Data<AuthSettings>,
    bind_address: String,
}

impl AuthServer {
    pub fn new(
        service: AuthService,
        health: Arc<dyn HealthCheck>,
        settings: AuthSettings,
        bind_address: impl Into<String>,
    ) -> Self {
        Self {
            service: web::Data::new(service),
            health: web::Data::from(health),
            settings: web::Data::new(settings),
            bind_address: bind_address.into(),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let service = self.service.clone();
        let health = self.health.clone();
        let settings = self.settings.clone();

        info!("Starting HTTP server on {}", self.bind_address);
        let http_server = HttpServer::new(move || {
            App::new()
                .app_data(service.clone())
                .app_data(health.clone())
                .app_data(settings.clone())
                .configure(configure)
        })
        .bind(&self.bind_address)
        .map_err(|e| {
            error!("Failed to bind {}: {}", self.bind_address, e);
            AuthError::Config(format!("cannot bind {}: {}", self.bind_address, e))
        })?;

        info!("HTTP server started successfully");
        http_server.run().await?;
        info!("HTTP server stopped");
        Ok(())
    }
}
