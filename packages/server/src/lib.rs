#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for region similarity.
//!
//! A thin layer over [`Manager`]: the global region table, per-region
//! neighbor tables and a health document listing background jobs. Tables
//! that are still being computed answer `202 Accepted`; clients poll.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, Scope, middleware, web};
use similarity_manager::Manager;

/// Shared application state.
pub struct AppState {
    /// The compute/cache manager behind every endpoint.
    pub manager: Arc<Manager>,
}

/// The `/api` routes.
#[must_use]
pub fn api_scope() -> Scope {
    web::scope("/api")
        .route("/v1", web::get().to(handlers::health))
        .route("/v1/regions", web::get().to(handlers::regions))
        .route("/v1/regions/{key}", web::get().to(handlers::region))
}

/// Starts the similarity API server.
///
/// Binds to `BIND_ADDR:PORT` (default `127.0.0.1:8000`). The manager should
/// already be started; this only serves it. The caller provides the async
/// runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(manager: Arc<Manager>) -> std::io::Result<()> {
    let state = web::Data::new(AppState { manager });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(api_scope())
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
