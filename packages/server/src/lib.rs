#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the canvass map dashboard.
//!
//! Serves per-district completion statistics, street geometries as
//! `GeoJSON`, street search, the street and district action updates used
//! in the field, and profile administration. The built frontend is served
//! from `STATIC_DIR` when that directory exists.

mod handlers;
pub mod interactive;
pub mod store;

use std::path::Path;
use std::sync::Arc;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use canvass_map_database::{db, run_migrations};

pub use handlers::USER_ID_HEADER;
use store::{ApiStore, PostgresApiStore};

/// Default directory for the built frontend.
pub const DEFAULT_STATIC_DIR: &str = "app/dist";

/// Shared application state.
pub struct AppState {
    /// Storage behind every handler.
    pub store: Arc<dyn ApiStore>,
}

/// Registers the `/api` routes.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::QueryConfig::default().error_handler(handlers::query_error))
            .route("/health", web::get().to(handlers::health))
            .route(
                "/districts/{id}/stats",
                web::get().to(handlers::district_stats),
            )
            .route(
                "/districts/{id}/streets",
                web::get().to(handlers::district_streets),
            )
            .route(
                "/districts/{id}/streets/search",
                web::get().to(handlers::search_streets),
            )
            .route(
                "/districts/{id}/actions",
                web::get().to(handlers::district_actions),
            )
            .route(
                "/districts/{id}/actions/{type}",
                web::put().to(handlers::update_district_action),
            )
            .route(
                "/streets/{id}/action",
                web::patch().to(handlers::update_street_action),
            )
            .route("/actions", web::get().to(handlers::list_actions))
            .route("/actions/summary", web::get().to(handlers::actions_summary))
            .route("/actions/recent", web::get().to(handlers::recent_actions))
            .route("/me", web::get().to(handlers::current_profile))
            .route("/profiles", web::get().to(handlers::list_profiles))
            .route("/profiles", web::post().to(handlers::create_profile))
            .route("/profiles/{id}", web::patch().to(handlers::update_profile)),
    );
}

/// Starts the canvass map API server.
///
/// Connects to the database named by `DATABASE_URL`, runs migrations,
/// and listens on `BIND_ADDR`:`PORT` (default `127.0.0.1:8080`). The
/// caller provides the async runtime.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the database connection or
/// migrations fail, or if the HTTP server fails to bind.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    log::info!("Connecting to database...");
    let db_conn = db::connect_from_env()
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to connect to database: {e}")))?;

    log::info!("Running migrations...");
    run_migrations(db_conn.as_ref())
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to run migrations: {e}")))?;

    let state = web::Data::new(AppState {
        store: Arc::new(PostgresApiStore::new(Arc::from(db_conn))),
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let static_dir =
        std::env::var("STATIC_DIR").unwrap_or_else(|_| DEFAULT_STATIC_DIR.to_string());
    let serve_static = Path::new(&static_dir).is_dir();
    if !serve_static {
        log::warn!("Static directory {static_dir} not found, serving API only");
    }

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        let app = App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure_api);

        if serve_static {
            app.service(Files::new("/", &static_dir).index_file("index.html"))
        } else {
            app
        }
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
