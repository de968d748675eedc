// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use log::info;
use std::sync::Arc;

mod config;
mod errors;
mod handlers;
mod models;
mod services;

use crate::config::AppConfig;
use crate::services::{AssetStore, CampaignStore, CreativeCompositor, MetricsStore, Orchestrator};

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    assets: AssetStore,
    metrics: MetricsStore,
    compositor: Arc<CreativeCompositor>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        let assets = AssetStore::new(config.assets_dir.clone(), config.output_dir.clone());
        let metrics = MetricsStore::new(config.metrics_dir.clone());
        let orchestrator = Arc::new(Orchestrator::from_config(
            config,
            CampaignStore::new(),
            assets.clone(),
            metrics.clone(),
        ));

        Self {
            orchestrator,
            assets,
            metrics,
            compositor: Arc::new(CreativeCompositor::new()),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting creative pipeline service...");

    let config = AppConfig::from_env()?;
    let app_state = AppState::from_config(&config);

    app_state.assets.ensure_directories().await?;
    app_state.metrics.ensure_directory().await?;

    info!("Starting HTTP server on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::routes)
            .route("/health", web::get().to(health_check))
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    Ok(())
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "creative-pipeline",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
