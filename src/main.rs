use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use grade_predictor::api;
use grade_predictor::config::ServerConfig;
use grade_predictor::predictor::Predictor;
use grade_predictor::reference::{spawn_refresh, ReferenceStore};

async fn start_api(
    config: &ServerConfig,
    predictor: Predictor,
    store: Arc<ReferenceStore>,
) -> std::io::Result<()> {
    let predictor_data = web::Data::new(predictor);
    let store_data = web::Data::from(store);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            // the UI is served from its own origin
            .wrap(Cors::permissive())
            .app_data(predictor_data.clone())
            .app_data(store_data.clone())
            .configure(api::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::parse();
    let predictor = config.predictor().context("invalid grading configuration")?;
    let store = Arc::new(ReferenceStore::open(
        config.reference_data.clone(),
        *predictor.policy().weights(),
    ));

    if let Some(every) = config.refresh_interval() {
        spawn_refresh(Arc::clone(&store), every);
    }

    tracing::info!(
        host = %config.host,
        port = config.port,
        passing_threshold = predictor.policy().passing_threshold(),
        "starting grade predictor"
    );

    start_api(&config, predictor, store)
        .await
        .with_context(|| format!("server on {}:{} failed", config.host, config.port))?;

    Ok(())
}
