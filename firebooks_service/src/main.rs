use actix_web::{App, HttpServer};
use anyhow::Context;
use paperclip::actix::{web, OpenApiExt};
use tracing_actix_web::TracingLogger;

use firebooks_service::app_config::{config_app, json_config};
use firebooks_service::books_repository::init_books_repository;
use firebooks_service::settings::load_settings;
use firebooks_service::telemetry::{init_telemetry, shutdown_telemetry};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings().context("Failed to load settings")?;
    init_telemetry(&settings.telemetry)?;

    let books_repository =
        init_books_repository(&settings.database).context("Failed to open database")?;

    let address = (settings.application.host.clone(), settings.application.port);
    tracing::info!(
        "starting HTTP server at http://{}:{} with {:?} backend",
        address.0,
        address.1,
        settings.database.backend
    );

    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(web::Data::new(books_repository.clone()))
            .app_data(json_config())
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind(address)?
    .run()
    .await?;

    tracing::info!("HTTP server stopped, closing database handle");
    shutdown_telemetry(&settings.telemetry);
    Ok(())
}
