use actix_web::{middleware, web, App, HttpServer};
use archaimap::analysis::Analyzer;
use archaimap::annotate::load_font;
use archaimap::config::{Settings, RUST_LOG};
use archaimap::model::{default_factory, ModelRegistry};
use archaimap::server;
use std::io;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(RUST_LOG));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Settings::load().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    info!("starting with {settings:?}");

    // Models are loaded on first use, not here
    let registry = ModelRegistry::new(settings.models.clone(), default_factory());
    let font = load_font(settings.render.font_path.as_deref());
    let analyzer = web::Data::new(Analyzer::new(registry, font));

    let max_upload = settings.server.max_upload_bytes;
    let addr = settings.bind_addr();
    info!("listening on http://{addr}");

    HttpServer::new(move || {
        App::new()
            .app_data(analyzer.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(|cfg| server::configure(cfg, max_upload))
    })
    .bind(addr)?
    .run()
    .await
}
