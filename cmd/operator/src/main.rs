use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use chart_operator::config::WatchConfig;
use chart_operator::controller::State;
use chart_operator::metrics::Metrics;
use chart_operator::release::storage::InMemoryReleaseStorage;
use chart_operator::telemetry;
use chart_operator::watch::WatchRegistrar;
use chart_operator_k8s_util::client::new_client_with_metrics;

use std::sync::Arc;

use clap::{crate_authors, crate_description, crate_version, Parser};
use kube::Config;
use prometheus_client::registry::Registry;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(c.metrics())
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[derive(Parser, Debug)]
#[command(
    name = "chart-operator",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen on given port
    #[arg(short, long, default_value_t = 8080, env)]
    port: u32,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`.
    /// Example: "info,kube=debug,chart_operator=debug"
    #[arg(long, default_value = "info", env)]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint.
    ///
    /// If not provided, tracing is disabled and only structured logs are emitted.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing, between 0.0 and 1.0.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(
        &args.log_filter,
        args.log_format,
        args.tracing_url.as_deref(),
        args.sample_ratio,
    )
    .await?;

    let mut registry = Registry::with_prefix("chart_operator");
    let config = Config::infer().await?;
    let client = new_client_with_metrics(config, &mut registry).await?;
    let metrics = Metrics::new(registry);
    let state = State::new(metrics);

    let watch_config = WatchConfig::load_from_env()?;
    let storage = Arc::new(InMemoryReleaseStorage::new());
    let registrar = WatchRegistrar::new(client, watch_config, storage, state.clone());
    let controllers = tokio::spawn(async move {
        if let Err(e) = registrar.run().await {
            tracing::error!(error = %e, "watch registrar exited with error");
        }
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(health)
            .service(metrics)
    })
    .bind(format!("0.0.0.0:{}", args.port))?
    .shutdown_timeout(5);

    tokio::join!(controllers, server.run()).1?;
    Ok(())
}
