use classcal::app::App;
use classcal::cli::{Args, ServiceName};
use classcal::config::Config;
use classcal::logging::setup_logging;
use clap::Parser;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Always run all services
    let enabled_services = ServiceName::all();

    // Load config and setup logging before App::new() so startup logs are never silently dropped
    let config = Config::load().expect("Failed to load config");
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        enabled_services = ?enabled_services,
        "starting classcal"
    );

    // Create and initialize the application
    let mut app = App::new(config)
        .await
        .expect("Failed to initialize application");

    app.setup_services(&enabled_services)
        .expect("Failed to setup services");

    // Start all services and run the application
    app.start_services();
    app.run().await
}
