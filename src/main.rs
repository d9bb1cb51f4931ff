use std::{process, sync::Arc};

use rgdps::{
    application::error::AppError,
    config,
    context::AppContext,
    infra::telemetry,
    pubsub::{ListenerConfig, PubSubListener},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error.report(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error.report(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let router = AppContext::invalidation_router()?;
    let ctx = Arc::new(AppContext::connect(&settings).await?);

    let mut listener = PubSubListener::spawn(
        ctx.clone(),
        ctx.bus(),
        router,
        ListenerConfig::from(&settings.pubsub),
    );
    listener.subscribed().await;
    info!(
        target = "rgdps::serve",
        poll_interval_ms = settings.pubsub.poll_interval.as_millis() as u64,
        "Invalidation listener running"
    );

    let signal = tokio::signal::ctrl_c().await;

    info!(target = "rgdps::serve", "Shutting down invalidation listener");
    listener
        .shutdown()
        .await
        .map_err(|err| AppError::unexpected(format!("listener task failed: {err}")))?;

    signal.map_err(|err| AppError::unexpected(format!("failed to await shutdown signal: {err}")))
}
