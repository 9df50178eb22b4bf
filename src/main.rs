use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use caredesk::config::AppConfig;
use caredesk::db;
use caredesk::handlers;
use caredesk::services::gateway::simulated::SimulatedGateway;
use caredesk::services::notifier::twilio::TwilioSmsNotifier;
use caredesk::services::notifier::{LogNotifier, Notifier};
use caredesk::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let notifier: Box<dyn Notifier> = if config.twilio_configured() {
        tracing::info!("sending notifications over Twilio SMS");
        Box::new(TwilioSmsNotifier::new(
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
            config.twilio_phone_number.clone(),
        ))
    } else {
        tracing::info!("Twilio not configured, notifications are logged only");
        Box::new(LogNotifier)
    };

    tracing::info!(
        success_rate = config.gateway_success_rate,
        "using simulated payment gateway"
    );
    if config.gateway_webhook_secret.is_empty() {
        tracing::warn!("GATEWAY_WEBHOOK_SECRET not set, webhook signatures are not checked");
    }

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        gateway: Box::new(SimulatedGateway::new(config.gateway_success_rate)),
        notifier,
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
