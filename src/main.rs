use axum::Router;
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use savserver::auth::client::AuthClient;
use savserver::auth::configure_auth_routes;
use savserver::config::AppConfig;
use savserver::email::{Notifier, SmtpNotifier};
use savserver::shared::state::AppState;
use savserver::shared::utils::create_conn;
use savserver::tickets::configure_sav_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = Arc::new(AppConfig::load()?);
    let pool = create_conn(&config.database)?;
    let auth = Arc::new(AuthClient::new(config.auth.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(config.smtp.clone()));

    let state = Arc::new(AppState {
        conn: pool,
        config: config.clone(),
        auth,
        notifier,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(configure_auth_routes())
        .merge(configure_sav_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(
        "Starting HTTP server on {}:{}",
        config.server.host, config.server.port
    );
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
