use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use matchmaker::config::ApiConfig;
use matchmaker::controller::api::{router, AppState};
use matchmaker::controller::{Controller, HeaderAuthorizer};
use matchmaker::probe::HttpProbe;
use matchmaker::store::RedisStore;

const LISTEN_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    info!("starting api service");

    if dotenvy::dotenv().is_err() {
        info!("no .env file found");
    }

    let config = ApiConfig::from_env().expect("invalid configuration");

    let store = RedisStore::connect(&config.redis_url)
        .await
        .expect("redis connection failed");
    info!("connected to redis");

    // The api side never retries a probe; stale reservations just lead to
    // a fresh request.
    let probe = HttpProbe::new(
        &config.control_port,
        config.reservation_timeout,
        0,
        Duration::ZERO,
    )
    .expect("failed to build probe client");

    let controller = Controller::new(Arc::new(store), Arc::new(probe));
    let state = AppState {
        controller: Arc::new(controller),
        authorizer: Arc::new(HeaderAuthorizer),
    };

    let listener = tokio::net::TcpListener::bind(LISTEN_ADDR)
        .await
        .expect("failed to bind listen address");
    info!(address = LISTEN_ADDR, "api listening");

    axum::serve(listener, router(state))
        .await
        .expect("server error");
}
