use bollard::Docker;
use std::sync::Arc;
use tracing::info;

use matchmaker::config::{Backend, MakerConfig};
use matchmaker::driver::{ContainerDriver, DockerDriver, ImageSettings, SwarmDriver};
use matchmaker::probe::HttpProbe;
use matchmaker::processor::{Processor, WorkerPool};
use matchmaker::store::{RedisStore, Store};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    info!("starting maker service");

    if dotenvy::dotenv().is_err() {
        info!("no .env file found");
    }

    let config = MakerConfig::from_env().expect("invalid configuration");

    let docker = Docker::connect_with_unix_defaults().expect("docker connection failed");
    info!("connected to docker");

    let store = RedisStore::connect(&config.redis_url)
        .await
        .expect("redis connection failed");
    info!("connected to redis");

    let image = ImageSettings {
        name: config.image.clone(),
        exposed_port: config.expose_port.clone(),
        registry_username: config.registry_username.clone(),
        registry_password: config.registry_password.clone(),
    };

    let driver: Arc<dyn ContainerDriver> = match config.backend {
        Backend::Docker => Arc::new(DockerDriver::new(docker, image, config.network.clone())),
        Backend::Swarm => Arc::new(SwarmDriver::new(
            docker,
            image,
            config.network.clone(),
            config.converge_verify_cooldown,
            config.converge_verify_retries,
        )),
    };

    let probe = HttpProbe::new(
        &config.control_port,
        config.reservation_timeout,
        config.reservation_retries,
        config.reservation_cooldown,
    )
    .expect("failed to build probe client");

    let store: Arc<dyn Store> = Arc::new(store);
    let processor = Processor::new(
        Arc::clone(&store),
        driver,
        Arc::new(probe),
        config.lookup_cooldown,
    );

    let pool = WorkerPool::new(store, processor, config.max_jobs);
    info!(jobs = config.max_jobs, "starting message processing");
    pool.run().await;
}
