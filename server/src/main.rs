use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use campus_events_server::config::Config;
use campus_events_server::handlers::AppState;
use campus_events_server::routes::create_routes;
use campus_events_server::services::identity::IdentityDirectory;
use campus_events_server::services::notification::{LogNotifier, Templates};
use campus_events_server::services::EventService;
use campus_events_server::store::{InMemoryDirectory, InMemoryStore, PgStore, Store};
use campus_events_server::utils::clock::SystemClock;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let (store, directory): (Arc<dyn Store>, Arc<dyn IdentityDirectory>) =
        match &config.database_url {
            Some(database_url) => {
                let store = PgStore::connect(database_url, config.max_connections)
                    .await
                    .expect("Failed to connect to database");
                tracing::info!("Successfully connected to database");

                store.migrate().await.expect("Failed to run migrations");
                tracing::info!("Migrations run successfully");

                let store = Arc::new(store);
                let directory: Arc<dyn IdentityDirectory> = store.clone();
                let store: Arc<dyn Store> = store;
                (store, directory)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, keeping all data in memory");
                let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
                let directory: Arc<dyn IdentityDirectory> = Arc::new(InMemoryDirectory::new());
                (store, directory)
            }
        };

    let service = EventService::new(
        store,
        directory,
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
        Templates::new(config.public_url.clone()),
    );

    let app: Router = create_routes(AppState::new(service), &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
