use std::net::SocketAddr;
use std::path::PathBuf;

use lepodium_api::routes;
use lepodium_store::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let store = Store::new(PathBuf::from(data_dir));
    tracing::info!("répertoire de données : {:?}", store.data_dir());

    let app = routes::router(store);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API à l'écoute sur {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
