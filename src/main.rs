use docvault::api::{AppState, create_router};
use docvault::index::ChromaService;
use docvault::ingest::IngestionService;
use docvault::metrics::ServiceMetrics;
use docvault::oracle::GeminiService;
use docvault::search::{SearchOptions, SearchService};
use docvault::store::{DocumentStore, FileStore};
use docvault::{config, logging};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let store = DocumentStore::connect(&config.database_path)
        .await
        .expect("Failed to open the document database");
    let files = FileStore::new(config.storage_root.clone());
    let oracle = Arc::new(GeminiService::new().expect("Invalid oracle configuration"));
    let index = Arc::new(ChromaService::new().expect("Invalid index configuration"));
    let metrics = Arc::new(ServiceMetrics::new());

    let state = AppState {
        ingestion: Arc::new(IngestionService::new(
            oracle.clone(),
            index.clone(),
            store.clone(),
            files.clone(),
            metrics.clone(),
        )),
        search: Arc::new(SearchService::new(
            oracle,
            index.clone(),
            store.clone(),
            SearchOptions::from_config(config),
        )),
        store,
        files,
        index,
        metrics,
        max_page_size: config.documents_max_page_size,
    };
    let app = create_router(state);

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
