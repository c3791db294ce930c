//! Process-wide state shared by every HTTP/WS handler, the bus consumer, and
//! the bootstrap query service — built once in `main` and passed explicitly
//! (per spec §9's note against implicit module-level singletons), mirroring
//! `server::state::AppState`.

use std::sync::Arc;

use doc_store::DocStore;
use sqlx::MySqlPool;
use tire_api_client::TireApiClient;
use tokio_util::sync::CancellationToken;

use crate::cache::EnrichmentCache;
use crate::hub::SubscriptionHub;

#[derive(Clone)]
pub struct AppState {
    pub catalog: MySqlPool,
    pub store: DocStore,
    pub tire_api: Arc<TireApiClient>,
    pub cache: Arc<EnrichmentCache>,
    pub hub: Arc<SubscriptionHub>,
    /// Cancelled on process shutdown so delayed-broadcast tasks spawned by
    /// the bootstrap endpoint (§9 "Delayed broadcast") stop sleeping instead
    /// of outliving the server.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(catalog: MySqlPool, store: DocStore, tire_api: TireApiClient) -> Self {
        Self {
            catalog,
            store,
            tire_api: Arc::new(tire_api),
            cache: Arc::new(EnrichmentCache::new()),
            hub: Arc::new(SubscriptionHub::new()),
            shutdown: CancellationToken::new(),
        }
    }
}
