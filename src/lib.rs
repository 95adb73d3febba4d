pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod pricing;
pub mod realtime;
pub mod services;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::pricing::{FareSchedule, SurgeEstimator};
use crate::realtime::{ConnectionRegistry, RideEventBroadcaster};
use crate::services::{AdminService, DocumentStore, RideService, WalletService};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: RideEventBroadcaster,
    pub rides: RideService,
    pub wallets: WalletService,
    pub admin: AdminService,
    pub documents: DocumentStore,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.realtime.channel_capacity));
        let broadcaster = RideEventBroadcaster::new(registry.clone());
        let estimator = SurgeEstimator::from_config(&config.pricing);

        let rides = RideService::new(
            db.clone(),
            broadcaster.clone(),
            estimator,
            FareSchedule::from_config(&config.pricing),
        );
        let wallets = WalletService::new(db.clone(), config.pricing.topup_amount);
        let admin = AdminService::new(db.clone(), estimator);
        let documents = DocumentStore::new(config.uploads_dir());

        Self {
            config,
            db,
            registry,
            broadcaster,
            rides,
            wallets,
            admin,
            documents,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
