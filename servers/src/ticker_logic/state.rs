use crate::ticker_logic::model::HealthReport;
use lib_common::streams::{PeriodicStreamProducer, Subscription};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    // Map of client_id -> whether the client has an active stream
    clients: Arc<Mutex<HashMap<usize, bool>>>,
    // Shared settings every new stream is started from
    producer: Arc<PeriodicStreamProducer>,
    // Root token; every subscription holds a child of it
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(producer: PeriodicStreamProducer, shutdown: CancellationToken) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            producer: Arc::new(producer),
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn add_client(&self, client_id: usize) {
        let mut clients = self.clients.lock().await;
        clients.insert(client_id, false);
    }

    pub async fn remove_client(&self, client_id: usize) {
        let mut clients = self.clients.lock().await;
        clients.remove(&client_id);
    }

    /// Starts a fresh sequence for `client_id` and marks the client as streaming.
    pub async fn open_subscription(&self, client_id: usize) -> Subscription {
        let subscription = Subscription::open(client_id, &*self.producer, &self.shutdown);
        self.set_streaming(client_id, true).await;
        subscription
    }

    pub async fn set_streaming(&self, client_id: usize, streaming: bool) {
        let mut clients = self.clients.lock().await;
        if let Some(entry) = clients.get_mut(&client_id) {
            *entry = streaming;
        }
    }

    pub async fn report(&self) -> HealthReport {
        let clients = self.clients.lock().await;
        HealthReport {
            status: if self.shutdown.is_cancelled() { "stopping" } else { "ok" },
            connections: clients.len(),
            streams: clients.values().filter(|streaming| **streaming).count(),
        }
    }
}
