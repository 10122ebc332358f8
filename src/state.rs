use std::sync::Arc;

use crate::audit::AuditEngine;
use crate::config::ObserverConfig;
use crate::orchestrator::JobOrchestrator;
use crate::store::JobStore;
use crate::webhook::WebhookDispatcher;

pub type SharedState = Arc<ObserverState>;

pub struct ObserverState {
    pub config: ObserverConfig,
    pub orchestrator: Arc<JobOrchestrator>,
    pub store: Arc<dyn JobStore>,
}

impl ObserverState {
    /// Wire the orchestrator from its collaborators and the resolved config.
    pub fn new(
        config: ObserverConfig,
        engine: Arc<dyn AuditEngine>,
        store: Arc<dyn JobStore>,
        webhooks: WebhookDispatcher,
    ) -> Self {
        let orchestrator = Arc::new(JobOrchestrator::new(
            engine,
            Arc::clone(&store),
            Arc::new(webhooks),
            config.runs.clone(),
        ));
        Self {
            config,
            orchestrator,
            store,
        }
    }
}
