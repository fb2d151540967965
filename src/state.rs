use crate::config::{DashboardConfig, ROUND_EVENT_BUFFER_SIZE};
use crate::credentials::{CredentialProvider, CredentialStore};
use crate::error::DashboardError;
use crate::progress::{BroadcastProgress, ProgressEvent};
use crate::rounds::{DuplicationResult, RoundOptions, RoundRequest};
use crate::testpad::client::TestpadClient;
use crate::testpad::error::TestpadError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::warn;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: DashboardConfig,
    pub credentials: Arc<CredentialStore>,
    pub client: Arc<TestpadClient>,
    pub round: RwLock<RoundState>,
    pub round_progress: Arc<BroadcastProgress>,
}

/// The single background test round, if any. Kept after completion so the
/// last result stays visible until the next round starts.
#[derive(Default)]
pub struct RoundState {
    pub running: bool,
    pub round_id: Option<String>,
    pub request: Option<RoundRequest>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<DuplicationResult>,
    pub error: Option<String>,
    pub stop_tx: Option<watch::Sender<bool>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundStatus {
    pub running: bool,
    pub round_id: Option<String>,
    pub project_id: Option<u64>,
    pub new_folder_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: Option<ProgressEvent>,
    pub result: Option<DuplicationResult>,
    pub error: Option<String>,
}

impl RoundState {
    pub fn to_status(&self, progress: Option<ProgressEvent>) -> RoundStatus {
        RoundStatus {
            running: self.running,
            round_id: self.round_id.clone(),
            project_id: self.request.as_ref().map(|r| r.project_id),
            new_folder_name: self.request.as_ref().map(|r| r.new_folder_name.clone()),
            started_at: self.started_at,
            finished_at: self.finished_at,
            progress,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

impl AppState {
    pub fn new(config: DashboardConfig) -> Result<Self, TestpadError> {
        let credentials = Arc::new(CredentialStore::persistent(config.credentials_file.clone()));
        Self::with_credentials(config, credentials)
    }

    pub fn with_credentials(
        config: DashboardConfig,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self, TestpadError> {
        let provider: Arc<dyn CredentialProvider> = credentials.clone();
        let client = TestpadClient::new(config.api_base.clone(), provider, config.request_timeout)?;
        let (round_tx, _) = broadcast::channel(ROUND_EVENT_BUFFER_SIZE);
        Ok(Self {
            config,
            credentials,
            client: Arc::new(client),
            round: RwLock::new(RoundState::default()),
            round_progress: Arc::new(BroadcastProgress::new(round_tx)),
        })
    }

    pub fn round_options(&self) -> RoundOptions {
        RoundOptions {
            retry: self.config.retry.clone(),
            pacing: self.config.pacing.clone(),
            shuffle_seed: None,
        }
    }

    /// Convert a Testpad result for a route, dropping the stored key when
    /// Testpad rejected it.
    pub fn checked<T>(&self, result: Result<T, TestpadError>) -> Result<T, DashboardError> {
        result.map_err(|e| {
            self.forget_rejected_key(&e);
            DashboardError::from(e)
        })
    }

    pub fn forget_rejected_key(&self, err: &TestpadError) {
        if matches!(err, TestpadError::InvalidCredential) {
            warn!("Testpad rejected the API key, clearing it");
            self.credentials.clear();
        }
    }

    pub async fn round_status(&self) -> RoundStatus {
        let round = self.round.read().await;
        round.to_status(self.round_progress.latest())
    }
}
