use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::NodeConfig;
use crate::speedtest::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: Arc<NodeConfig>,
    pub started_at: DateTime<Utc>,
}
