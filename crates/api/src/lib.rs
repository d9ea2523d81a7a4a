//! Public, language-neutral engine facade (§6): wires the Size Prober,
//! Chunk Planner, Range Fetcher, Download Orchestrator, State Store, and
//! platform preconditions behind `start`/`pause`/`resume`/`cancel`/
//! `reset`/`observe`/`grantCellular`.

pub mod error;
pub mod tiers;

use std::path::PathBuf;

use engine::{Orchestrator, OrchestratorConfig};
use platform::{PlatformError, SystemNetworkMonitor};
use storage::Layout;

pub use error::CliError;

/// Every component's tunables wired together in one place (SPEC_FULL.md
/// "Configuration"), mirroring the teacher's `ChunkConfig::default()` shape.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Overrides the platform-resolved persistent data directory.
    pub data_root: Option<PathBuf>,
    /// Root URL artifacts are resolved under; see [`tiers::model_tier`].
    pub base_url: String,
    pub orchestrator: OrchestratorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_root: None,
            base_url: "https://cdn.fluxdm.example/models".to_string(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn resolve_data_root(&self) -> Result<PathBuf, PlatformError> {
        match &self.data_root {
            Some(root) => Ok(root.clone()),
            None => platform::persistent_data_dir(),
        }
    }
}

/// Builds an [`Orchestrator`] wired to the system network monitor and the
/// resolved data root.
pub fn build_orchestrator(
    config: &EngineConfig,
) -> Result<Orchestrator<SystemNetworkMonitor>, PlatformError> {
    let root = config.resolve_data_root()?;
    let layout = Layout::new(root);
    Ok(Orchestrator::new(
        layout,
        SystemNetworkMonitor::new(),
        config.orchestrator.clone(),
    ))
}
