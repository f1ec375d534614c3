//! Boundary to the model's control plane, plus the leader action invoker.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::Application;

/// A connected model.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Current applications with their units, statuses and leadership flags.
    async fn applications(&self) -> Result<Vec<Application>>;

    /// Block until the next batch of raw deltas is available.
    async fn next_deltas(&self) -> Result<Vec<Value>>;

    /// Run `action` on `unit`.
    async fn run_action(&self, unit: &str, action: &str) -> Result<()>;
}

/// Result of asking an application's leader to run an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action was enqueued on the leader unit.
    Sent { unit: String },
    /// The application has no elected leader (or does not exist); nothing was sent.
    NoLeader,
}

/// Run `action` on the current leader unit of `application`.
///
/// A missing leader is reported as `ActionOutcome::NoLeader` rather than an
/// error; a failing action call is `Error::Action`.
pub async fn invoke_on_leader<C: Cluster + ?Sized>(
    cluster: &C,
    application: &str,
    action: &str,
) -> Result<ActionOutcome> {
    let applications = cluster.applications().await?;

    let leader = applications
        .iter()
        .find(|app| app.name == application)
        .and_then(|app| app.units.iter().find(|unit| unit.leader));

    let Some(leader) = leader else {
        warn!(application, action, "no leader elected, action not sent");
        return Ok(ActionOutcome::NoLeader);
    };

    cluster
        .run_action(&leader.name, action)
        .await
        .map_err(|e| Error::Action(format!("{action} on {}: {e}", leader.name)))?;

    info!(unit = %leader.name, action, "action enqueued on leader");
    Ok(ActionOutcome::Sent {
        unit: leader.name.clone(),
    })
}
