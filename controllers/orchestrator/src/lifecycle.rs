//! vApp and VM lifecycle state machine.
//!
//! ```text
//! INSTANTIATING -> DEPLOYED | FAILED
//! DEPLOYED <-> POWERING_ON  <-> POWERED_ON
//! DEPLOYED <-> POWERING_OFF <-> POWERED_OFF
//! any non-terminal state -> DELETING -> DELETED
//! ```
//!
//! Request handlers only ever write the pending variants (`POWERING_ON`,
//! `POWERING_OFF`, `DELETING`). Terminal variants are written by the status watcher
//! once the cluster confirms them.

use crate::error::OrchestratorError;
use crds::RunStrategy;
use vcd_store::Status;

/// Requested power operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOp {
    /// Start the VM
    On,
    /// Stop the VM
    Off,
}

impl PowerOp {
    /// Status written once the cluster patch is accepted
    pub fn pending_status(&self) -> Status {
        match self {
            PowerOp::On => Status::PoweringOn,
            PowerOp::Off => Status::PoweringOff,
        }
    }

    /// Run strategy patched onto the VM resource
    pub fn run_strategy(&self) -> RunStrategy {
        match self {
            PowerOp::On => RunStrategy::Always,
            PowerOp::Off => RunStrategy::Halted,
        }
    }

    /// Operation name used in messages
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerOp::On => "power-on",
            PowerOp::Off => "power-off",
        }
    }
}

/// Validate a power operation against the last-read status
///
/// Returns the pending status to write after the cluster call succeeds.
pub fn guard_power(current: Status, op: PowerOp) -> Result<Status, OrchestratorError> {
    match (current, op) {
        (Status::Deleting | Status::Deleted, _) => Err(OrchestratorError::ResourceConflict(format!(
            "cannot {} while {}",
            op.as_str(),
            current
        ))),
        (Status::Instantiating | Status::Resolved, _)
        | (Status::PoweredOn | Status::PoweringOn, PowerOp::On)
        | (Status::PoweredOff | Status::PoweringOff | Status::Suspended, PowerOp::Off) => {
            Err(OrchestratorError::InvalidTransition(format!(
                "cannot {} while {}",
                op.as_str(),
                current
            )))
        }
        _ => Ok(op.pending_status()),
    }
}

/// Whether the VM counts as running for deletion guards
pub fn is_running(status: Status) -> bool {
    matches!(status, Status::PoweredOn | Status::PoweringOn | Status::PoweringOff)
}

/// Whether `from -> to` is an edge of the state machine
pub fn can_transition(from: Status, to: Status) -> bool {
    use Status::*;

    if from == to {
        return false;
    }
    match (from, to) {
        (Deleted, _) => false,
        (Deleting, Deleted) => true,
        (Deleting, _) => false,
        (_, Deleting) => true,
        (_, Deleted) => false,
        (Instantiating | Resolved, Deployed | Failed) => true,
        (Deployed | PoweredOff | PoweringOff | Suspended | Failed, PoweringOn) => true,
        (Deployed | PoweredOn | PoweringOn | Failed, PoweringOff) => true,
        (PoweringOn, PoweredOn | Deployed | Failed) => true,
        (PoweringOff, PoweredOff | Deployed | Failed) => true,
        // Observed without a pending phase, e.g. changed outside the orchestrator
        (Deployed, PoweredOn | PoweredOff) => true,
        (PoweredOn, PoweredOff | Suspended | Failed) => true,
        (PoweredOff, PoweredOn | Failed) => true,
        (Suspended, PoweredOn | PoweredOff) => true,
        _ => false,
    }
}

/// Status to write for an observation from the cluster, if any
///
/// Returns `None` when the observation is not a valid edge from `current` (for
/// example a stale event arriving after deletion started) or changes nothing.
pub fn observe(current: Status, observed: Status) -> Option<Status> {
    can_transition(current, observed).then_some(observed)
}
