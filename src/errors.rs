//! Error types for each layer of the dispatch pipeline.
//!
//! Most of these never reach the caller of the orchestrator: discovery,
//! matching and dispatch failures are absorbed where they happen and turned
//! into a smaller catalog, an empty match, or a failed step. Only
//! [`DispatchError`] crosses the orchestrator boundary.

use thiserror::Error;

use crate::dispatch::task::StepState;

/// Errors talking to the registry or resolving a peer's agent card.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Transport-level failure (connect, TLS, body decode).
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The address could not be turned into a request URL.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A card was fetched but does not describe a usable peer.
    #[error("malformed agent card from {address}: {reason}")]
    MalformedCard { address: String, reason: String },

    /// The per-address resolution deadline elapsed.
    #[error("timed out resolving {address}")]
    Timeout { address: String },

    /// Unregistering an address the registry does not know.
    #[error("agent at address {address} not found")]
    NotFound { address: String },
}

/// Errors from the peer RPC transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{address} returned HTTP {status}")]
    Status { address: String, status: u16 },

    #[error("protocol error from {address}: {reason}")]
    Protocol { address: String, reason: String },

    #[error("could not resolve peer at {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: RegistryError,
    },
}

/// Errors from the semantic matching collaborator.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("matching collaborator failed: {0}")]
    Collaborator(String),

    #[error("matching collaborator returned unparseable output: {0}")]
    Parse(String),

    #[error("matching collaborator timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Misuse of the step sequencer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequencerError {
    /// Steps may only be appended while the task is still being planned.
    #[error("task {task_id} is already executing; steps can no longer be added")]
    PlanSealed { task_id: String },

    /// A step state change that would move backwards or skip a phase.
    #[error("step {step_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        step_id: String,
        from: StepState,
        to: StepState,
    },
}

/// Errors loading [`crate::config::DispatchConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: String, value: String },
}

/// The only error that aborts a task outright.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Structurally invalid request input.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Sequencer(#[from] SequencerError),
}
