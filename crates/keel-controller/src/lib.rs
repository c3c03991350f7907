//! Keel Controller - Cluster lifecycle reconciliation
//!
//! This crate provides:
//! - Descendant discovery and ownership filtering for a Cluster
//! - Staged deletion of descendants and referenced provider objects
//! - Condition aggregation and phase reporting
//! - The reconciler, the event mapper and a worker-pool controller

// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod client;
pub mod controller;
pub mod deletion;
pub mod descendants;
pub mod error;
pub mod mapper;
pub mod patch;
pub mod probe;
pub mod queue;
pub mod reconciler;
pub mod status;

// Re-export primary types
pub use client::Client;
pub use controller::{ClusterController, ControllerConfig};
pub use descendants::{ClusterDescendants, DescendantKind};
pub use error::{ControllerError, Result};
pub use patch::PatchHelper;
pub use probe::{KubeconfigProber, KubeconfigProberConfig, ProbeMode, ProbeResult, RemoteProber};
pub use queue::{BackoffConfig, WorkQueue};
pub use reconciler::{Action, Reconciler, ReconcilerConfig};
