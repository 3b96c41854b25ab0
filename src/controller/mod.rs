//! ChaosEngine controller
//!
//! Reconciliation follows the observe-decide-act pattern: [`state`] decides,
//! [`lifecycle`] acts on owned resources, and [`engine`] drives both and
//! persists the result through [`kube_client`].

pub mod engine;
pub mod kube_client;
pub mod lifecycle;
pub mod state;

pub use engine::{error_policy, reconcile, reconcile_engine, Context};
pub use kube_client::{ChildKind, EngineKubeClient, EngineKubeClientImpl};
pub use state::Transition;
