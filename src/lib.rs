//! Chaos operator - drives the ChaosEngine lifecycle on Kubernetes
//!
//! A `ChaosEngine` declares a target application, the chaos experiments to
//! run against it and whether the run is active. The operator creates a single
//! runner pod per run, watches it to completion, and tears down everything the
//! run spawned when the engine is stopped, restarted or deleted.
//!
//! # Modules
//!
//! - [`crd`] - ChaosEngine Custom Resource Definition
//! - [`controller`] - reconciliation state machine and resource lifecycle
//! - [`annotation`] - opt-in annotation check on the target application
//! - [`runner`] - runner pod construction
//! - [`app_info`] - target application info derived per reconciliation
//! - [`config`] - process-wide operator settings
//! - [`events`] - Kubernetes Event publishing
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod annotation;
pub mod app_info;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod runner;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
