//! Custom Resource Definitions for the chaos operator

mod engine;
mod types;

pub use engine::{
    AppAnnotations, ApplicationParams, ChaosEngine, ChaosEngineSpec, ChaosEngineStatus,
    ComponentParams, ExperimentList, ExperimentStatuses, RunnerEnv, RunnerInfo, ABORTED_VERDICT,
};
pub use types::{
    AnnotationCheck, AppKind, CleanUpPolicy, EngineState, EngineStatus, ExperimentStatus,
    RunnerType,
};
