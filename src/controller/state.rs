//! Transition decision for a ChaosEngine
//!
//! Pure functions over the observed object. The driver in `engine.rs` carries
//! out whatever [`next_transition`] picks.

use kube::Resource;

use super::lifecycle::has_finalizer;
use crate::crd::{ChaosEngine, EngineState, EngineStatus};

/// What a reconciliation should do next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Deletion requested: force cleanup, release the finalizer, mark stopped
    Delete,
    /// Attach the finalizer and record initialized status before any child exists
    Initialize,
    /// Ensure the runner exists and watch it for completion
    CreateAndRun,
    /// Completed and stopped: delete pods if the cleanup policy asks for it
    GracefulComplete,
    /// Stopped before completion: same teardown as delete, without deletion
    ForceAbort,
    /// Re-activated after completion or stop: wipe and start over
    Restart,
    /// Nothing to do
    Noop,
}

/// Declared state and observed status with first-observation defaults applied
///
/// An unset `engineState` means active; an active engine with no status yet is
/// initialized.
pub fn effective_state(engine: &ChaosEngine) -> (EngineState, Option<EngineStatus>) {
    let state = engine.spec.engine_state.unwrap_or(EngineState::Active);
    let status = engine.status.as_ref().and_then(|s| s.engine_status);
    let status = match (state, status) {
        (EngineState::Active, None) => Some(EngineStatus::Initialized),
        (_, status) => status,
    };
    (state, status)
}

/// Pick the transition for `engine`, first matching rule wins
pub fn next_transition(engine: &ChaosEngine) -> Transition {
    if engine.meta().deletion_timestamp.is_some() {
        return Transition::Delete;
    }

    let (state, status) = effective_state(engine);
    let recorded = engine.status.as_ref().and_then(|s| s.engine_status);

    if status == Some(EngineStatus::Initialized)
        && (!has_finalizer(engine) || recorded.is_none() || engine.spec.engine_state.is_none())
    {
        return Transition::Initialize;
    }

    match (state, status) {
        (EngineState::Active, Some(EngineStatus::Initialized)) => Transition::CreateAndRun,
        (EngineState::Stop, Some(EngineStatus::Completed)) => Transition::GracefulComplete,
        (EngineState::Stop, _) => Transition::ForceAbort,
        (EngineState::Active, Some(EngineStatus::Completed | EngineStatus::Stopped)) => {
            Transition::Restart
        }
        (EngineState::Active, None) => Transition::Noop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::lifecycle::ENGINE_FINALIZER;
    use crate::crd::{ChaosEngineSpec, ChaosEngineStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn engine(
        state: Option<EngineState>,
        status: Option<EngineStatus>,
        finalized: bool,
    ) -> ChaosEngine {
        let mut engine = ChaosEngine::new(
            "nginx-chaos",
            ChaosEngineSpec {
                engine_state: state,
                ..Default::default()
            },
        );
        engine.status = status.map(|s| ChaosEngineStatus {
            engine_status: Some(s),
            experiments: vec![],
        });
        if finalized {
            engine.metadata.finalizers = Some(vec![ENGINE_FINALIZER.to_string()]);
        }
        engine
    }

    #[test]
    fn defaults_on_first_observation() {
        let fresh = engine(None, None, false);
        assert_eq!(
            effective_state(&fresh),
            (EngineState::Active, Some(EngineStatus::Initialized))
        );

        let stopped_fresh = engine(Some(EngineState::Stop), None, false);
        assert_eq!(effective_state(&stopped_fresh), (EngineState::Stop, None));
    }

    #[test]
    fn new_engine_is_initialized_first() {
        assert_eq!(next_transition(&engine(None, None, false)), Transition::Initialize);
        assert_eq!(
            next_transition(&engine(Some(EngineState::Active), None, false)),
            Transition::Initialize
        );
        // Finalizer present but nothing recorded yet
        assert_eq!(next_transition(&engine(None, None, true)), Transition::Initialize);
        // Status recorded but finalizer missing
        assert_eq!(
            next_transition(&engine(
                Some(EngineState::Active),
                Some(EngineStatus::Initialized),
                false
            )),
            Transition::Initialize
        );
    }

    #[test]
    fn transition_table() {
        use EngineState::*;
        use EngineStatus::*;
        let cases = [
            (Active, Some(Initialized), Transition::CreateAndRun),
            (Stop, Some(Completed), Transition::GracefulComplete),
            (Stop, Some(Initialized), Transition::ForceAbort),
            (Stop, Some(Stopped), Transition::ForceAbort),
            (Stop, None, Transition::ForceAbort),
            (Active, Some(Completed), Transition::Restart),
            (Active, Some(Stopped), Transition::Restart),
        ];
        for (state, status, expected) in cases {
            assert_eq!(
                next_transition(&engine(Some(state), status, true)),
                expected,
                "({state}, {status:?})"
            );
        }
    }

    /// Story: deletion wins over every other rule
    #[test]
    fn story_deletion_takes_precedence() {
        for status in [
            None,
            Some(EngineStatus::Initialized),
            Some(EngineStatus::Completed),
            Some(EngineStatus::Stopped),
        ] {
            let mut e = engine(Some(EngineState::Active), status, false);
            e.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            assert_eq!(next_transition(&e), Transition::Delete);
        }
    }
}
