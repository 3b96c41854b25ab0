//! ChaosEngine controller implementation
//!
//! Each invocation re-reads the engine, picks a transition with
//! [`next_transition`], and carries it out. Nothing is cached between
//! invocations; the engine object in the store is the only state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::kube_client::{EngineKubeClient, EngineKubeClientImpl};
use super::lifecycle::{
    add_finalizer, ensure_present, force_delete_owned, graceful_delete_pods, remove_finalizer,
    Presence,
};
use super::state::{effective_state, next_transition, Transition};
use crate::annotation::check_chaos_annotation;
use crate::app_info::ApplicationInfo;
use crate::config::OperatorConfig;
use crate::crd::{AnnotationCheck, ChaosEngine, CleanUpPolicy, EngineState, EngineStatus};
use crate::events::{actions, reasons, EventPublisher, KubeEventPublisher, REPORTING_COMPONENT};
use crate::runner::RunnerSettings;
use crate::Error;

/// How often a running engine is checked while its runner works
pub const RUNNER_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Requeue delay after a retryable failure
pub const RETRY_INTERVAL: Duration = Duration::from_secs(30);

const POD_SUCCEEDED: &str = "Succeeded";

/// Shared context for the ChaosEngine controller
pub struct Context {
    /// Resource store
    pub kube: Arc<dyn EngineKubeClient>,
    /// Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Read-only operator settings
    pub config: Arc<OperatorConfig>,
}

impl Context {
    /// Create a context from explicit dependencies
    pub fn new(
        kube: Arc<dyn EngineKubeClient>,
        events: Arc<dyn EventPublisher>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            kube,
            events,
            config: Arc::new(config),
        }
    }

    /// Create a context talking to a live cluster
    pub fn from_client(client: Client, config: OperatorConfig) -> Self {
        let events = Arc::new(KubeEventPublisher::new(client.clone(), REPORTING_COMPONENT));
        Self::new(Arc::new(EngineKubeClientImpl::new(client)), events, config)
    }

    /// Create a context for testing with a no-op event publisher
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn EngineKubeClient>) -> Self {
        Self::new(
            kube,
            Arc::new(crate::events::NoopEventPublisher),
            OperatorConfig::default(),
        )
    }

    async fn publish(
        &self,
        engine: &ChaosEngine,
        type_: EventType,
        reason: &str,
        action: &str,
        note: impl Into<String>,
    ) {
        self.events
            .publish(&engine.object_ref(&()), type_, reason, action, Some(note.into()))
            .await;
    }
}

/// Reconcile entry point for the kube-rs `Controller`
///
/// The watched copy only supplies the key; the engine is re-read from the store.
#[instrument(
    skip(engine, ctx),
    fields(engine = %engine.name_any(), namespace = ?engine.namespace())
)]
pub async fn reconcile(engine: Arc<ChaosEngine>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = engine.name_any();
    let namespace = engine
        .namespace()
        .ok_or_else(|| Error::validation_for(&name, "ChaosEngine must be namespaced"))?;
    reconcile_engine(&namespace, &name, &ctx).await
}

/// Reconcile the engine `namespace/name`
///
/// Safe to call any number of times with no prior state. A missing engine
/// is treated as already deleted.
pub async fn reconcile_engine(namespace: &str, name: &str, ctx: &Context) -> Result<Action, Error> {
    let Some(mut engine) = ctx.kube.get_engine(namespace, name).await? else {
        debug!(engine = %name, namespace = %namespace, "engine not found, nothing to do");
        return Ok(Action::await_change());
    };

    let mut initialized = false;
    loop {
        let transition = next_transition(&engine);
        debug!(engine = %name, ?transition, "selected transition");
        return match transition {
            Transition::Initialize if initialized => {
                warn!(engine = %name, "initialization did not stick, retrying later");
                Ok(Action::requeue(RETRY_INTERVAL))
            }
            Transition::Initialize => {
                engine = initialize(engine, ctx).await?;
                initialized = true;
                continue;
            }
            Transition::Delete | Transition::ForceAbort => stop(engine, ctx).await,
            Transition::CreateAndRun => create_and_run(engine, ctx).await,
            Transition::GracefulComplete => graceful_complete(&engine, ctx).await,
            Transition::Restart => restart(engine, ctx).await,
            Transition::Noop => Ok(Action::await_change()),
        };
    }
}

/// Error policy for ChaosEngine reconciliation
pub fn error_policy(engine: Arc<ChaosEngine>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        engine = %engine.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(RETRY_INTERVAL)
    } else {
        Action::await_change()
    }
}

// =============================================================================
// Procedures
// =============================================================================

/// Persist defaults and the finalizer before any child resource exists
async fn initialize(mut engine: ChaosEngine, ctx: &Context) -> Result<ChaosEngine, Error> {
    let (state, status) = effective_state(&engine);
    engine.spec.engine_state = Some(state);
    engine.status.get_or_insert_with(Default::default).engine_status = status;
    let added = add_finalizer(&mut engine);

    let updated = ctx.kube.update_engine(&engine).await?;
    info!(engine = %engine.name_any(), "engine initialized");
    if added {
        ctx.publish(
            &updated,
            EventType::Normal,
            reasons::ENGINE_INITIALIZED,
            actions::RECONCILE,
            format!("{} initialized", updated.name_any()),
        )
        .await;
    }
    Ok(updated)
}

/// Tear down everything the run owns and mark the engine stopped
///
/// Used for deletion and for a stop requested before completion.
async fn stop(mut engine: ChaosEngine, ctx: &Context) -> Result<Action, Error> {
    let namespace = engine.namespace().unwrap_or_default();
    let uid = engine.uid().unwrap_or_default();

    if let Err(e) = force_delete_owned(ctx.kube.as_ref(), &namespace, &uid).await {
        ctx.publish(
            &engine,
            EventType::Warning,
            reasons::RESOURCES_OPERATION_FAILED,
            actions::DELETE,
            e.to_string(),
        )
        .await;
        return Err(e);
    }

    let released = remove_finalizer(&mut engine);
    let status = engine.status.get_or_insert_with(Default::default);
    let aborted = status.abort_active_experiments(Utc::now());
    let newly_stopped = status.engine_status != Some(EngineStatus::Stopped);
    status.engine_status = Some(EngineStatus::Stopped);

    if released || aborted > 0 || newly_stopped {
        if let Err(e) = ctx.kube.update_engine(&engine).await {
            ctx.publish(
                &engine,
                EventType::Warning,
                reasons::RESOURCES_OPERATION_FAILED,
                actions::DELETE,
                "unable to update chaosengine",
            )
            .await;
            return Err(e);
        }
        info!(engine = %engine.name_any(), aborted, released, "engine stopped");
    }

    if released {
        ctx.publish(
            &engine,
            EventType::Normal,
            reasons::ENGINE_STOPPED,
            actions::DELETE,
            "chaos resources deleted successfully",
        )
        .await;
    }
    Ok(Action::await_change())
}

/// Make sure the runner exists and record completion once it succeeds
async fn create_and_run(engine: ChaosEngine, ctx: &Context) -> Result<Action, Error> {
    let check = match AnnotationCheck::resolve(
        engine.spec.annotation_check.as_deref(),
        ctx.config.default_annotation_check,
    ) {
        Ok(check) => check,
        Err(e) => return Err(warn_failed(ctx, &engine, e).await),
    };

    let mut app = match ApplicationInfo::from_engine(&engine) {
        Ok(app) => app,
        Err(e) => return Err(warn_failed(ctx, &engine, e).await),
    };

    if check.is_enabled() {
        // A failed gate is reported but does not stop the run
        if let Err(e) =
            check_chaos_annotation(ctx.kube.as_ref(), &mut app, &ctx.config.annotation_key).await
        {
            warn!(engine = %engine.name_any(), error = %e, "annotation check failed");
            ctx.publish(
                &engine,
                EventType::Warning,
                reasons::RESOURCES_OPERATION_FAILED,
                actions::RECONCILE,
                e.to_string(),
            )
            .await;
        }
    }

    let settings = match RunnerSettings::from_engine(&engine, &app, check, &ctx.config) {
        Ok(settings) => settings,
        Err(e) => return Err(warn_failed(ctx, &engine, e).await),
    };
    let runner = settings.into_pod();

    let presence = match ensure_present(ctx.kube.as_ref(), &runner).await {
        Ok(presence) => presence,
        Err(e) => return Err(warn_failed(ctx, &engine, e).await),
    };

    match presence {
        Presence::Existing(pod) if pod_succeeded(&pod) => complete(engine, ctx).await,
        _ => Ok(Action::requeue(RUNNER_POLL_INTERVAL)),
    }
}

/// Record natural completion: status completed and declared state stop together
async fn complete(mut engine: ChaosEngine, ctx: &Context) -> Result<Action, Error> {
    engine.status.get_or_insert_with(Default::default).engine_status =
        Some(EngineStatus::Completed);
    engine.spec.engine_state = Some(EngineState::Stop);

    let updated = ctx.kube.update_engine(&engine).await?;
    info!(engine = %updated.name_any(), "engine completed");
    ctx.publish(
        &updated,
        EventType::Normal,
        reasons::ENGINE_COMPLETED,
        actions::RECONCILE,
        format!(
            "chaos engine completed, resources will be {} per jobCleanUpPolicy",
            match updated.spec.clean_up_policy() {
                CleanUpPolicy::Delete => "deleted",
                CleanUpPolicy::Retain => "retained",
            }
        ),
    )
    .await;
    Ok(Action::await_change())
}

/// Delete owned pods after completion when the policy asks for it
async fn graceful_complete(engine: &ChaosEngine, ctx: &Context) -> Result<Action, Error> {
    if engine.spec.clean_up_policy() == CleanUpPolicy::Delete {
        let namespace = engine.namespace().unwrap_or_default();
        let uid = engine.uid().unwrap_or_default();
        if let Err(e) =
            graceful_delete_pods(ctx.kube.as_ref(), &namespace, &engine.name_any(), &uid).await
        {
            return Err(warn_failed(ctx, engine, e).await);
        }
    }
    Ok(Action::await_change())
}

/// Wipe the previous run and start over
///
/// The previous run's experiment results are discarded.
async fn restart(mut engine: ChaosEngine, ctx: &Context) -> Result<Action, Error> {
    let namespace = engine.namespace().unwrap_or_default();
    let uid = engine.uid().unwrap_or_default();

    if let Err(e) = force_delete_owned(ctx.kube.as_ref(), &namespace, &uid).await {
        return Err(warn_failed(ctx, &engine, e).await);
    }

    let status = engine.status.get_or_insert_with(Default::default);
    status.engine_status = Some(EngineStatus::Initialized);
    status.experiments.clear();

    let updated = ctx.kube.update_engine(&engine).await?;
    info!(engine = %updated.name_any(), "engine restarted");
    ctx.publish(
        &updated,
        EventType::Normal,
        reasons::RESTART_IN_PROGRESS,
        actions::RESTART,
        "chaos engine restarted, chaos resources will be re-created",
    )
    .await;
    Ok(Action::await_change())
}

async fn warn_failed(ctx: &Context, engine: &ChaosEngine, error: Error) -> Error {
    ctx.publish(
        engine,
        EventType::Warning,
        reasons::RESOURCES_OPERATION_FAILED,
        actions::RECONCILE,
        error.to_string(),
    )
    .await;
    error
}

fn pod_succeeded(pod: &Pod) -> bool {
    pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some(POD_SUCCEEDED)
}

// =============================================================================
// Tests
// =============================================================================
