//! Control Plane Controller
//!
//! Drives the [`Reconciler`] from a `kube` runtime controller: every watch
//! event on an `OpenStackControlPlane` (and optionally on the sub-resources it
//! owns) triggers a level-triggered reconcile, and each successful pass
//! schedules a periodic resync.

use super::kubernetes::api_resource;
use super::reconciler::{ReconcileOutcome, Reconciler};
use crate::crd::{OpenStackControlPlane, ReadinessPolicy, Subsystem};
use crate::domain::ObjectKey;
use crate::error::{Error, ErrorAction, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::Client;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// First delay when an error asks for backoff
const INITIAL_ERROR_REQUEUE: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Restrict the watch to one namespace
    pub namespace: Option<String>,
    /// Requeue after a successful reconcile
    pub resync_interval: Duration,
    /// Ceiling for error backoff
    pub error_requeue: Duration,
    /// Field manager used for status writes and CRD installation
    pub field_manager: String,
    /// Also reconcile when an owned sub-resource changes
    pub watch_subsystems: bool,
    pub policy: ReadinessPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            resync_interval: Duration::from_secs(30),
            error_requeue: Duration::from_secs(60),
            field_manager: "openstack-operator".to_string(),
            watch_subsystems: false,
            policy: ReadinessPolicy::control_plane(),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// Diagnostics exposed by the health server
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    pub reconciled: u64,
    pub failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reconciled: 0,
            failed: 0,
            last_error: None,
        }
    }
}

/// Shared state for reconcile and error policy
pub struct Context {
    pub reconciler: Reconciler,
    pub config: ControllerConfig,
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Consecutive failures per object, cleared on success
    failures: DashMap<ObjectKey, u32>,
}

impl Context {
    pub fn new(reconciler: Reconciler, config: ControllerConfig) -> Arc<Self> {
        Arc::new(Self {
            reconciler,
            config,
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            failures: DashMap::new(),
        })
    }

    /// Handle for readers outside the controller
    pub fn diagnostics(&self) -> Arc<RwLock<Diagnostics>> {
        self.diagnostics.clone()
    }

    fn record_success(&self, key: &ObjectKey) {
        self.failures.remove(key);
        let mut diagnostics = self.diagnostics.write();
        diagnostics.last_event = Utc::now();
        diagnostics.reconciled += 1;
    }

    /// Drop all state held for a deleted control plane
    pub fn forget(&self, key: &ObjectKey) {
        self.failures.remove(key);
        self.reconciler.forget(key);
    }

    fn record_failure(&self, key: &ObjectKey, error: &Error) -> u32 {
        let mut count = self.failures.entry(key.clone()).or_insert(0);
        *count += 1;
        let mut diagnostics = self.diagnostics.write();
        diagnostics.last_event = Utc::now();
        diagnostics.failed += 1;
        diagnostics.last_error = Some(format!("{}: {}", key, error));
        *count
    }
}

// =============================================================================
// Reconcile / Error Policy
// =============================================================================

/// Delay before retrying after `failures` consecutive errors
pub fn backoff_delay(failures: u32, ceiling: Duration) -> Duration {
    let exponent = failures.saturating_sub(1).min(10);
    (INITIAL_ERROR_REQUEUE * 2u32.pow(exponent)).min(ceiling)
}

pub async fn reconcile(control_plane: Arc<OpenStackControlPlane>, ctx: Arc<Context>) -> Result<Action> {
    let key = control_plane.key();
    let outcome = ctx.reconciler.reconcile(&control_plane).await?;
    ctx.record_success(&key);

    Ok(match outcome {
        ReconcileOutcome::Deleted => Action::await_change(),
        ReconcileOutcome::Updated(state) | ReconcileOutcome::Unchanged(state) => {
            debug!("{} is {}, resync in {:?}", key, state, ctx.config.resync_interval);
            Action::requeue(ctx.config.resync_interval)
        }
    })
}

pub fn error_policy(control_plane: Arc<OpenStackControlPlane>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = control_plane.key();
    let failures = ctx.record_failure(&key, error);
    warn!("Reconcile of {} failed ({} in a row): {}", key, failures, error);

    match error.action() {
        ErrorAction::RequeueWithBackoff => {
            Action::requeue(backoff_delay(failures, ctx.config.error_requeue))
        }
        ErrorAction::RequeueAfter(delay) => Action::requeue(delay),
        ErrorAction::NoRequeue => Action::await_change(),
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Run the controller until a termination signal is received
pub async fn run(client: Client, ctx: Arc<Context>) {
    let api: Api<OpenStackControlPlane> = match &ctx.config.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let mut builder = Controller::new(api, watcher::Config::default());

    if ctx.config.watch_subsystems {
        for subsystem in Subsystem::ALL {
            if ctx.config.policy.requirement(subsystem.condition_type()).is_none() {
                continue;
            }
            let resource = api_resource(subsystem);
            let owned: Api<DynamicObject> = match &ctx.config.namespace {
                Some(ns) => Api::namespaced_with(client.clone(), ns, &resource),
                None => Api::all_with(client.clone(), &resource),
            };
            info!("Watching owned {} resources", subsystem.kind());
            builder = builder.owns_with(owned, resource, watcher::Config::default());
        }
    }

    info!(
        "Controller started (namespace: {}, resync: {:?})",
        ctx.config.namespace.as_deref().unwrap_or("all"),
        ctx.config.resync_interval
    );

    let forget_ctx = ctx.clone();
    builder
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            match result {
                Ok((object, _)) => debug!("Reconciled {}", object),
                Err(controller::Error::ObjectNotFound(object)) => {
                    let key = ObjectKey::new(object.namespace.unwrap_or_default(), object.name);
                    forget_ctx.forget(&key);
                }
                Err(controller::Error::ReconcilerFailed(_, _)) => {}
                Err(e) => error!("Controller error: {}", e),
            }
            futures::future::ready(())
        })
        .await;

    info!("Controller stopped");
}
