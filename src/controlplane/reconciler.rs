//! Control Plane Reconciler
//!
//! One pass observes every tracked sub-system, folds the observations into
//! the control plane's condition store, writes the `Ready` summary and
//! persists the status if anything changed. Status writes carry the object's
//! resourceVersion; on a conflict the latest object is re-read and the same
//! observations re-applied to it.

use super::board::{ReadinessBoard, ReadinessSnapshot};
use super::metrics::Metrics;
use crate::crd::{
    reasons, Condition, ConditionSeverity, ConditionStatus, ConditionType, Conditions,
    OpenStackControlPlane, OpenStackControlPlaneStatus, ReadinessPolicy, ReadinessState,
    Subsystem,
};
use crate::domain::{ControlPlaneStoreRef, ObjectKey, SubsystemObservation, SubsystemProbeRef};
use crate::error::{Error, Result};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::Utc;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

// =============================================================================
// Ingestion
// =============================================================================

/// Fold one probe observation into the sub-system's condition.
///
/// Returns whether the store changed.
pub fn ingest(
    conditions: &mut Conditions,
    subsystem: Subsystem,
    observation: &SubsystemObservation,
) -> bool {
    let condition_type = subsystem.condition_type();
    match observation {
        SubsystemObservation::Missing => conditions.mark_false(
            condition_type,
            reasons::NOT_FOUND,
            ConditionSeverity::Warning,
            format!("{} {} not found", subsystem.kind(), subsystem.instance_name()),
        ),
        SubsystemObservation::Pending => conditions.mark_unknown(
            condition_type,
            reasons::INIT,
            format!(
                "{} {} has not reported {} yet",
                subsystem.kind(),
                subsystem.instance_name(),
                subsystem.readiness_condition()
            ),
        ),
        SubsystemObservation::Reported(observed) => {
            let mut condition = Condition::new(
                condition_type,
                observed.status,
                observed.reason.clone(),
                observed.message.clone(),
            );
            if observed.status == ConditionStatus::False {
                condition = condition.with_severity(ConditionSeverity::Warning);
            }
            conditions.set(condition)
        }
    }
}

/// Status the control plane should carry given a set of observations
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredStatus {
    pub status: OpenStackControlPlaneStatus,
    pub state: ReadinessState,
    pub unmet: Vec<ConditionType>,
}

/// Compute the next status from the object's current one.
///
/// Conditions whose state did not change keep their transition time, so the
/// result equals the current status whenever nothing was observed to change.
pub fn desired_status(
    control_plane: &OpenStackControlPlane,
    observations: &[(Subsystem, SubsystemObservation)],
    policy: &ReadinessPolicy,
) -> DesiredStatus {
    let mut status = control_plane.status.clone().unwrap_or_default();
    status.conditions.init(policy.tracked());

    for (subsystem, observation) in observations {
        ingest(&mut status.conditions, *subsystem, observation);
    }

    let state = match control_plane.spec.check_templates() {
        Ok(()) => policy.summarize(&mut status.conditions),
        Err(e) => {
            status.conditions.mark_false(
                ConditionType::Ready,
                reasons::TEMPLATE_INCOMPATIBLE,
                ConditionSeverity::Error,
                e.to_string(),
            );
            policy.evaluate(&status.conditions)
        }
    };

    status.observed_generation = control_plane.metadata.generation;
    let unmet = policy.unmet(&status.conditions);

    DesiredStatus {
        status,
        state,
        unmet,
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Result of one reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Status was written
    Updated(ReadinessState),
    /// Status already matched the observations
    Unchanged(ReadinessState),
    /// Object no longer exists
    Deleted,
}

impl ReconcileOutcome {
    pub fn state(&self) -> Option<ReadinessState> {
        match self {
            ReconcileOutcome::Updated(state) | ReconcileOutcome::Unchanged(state) => Some(*state),
            ReconcileOutcome::Deleted => None,
        }
    }
}

pub struct Reconciler {
    store: ControlPlaneStoreRef,
    probe: SubsystemProbeRef,
    policy: ReadinessPolicy,
    board: Arc<ReadinessBoard>,
    metrics: Metrics,
    conflict_initial_interval: Duration,
    conflict_max_elapsed: Duration,
}

impl Reconciler {
    pub fn new(
        store: ControlPlaneStoreRef,
        probe: SubsystemProbeRef,
        policy: ReadinessPolicy,
        board: Arc<ReadinessBoard>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            probe,
            policy,
            board,
            metrics,
            conflict_initial_interval: Duration::from_millis(100),
            conflict_max_elapsed: Duration::from_secs(10),
        }
    }

    /// Tune how long status conflicts are retried before giving up
    pub fn with_conflict_backoff(mut self, initial_interval: Duration, max_elapsed: Duration) -> Self {
        self.conflict_initial_interval = initial_interval;
        self.conflict_max_elapsed = max_elapsed;
        self
    }

    pub fn policy(&self) -> &ReadinessPolicy {
        &self.policy
    }

    pub fn board(&self) -> &Arc<ReadinessBoard> {
        &self.board
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Reconcile by key, fetching the object first
    pub async fn reconcile_key(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        match self.store.get(key).await? {
            Some(control_plane) => self.reconcile(&control_plane).await,
            None => {
                self.forget(key);
                Ok(ReconcileOutcome::Deleted)
            }
        }
    }

    /// Reconcile one control plane and record the pass in metrics
    #[instrument(skip_all, fields(key = %control_plane.key()))]
    pub async fn reconcile(&self, control_plane: &OpenStackControlPlane) -> Result<ReconcileOutcome> {
        let started = Instant::now();
        let result = self.reconcile_inner(control_plane).await;
        match &result {
            Ok(outcome) => {
                debug!("Reconciled: {:?}", outcome);
                self.metrics.record_success(started.elapsed());
            }
            Err(e) => {
                warn!("Reconcile failed: {}", e);
                self.metrics.record_failure(e, started.elapsed());
            }
        }
        result
    }

    /// Drop everything known about a deleted control plane
    pub fn forget(&self, key: &ObjectKey) {
        if self.board.remove(key).is_some() {
            info!("Control plane {} removed", key);
        }
        self.metrics.forget(key);
    }

    async fn reconcile_inner(&self, control_plane: &OpenStackControlPlane) -> Result<ReconcileOutcome> {
        let key = control_plane.key();
        let observations = self.observe(&key.namespace).await?;

        let (outcome, templates) = self.write_status(control_plane, &observations).await?;
        if outcome == ReconcileOutcome::Deleted {
            self.forget(&key);
            return Ok(outcome);
        }

        // Already recorded on the Ready condition; surfaced so the controller
        // waits for a spec change instead of resyncing.
        templates?;
        Ok(outcome)
    }

    /// Observe every tracked sub-system concurrently
    async fn observe(&self, namespace: &str) -> Result<Vec<(Subsystem, SubsystemObservation)>> {
        let tracked: Vec<_> = Subsystem::ALL
            .into_iter()
            .filter(|s| self.policy.requirement(s.condition_type()).is_some())
            .collect();

        try_join_all(tracked.into_iter().map(|subsystem| async move {
            let observation = self.probe.observe(namespace, subsystem).await?;
            Ok::<_, Error>((subsystem, observation))
        }))
        .await
    }

    /// Persist the desired status, re-reading the object on conflict.
    ///
    /// Also returns the template check of the object the status was computed
    /// from, which after a conflict is the re-read one rather than the caller's.
    async fn write_status(
        &self,
        control_plane: &OpenStackControlPlane,
        observations: &[(Subsystem, SubsystemObservation)],
    ) -> Result<(ReconcileOutcome, Result<()>)> {
        let key = &control_plane.key();
        let mut seed = Some(control_plane.clone());

        let attempt = move || {
            let seed = seed.take();
            async move {
                let current = match seed {
                    Some(current) => current,
                    None => match self.store.get(key).await {
                        Ok(Some(latest)) => latest,
                        Ok(None) => return Ok((ReconcileOutcome::Deleted, Ok(()))),
                        Err(e) => return Err(backoff::Error::permanent(e)),
                    },
                };

                let desired = desired_status(&current, observations, &self.policy);
                let state = desired.state;
                let templates = current.spec.check_templates();

                if current.status.as_ref() == Some(&desired.status) {
                    self.publish(&current, desired);
                    return Ok((ReconcileOutcome::Unchanged(state), templates));
                }

                let mut updated = current;
                updated.status = Some(desired.status.clone());
                match self.store.replace_status(&updated).await {
                    Ok(stored) => {
                        self.publish(&stored, desired);
                        Ok((ReconcileOutcome::Updated(state), templates))
                    }
                    Err(e @ Error::Conflict { .. }) => {
                        self.metrics.record_conflict();
                        debug!("Status write for {} conflicted, re-reading", key);
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        };

        backoff::future::retry(self.conflict_backoff(), attempt).await
    }

    fn conflict_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.conflict_initial_interval)
            .with_max_interval(self.conflict_initial_interval * 8)
            .with_max_elapsed_time(Some(self.conflict_max_elapsed))
            .build()
    }

    fn publish(&self, control_plane: &OpenStackControlPlane, desired: DesiredStatus) {
        let key = control_plane.key();
        self.metrics.set_readiness(&key, desired.state);
        self.board.publish(ReadinessSnapshot {
            key,
            state: desired.state,
            unmet: desired.unmet,
            conditions: desired.status.conditions,
            observed_generation: desired.status.observed_generation,
            observed_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::events::ReadinessEvent;
    use crate::controlplane::testing::{control_plane, MemoryStore, StaticProbe};
    use crate::crd::ServiceTemplate;
    use crate::domain::{ControlPlaneStore, ObservedCondition};
    use assert_matches::assert_matches;
    use std::sync::atomic::Ordering;

    fn setup(probe: StaticProbe) -> (Arc<MemoryStore>, Arc<StaticProbe>, Reconciler) {
        let store = Arc::new(MemoryStore::default());
        let probe = Arc::new(probe);
        let reconciler = Reconciler::new(
            store.clone(),
            probe.clone(),
            ReadinessPolicy::control_plane(),
            ReadinessBoard::new(),
            Metrics::new().unwrap(),
        )
        .with_conflict_backoff(Duration::from_millis(1), Duration::from_millis(200));
        (store, probe, reconciler)
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    #[test]
    fn test_ingest_missing() {
        let mut conditions = Conditions::new();
        ingest(&mut conditions, Subsystem::Glance, &SubsystemObservation::Missing);
        let glance = conditions.get(ConditionType::GlanceReady).unwrap();
        assert_eq!(glance.status, ConditionStatus::False);
        assert_eq!(glance.reason, reasons::NOT_FOUND);
        assert_eq!(glance.severity, Some(ConditionSeverity::Warning));
    }

    #[test]
    fn test_ingest_pending() {
        let mut conditions = Conditions::new();
        ingest(&mut conditions, Subsystem::RabbitMq, &SubsystemObservation::Pending);
        let rabbit = conditions.get(ConditionType::RabbitMqReady).unwrap();
        assert_eq!(rabbit.status, ConditionStatus::Unknown);
        assert_eq!(rabbit.reason, reasons::INIT);
        assert!(rabbit.message.contains("ClusterAvailable"));
    }

    #[test]
    fn test_ingest_reported_is_verbatim() {
        let mut conditions = Conditions::new();
        let observed = SubsystemObservation::Reported(ObservedCondition {
            status: ConditionStatus::False,
            reason: "DeploymentNotReady".into(),
            message: "0/1 replicas available".into(),
        });
        assert!(ingest(&mut conditions, Subsystem::Keystone, &observed));
        assert!(!ingest(&mut conditions, Subsystem::Keystone, &observed));

        let keystone = conditions.get(ConditionType::KeystoneApiReady).unwrap();
        assert_eq!(keystone.reason, "DeploymentNotReady");
        assert_eq!(keystone.message, "0/1 replicas available");
        assert_eq!(keystone.severity, Some(ConditionSeverity::Warning));
    }

    #[test]
    fn test_desired_status_is_stable() {
        let probe_observations: Vec<_> = Subsystem::ALL
            .into_iter()
            .map(|s| (s, SubsystemObservation::Pending))
            .collect();
        let policy = ReadinessPolicy::control_plane();
        let mut cp = control_plane("cp");

        let first = desired_status(&cp, &probe_observations, &policy);
        assert_eq!(first.status.observed_generation, Some(3));
        assert_eq!(first.state, ReadinessState::NotReady);
        assert_eq!(first.unmet.len(), 5);

        cp.status = Some(first.status.clone());
        let second = desired_status(&cp, &probe_observations, &policy);
        assert_eq!(second, first);
    }

    // =========================================================================
    // Reconcile
    // =========================================================================

    #[tokio::test]
    async fn test_reconcile_all_ready() {
        let (store, _probe, reconciler) = setup(StaticProbe::all_ready());
        let cp = store.insert(control_plane("cp"));

        let outcome = reconciler.reconcile(&cp).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated(ReadinessState::Ready));

        let stored = store.stored(&cp.key());
        assert!(stored.is_ready());
        let status = stored.status.unwrap();
        let first = status.conditions.first().unwrap();
        assert_eq!(first.condition_type, ConditionType::Ready);
        assert_eq!(first.status, ConditionStatus::True);
        assert_eq!(status.observed_generation, Some(3));

        let snapshot = reconciler.board().get(&cp.key()).unwrap();
        assert!(snapshot.is_ready());
        assert!(snapshot.unmet.is_empty());
    }

    #[tokio::test]
    async fn test_no_write_when_nothing_changed() {
        let (store, _probe, reconciler) = setup(StaticProbe::all_ready());
        let _ = store.insert(control_plane("cp"));
        let key = ObjectKey::new("openstack", "cp");

        reconciler.reconcile_key(&key).await.unwrap();
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);

        let outcome = reconciler.reconcile_key(&key).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged(ReadinessState::Ready));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_subsystem_is_mirrored_on_ready() {
        let probe = StaticProbe::all_ready();
        probe.report(Subsystem::Glance, ConditionStatus::False, "PullFailed", "image pull failed");
        let (store, _probe, reconciler) = setup(probe);
        let cp = store.insert(control_plane("cp"));

        let outcome = reconciler.reconcile(&cp).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated(ReadinessState::NotReady));

        let conditions = store.stored(&cp.key()).conditions();
        let ready = conditions.get(ConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "PullFailed");
        assert_eq!(
            reconciler.board().get(&cp.key()).unwrap().unmet,
            vec![ConditionType::GlanceReady]
        );
    }

    #[tokio::test]
    async fn test_block_storage_does_not_gate_readiness() {
        let probe = StaticProbe::all_ready();
        probe.set(Subsystem::Cinder, SubsystemObservation::Missing);
        let (store, _probe, reconciler) = setup(probe);
        let cp = store.insert(control_plane("cp"));

        let outcome = reconciler.reconcile(&cp).await.unwrap();
        assert_eq!(outcome.state(), Some(ReadinessState::Ready));
        assert!(store
            .stored(&cp.key())
            .conditions()
            .is_false(ConditionType::CinderReady));
    }

    #[tokio::test]
    async fn test_readiness_follows_regression() {
        let (store, probe, reconciler) = setup(StaticProbe::all_ready());
        let key = ObjectKey::new("openstack", "cp");
        let _ = store.insert(control_plane("cp"));
        let mut events = reconciler.board().subscribe();

        reconciler.reconcile_key(&key).await.unwrap();
        probe.report(Subsystem::RabbitMq, ConditionStatus::False, "PodCrashLoop", "crashing");
        let outcome = reconciler.reconcile_key(&key).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated(ReadinessState::NotReady));

        assert_matches!(events.recv().await.unwrap(), ReadinessEvent::Observed { .. });
        assert_matches!(
            events.recv().await.unwrap(),
            ReadinessEvent::BecameNotReady { unmet, .. } if unmet == vec![ConditionType::RabbitMqReady]
        );
    }

    #[tokio::test]
    async fn test_conflict_rereads_and_reapplies() {
        let (store, _probe, reconciler) = setup(StaticProbe::all_ready());
        let stale = store.insert(control_plane("cp"));
        store.touch(&stale.key());

        let outcome = reconciler.reconcile(&stale).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated(ReadinessState::Ready));
        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
        assert_eq!(reconciler.metrics().conflicts.get(), 1);
        assert!(store.stored(&stale.key()).is_ready());
    }

    #[tokio::test]
    async fn test_write_after_delete() {
        let (store, _probe, reconciler) = setup(StaticProbe::all_ready());
        let stale = store.insert(control_plane("cp"));
        store.delete(&stale.key());

        let result = reconciler.reconcile(&stale).await;
        assert_matches!(result, Err(Error::ResourceNotFound { .. }));

        let outcome = reconciler.reconcile_key(&stale.key()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert!(reconciler.board().get(&stale.key()).is_none());
    }

    #[tokio::test]
    async fn test_incompatible_template() {
        let (store, _probe, reconciler) = setup(StaticProbe::all_ready());
        let mut cp = control_plane("cp");
        cp.spec.glance_template = ServiceTemplate::default().with_api_version("glance.openstack.org/v2");
        let cp = store.insert(cp);

        let result = reconciler.reconcile(&cp).await;
        assert_matches!(result, Err(Error::IncompatibleTemplate { .. }));

        let conditions = store.stored(&cp.key()).conditions();
        let ready = conditions.first().unwrap();
        assert_eq!(ready.condition_type, ConditionType::Ready);
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, reasons::TEMPLATE_INCOMPATIBLE);
        assert_eq!(ready.severity, Some(ConditionSeverity::Error));

        // a second pass keeps the same summary and does not write again
        let _ = reconciler.reconcile_key(&cp.key()).await;
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_template_fixed_during_conflict() {
        let (store, _probe, reconciler) = setup(StaticProbe::all_ready());
        let mut cp = control_plane("cp");
        cp.spec.glance_template = ServiceTemplate::default().with_api_version("glance.openstack.org/v2");
        let stale = store.insert(cp);
        store.edit(&stale.key(), |latest| {
            latest.spec.glance_template = ServiceTemplate::default();
        });

        let outcome = reconciler.reconcile(&stale).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated(ReadinessState::Ready));
        assert_eq!(reconciler.metrics().conflicts.get(), 1);

        let stored = store.stored(&stale.key());
        assert!(stored.is_ready());
        let conditions = stored.conditions();
        let ready = conditions.first().unwrap();
        assert_eq!(ready.condition_type, ConditionType::Ready);
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(
            reconciler
                .metrics()
                .failures
                .with_label_values(&["incompatible_template"])
                .get(),
            0
        );
    }

    #[tokio::test]
    async fn test_malformed_status_fails_reconcile() {
        let probe = StaticProbe::all_ready();
        *probe.malformed.lock() = Some(Subsystem::Placement);
        let (store, _probe, reconciler) = setup(probe);
        let cp = store.insert(control_plane("cp"));

        let err = reconciler.reconcile(&cp).await.unwrap_err();
        assert_matches!(err, Error::MalformedStatus { .. });
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
        assert_eq!(
            reconciler
                .metrics()
                .failures
                .with_label_values(&["malformed_status"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_store_list_filters_namespace() {
        let store = MemoryStore::default();
        let _ = store.insert(control_plane("a"));
        let mut other = control_plane("b");
        other.metadata.namespace = Some("other".into());
        let _ = store.insert(other);

        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert_eq!(store.list(Some("openstack")).await.unwrap().len(), 1);
    }
}
