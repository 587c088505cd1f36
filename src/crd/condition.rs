//! Status Conditions
//!
//! Kubernetes-style conditions keyed by type. The store keeps at most one
//! condition per type and exposes them in a canonical order: `Ready` first,
//! then every other type sorted by its wire name. Display tooling reads
//! `conditions[0]`, so the readiness summary is always the first entry once it
//! has been written.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Vocabulary
// =============================================================================

/// Every condition type the control plane knows about
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ConditionType {
    /// Summary condition mirrored from the readiness aggregate
    Ready,
    #[serde(rename = "OpenStackControlPlaneRabbitMQReady")]
    RabbitMqReady,
    #[serde(rename = "OpenStackControlPlaneMariaDBReady")]
    MariaDbReady,
    #[serde(rename = "OpenStackControlPlaneKeystoneAPIReady")]
    KeystoneApiReady,
    #[serde(rename = "OpenStackControlPlanePlacementAPIReady")]
    PlacementApiReady,
    #[serde(rename = "OpenStackControlPlaneGlanceReady")]
    GlanceReady,
    #[serde(rename = "OpenStackControlPlaneCinderReady")]
    CinderReady,
}

impl ConditionType {
    pub const ALL: [ConditionType; 7] = [
        ConditionType::Ready,
        ConditionType::RabbitMqReady,
        ConditionType::MariaDbReady,
        ConditionType::KeystoneApiReady,
        ConditionType::PlacementApiReady,
        ConditionType::GlanceReady,
        ConditionType::CinderReady,
    ];

    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Ready => "Ready",
            ConditionType::RabbitMqReady => "OpenStackControlPlaneRabbitMQReady",
            ConditionType::MariaDbReady => "OpenStackControlPlaneMariaDBReady",
            ConditionType::KeystoneApiReady => "OpenStackControlPlaneKeystoneAPIReady",
            ConditionType::PlacementApiReady => "OpenStackControlPlanePlacementAPIReady",
            ConditionType::GlanceReady => "OpenStackControlPlaneGlanceReady",
            ConditionType::CinderReady => "OpenStackControlPlaneCinderReady",
        }
    }

    /// Canonical position: `Ready` first, the rest by wire name
    fn sort_key(&self) -> (bool, &'static str) {
        (*self != ConditionType::Ready, self.as_str())
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition status following Kubernetes conventions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// How bad a non-True condition is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionSeverity {
    Error,
    Warning,
    Info,
}

/// Machine-readable reasons written by this operator
pub mod reasons {
    pub const READY: &str = "Ready";
    pub const INIT: &str = "Init";
    pub const NOT_FOUND: &str = "NotFound";
    pub const TEMPLATE_INCOMPATIBLE: &str = "TemplateIncompatible";
}

// =============================================================================
// Condition
// =============================================================================

/// A single typed, timestamped health signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub condition_type: ConditionType,

    /// Status: True, False, Unknown
    pub status: ConditionStatus,

    /// Severity, only meaningful when status is not True
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,

    /// Machine-readable reason
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status changed
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a condition stamped with the current time
    pub fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type,
            status,
            severity: None,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn with_severity(mut self, severity: ConditionSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_transition_time(mut self, time: DateTime<Utc>) -> Self {
        self.last_transition_time = time;
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// Same observable state, ignoring the transition timestamp
    fn same_state(&self, other: &Condition) -> bool {
        self.status == other.status
            && self.severity == other.severity
            && self.reason == other.reason
            && self.message == other.message
    }
}

// =============================================================================
// Condition Store
// =============================================================================

/// Ordered set of conditions, one per type
///
/// Decoding keeps the encoded order untouched; every mutation re-applies the
/// canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

/// Duplicate types collapse into the slot of their first occurrence, holding
/// the last encoded value.
impl<'de> Deserialize<'de> for Conditions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let decoded = Vec::<Condition>::deserialize(deserializer)?;
        let mut conditions: Vec<Condition> = Vec::with_capacity(decoded.len());
        for condition in decoded {
            match conditions
                .iter_mut()
                .find(|c| c.condition_type == condition.condition_type)
            {
                Some(existing) => *existing = condition,
                None => conditions.push(condition),
            }
        }
        Ok(Self(conditions))
    }
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the condition for its type.
    ///
    /// The previous `lastTransitionTime` survives when the status is
    /// unchanged. Returns `false` when the store already held exactly this
    /// state.
    pub fn set(&mut self, mut condition: Condition) -> bool {
        match self
            .0
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) => {
                if existing.same_state(&condition) {
                    return false;
                }
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.0.push(condition),
        }
        self.sort();
        true
    }

    /// Mark a condition True
    pub fn mark_true(&mut self, condition_type: ConditionType, message: impl Into<String>) -> bool {
        self.set(Condition::new(
            condition_type,
            ConditionStatus::True,
            reasons::READY,
            message,
        ))
    }

    /// Mark a condition False
    pub fn mark_false(
        &mut self,
        condition_type: ConditionType,
        reason: impl Into<String>,
        severity: ConditionSeverity,
        message: impl Into<String>,
    ) -> bool {
        self.set(
            Condition::new(condition_type, ConditionStatus::False, reason, message)
                .with_severity(severity),
        )
    }

    /// Mark a condition Unknown
    pub fn mark_unknown(
        &mut self,
        condition_type: ConditionType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> bool {
        self.set(Condition::new(
            condition_type,
            ConditionStatus::Unknown,
            reason,
            message,
        ))
    }

    /// Seed every absent type as Unknown; present conditions are left alone
    pub fn init(&mut self, types: impl IntoIterator<Item = ConditionType>) {
        let mut added = false;
        for condition_type in types {
            if !self.has(condition_type) {
                self.0.push(Condition::new(
                    condition_type,
                    ConditionStatus::Unknown,
                    reasons::INIT,
                    format!("{} not started", condition_type),
                ));
                added = true;
            }
        }
        if added {
            self.sort();
        }
    }

    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.condition_type == condition_type)
    }

    pub fn has(&self, condition_type: ConditionType) -> bool {
        self.get(condition_type).is_some()
    }

    /// True only when the condition exists and its status is True
    pub fn is_true(&self, condition_type: ConditionType) -> bool {
        self.status_is(condition_type, ConditionStatus::True)
    }

    pub fn is_false(&self, condition_type: ConditionType) -> bool {
        self.status_is(condition_type, ConditionStatus::False)
    }

    /// Absent conditions are not Unknown; use [`Conditions::has`] to tell them apart
    pub fn is_unknown(&self, condition_type: ConditionType) -> bool {
        self.status_is(condition_type, ConditionStatus::Unknown)
    }

    fn status_is(&self, condition_type: ConditionType, status: ConditionStatus) -> bool {
        self.get(condition_type)
            .map(|c| c.status == status)
            .unwrap_or(false)
    }

    pub fn remove(&mut self, condition_type: ConditionType) -> Option<Condition> {
        let idx = self
            .0
            .iter()
            .position(|c| c.condition_type == condition_type)?;
        Some(self.0.remove(idx))
    }

    /// Most significant condition
    pub fn first(&self) -> Option<&Condition> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Condition] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn sort(&mut self) {
        self.0.sort_by_key(|c| c.condition_type.sort_key());
    }
}

impl<'a> IntoIterator for &'a Conditions {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_condition_type_wire_names() {
        assert_eq!(ConditionType::Ready.to_string(), "Ready");
        assert_eq!(
            ConditionType::KeystoneApiReady.to_string(),
            "OpenStackControlPlaneKeystoneAPIReady"
        );
        let json = serde_json::to_string(&ConditionType::RabbitMqReady).unwrap();
        assert_eq!(json, "\"OpenStackControlPlaneRabbitMQReady\"");
    }

    #[test]
    fn test_status_default_is_unknown() {
        assert_eq!(ConditionStatus::default(), ConditionStatus::Unknown);
        assert_eq!(ConditionStatus::False.to_string(), "False");
    }

    #[test]
    fn test_set_inserts_and_replaces() {
        let mut conditions = Conditions::new();
        assert!(conditions.mark_true(ConditionType::GlanceReady, "Glance ready"));
        assert_eq!(conditions.len(), 1);

        assert!(conditions.mark_false(
            ConditionType::GlanceReady,
            "PullFailed",
            ConditionSeverity::Warning,
            "image pull failed",
        ));
        assert_eq!(conditions.len(), 1);
        let glance = conditions.get(ConditionType::GlanceReady).unwrap();
        assert_eq!(glance.status, ConditionStatus::False);
        assert_eq!(glance.reason, "PullFailed");
        assert_eq!(glance.severity, Some(ConditionSeverity::Warning));
    }

    #[test]
    fn test_identical_set_keeps_transition_time() {
        let mut conditions = Conditions::new();
        let first = Condition::new(ConditionType::MariaDbReady, ConditionStatus::True, "Ready", "ok")
            .with_transition_time(t(0));
        assert!(conditions.set(first));

        let again = Condition::new(ConditionType::MariaDbReady, ConditionStatus::True, "Ready", "ok")
            .with_transition_time(t(60));
        assert!(!conditions.set(again));
        assert_eq!(
            conditions.get(ConditionType::MariaDbReady).unwrap().last_transition_time,
            t(0)
        );
    }

    #[test]
    fn test_message_change_without_status_change_keeps_transition_time() {
        let mut conditions = Conditions::new();
        conditions.set(
            Condition::new(ConditionType::MariaDbReady, ConditionStatus::False, "Init", "starting")
                .with_transition_time(t(0)),
        );
        let changed = conditions.set(
            Condition::new(ConditionType::MariaDbReady, ConditionStatus::False, "Init", "still starting")
                .with_transition_time(t(30)),
        );
        assert!(changed);
        let db = conditions.get(ConditionType::MariaDbReady).unwrap();
        assert_eq!(db.message, "still starting");
        assert_eq!(db.last_transition_time, t(0));
    }

    #[test]
    fn test_status_change_updates_transition_time() {
        let mut conditions = Conditions::new();
        conditions.set(
            Condition::new(ConditionType::MariaDbReady, ConditionStatus::False, "Init", "starting")
                .with_transition_time(t(0)),
        );
        conditions.set(
            Condition::new(ConditionType::MariaDbReady, ConditionStatus::True, "Ready", "ok")
                .with_transition_time(t(90)),
        );
        assert_eq!(
            conditions.get(ConditionType::MariaDbReady).unwrap().last_transition_time,
            t(90)
        );
    }

    #[test]
    fn test_canonical_order_ready_first() {
        let mut conditions = Conditions::new();
        conditions.mark_true(ConditionType::RabbitMqReady, "ok");
        conditions.mark_true(ConditionType::CinderReady, "ok");
        conditions.mark_unknown(ConditionType::Ready, reasons::INIT, "waiting");
        conditions.mark_true(ConditionType::GlanceReady, "ok");

        let order: Vec<_> = conditions.iter().map(|c| c.condition_type).collect();
        assert_eq!(
            order,
            vec![
                ConditionType::Ready,
                ConditionType::CinderReady,
                ConditionType::GlanceReady,
                ConditionType::RabbitMqReady,
            ]
        );
        assert_eq!(conditions.first().unwrap().condition_type, ConditionType::Ready);
    }

    #[test]
    fn test_absent_and_unknown_are_distinct() {
        let mut conditions = Conditions::new();
        assert!(!conditions.has(ConditionType::KeystoneApiReady));
        assert!(!conditions.is_unknown(ConditionType::KeystoneApiReady));
        assert!(!conditions.is_true(ConditionType::KeystoneApiReady));

        conditions.mark_unknown(ConditionType::KeystoneApiReady, reasons::INIT, "pending");
        assert!(conditions.has(ConditionType::KeystoneApiReady));
        assert!(conditions.is_unknown(ConditionType::KeystoneApiReady));
        assert!(!conditions.is_true(ConditionType::KeystoneApiReady));
        assert!(!conditions.is_false(ConditionType::KeystoneApiReady));
    }

    #[test]
    fn test_init_leaves_existing_alone() {
        let mut conditions = Conditions::new();
        conditions.mark_true(ConditionType::GlanceReady, "ok");
        conditions.init([ConditionType::GlanceReady, ConditionType::PlacementApiReady]);

        assert!(conditions.is_true(ConditionType::GlanceReady));
        let placement = conditions.get(ConditionType::PlacementApiReady).unwrap();
        assert_eq!(placement.status, ConditionStatus::Unknown);
        assert_eq!(placement.reason, reasons::INIT);
    }

    #[test]
    fn test_remove() {
        let mut conditions = Conditions::new();
        conditions.mark_true(ConditionType::GlanceReady, "ok");
        let removed = conditions.remove(ConditionType::GlanceReady).unwrap();
        assert_eq!(removed.condition_type, ConditionType::GlanceReady);
        assert!(conditions.is_empty());
        assert!(conditions.remove(ConditionType::GlanceReady).is_none());
    }

    #[test]
    fn test_serde_shape_and_precision() {
        let ts = t(0) + Duration::nanoseconds(123_456_789);
        let mut conditions = Conditions::new();
        conditions.set(
            Condition::new(ConditionType::GlanceReady, ConditionStatus::False, "PullFailed", "boom")
                .with_severity(ConditionSeverity::Error)
                .with_transition_time(ts),
        );

        let value = serde_json::to_value(&conditions).unwrap();
        let entry = &value[0];
        assert_eq!(entry["type"], "OpenStackControlPlaneGlanceReady");
        assert_eq!(entry["status"], "False");
        assert_eq!(entry["severity"], "Error");
        assert!(entry.get("lastTransitionTime").is_some());

        let decoded: Conditions = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, conditions);
        assert_eq!(
            decoded.get(ConditionType::GlanceReady).unwrap().last_transition_time,
            ts
        );
    }

    #[test]
    fn test_decode_preserves_encoded_order() {
        let raw = serde_json::json!([
            {"type": "OpenStackControlPlaneGlanceReady", "status": "True", "reason": "Ready",
             "message": "", "lastTransitionTime": "2024-01-01T00:00:00Z"},
            {"type": "Ready", "status": "False", "reason": "Init",
             "message": "", "lastTransitionTime": "2024-01-01T00:00:00Z"}
        ]);
        let decoded: Conditions = serde_json::from_value(raw).unwrap();
        assert_eq!(
            decoded.first().unwrap().condition_type,
            ConditionType::GlanceReady
        );
        assert!(decoded.get(ConditionType::Ready).unwrap().severity.is_none());
    }

    #[test]
    fn test_decode_collapses_duplicate_types() {
        let raw = serde_json::json!([
            {"type": "OpenStackControlPlaneGlanceReady", "status": "True", "reason": "Ready",
             "message": "", "lastTransitionTime": "2024-01-01T00:00:00Z"},
            {"type": "OpenStackControlPlaneKeystoneAPIReady", "status": "True", "reason": "Ready",
             "message": "", "lastTransitionTime": "2024-01-01T00:00:00Z"},
            {"type": "OpenStackControlPlaneGlanceReady", "status": "False", "reason": "PullFailed",
             "message": "image pull failed", "lastTransitionTime": "2024-01-02T00:00:00Z"}
        ]);
        let mut decoded: Conditions = serde_json::from_value(raw).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.first().unwrap().condition_type, ConditionType::GlanceReady);
        assert!(decoded.is_false(ConditionType::GlanceReady));
        assert_eq!(decoded.get(ConditionType::GlanceReady).unwrap().reason, "PullFailed");

        assert!(decoded.remove(ConditionType::GlanceReady).is_some());
        assert!(!decoded.has(ConditionType::GlanceReady));
        assert!(decoded.is_true(ConditionType::KeystoneApiReady));
    }
}
