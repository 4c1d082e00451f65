use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Discriminates background job types that share the status/cache machinery
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    /// Inventory collection across every scope
    Refresh,
    /// Billing history plus live cost projection
    Billing,
    /// Provisioning of a new instance
    Deploy,
}

/// Lifecycle state of a status row
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    #[default]
    Pending,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// Progress of an inventory refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshProgress {
    pub regions_total: usize,
    #[serde(default)]
    pub regions_done: Vec<String>,
    #[serde(default)]
    pub global_done: bool,
    /// `scope/service` slices whose collector failed
    #[serde(default)]
    pub failed_slices: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RefreshProgress {
    pub fn new(regions_total: usize) -> Self {
        Self {
            regions_total,
            ..Default::default()
        }
    }
}

/// Billing totals for one closed month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthTotal {
    pub month: String,
    pub compute: f64,
    pub block_storage: f64,
    pub object_storage: f64,
    pub total: f64,
}

/// Billing history and projection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingSummary {
    pub months: Vec<MonthTotal>,
    /// Sum of every historical month
    pub annual: f64,
    /// Total of the last closed month
    pub month: f64,
    /// `None` when a live price is unknown
    pub this_month_prediction: Option<f64>,
    /// `None` when a live price is unknown
    pub next_month_prediction: Option<f64>,
}

/// Details of a billing job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingProgress {
    /// Last computed summary; carried over from the previous job while a new one runs
    #[serde(default)]
    pub summary: Option<BillingSummary>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Fixed phases of a deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeployPhase {
    Generation,
    DataRetrieval,
    Initialization,
}

impl DeployPhase {
    pub const ALL: [DeployPhase; 3] = [
        DeployPhase::Generation,
        DeployPhase::DataRetrieval,
        DeployPhase::Initialization,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PhaseState {
    #[default]
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub phase: DeployPhase,
    pub state: PhaseState,
}

/// Checklist reported by a deploy job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployChecklist {
    pub phases: Vec<PhaseEntry>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub public_address: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Default for DeployChecklist {
    fn default() -> Self {
        Self {
            phases: DeployPhase::ALL
                .iter()
                .map(|phase| PhaseEntry {
                    phase: *phase,
                    state: PhaseState::Pending,
                })
                .collect(),
            instance_id: None,
            public_address: None,
            url: None,
            error: None,
        }
    }
}

impl DeployChecklist {
    pub fn mark(&mut self, phase: DeployPhase, state: PhaseState) {
        if let Some(entry) = self.phases.iter_mut().find(|e| e.phase == phase) {
            entry.state = state;
        }
    }

    pub fn state_of(&self, phase: DeployPhase) -> Option<PhaseState> {
        self.phases.iter().find(|e| e.phase == phase).map(|e| e.state)
    }
}

/// Job-kind specific payload of a status row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobDetails {
    Refresh(RefreshProgress),
    Billing(BillingProgress),
    Deploy(DeployChecklist),
}

impl JobDetails {
    /// Job kind this payload belongs to
    pub fn kind(&self) -> JobKind {
        match self {
            JobDetails::Refresh(_) => JobKind::Refresh,
            JobDetails::Billing(_) => JobKind::Billing,
            JobDetails::Deploy(_) => JobKind::Deploy,
        }
    }

    /// Empty payload for a kind
    pub fn empty(kind: JobKind) -> Self {
        match kind {
            JobKind::Refresh => JobDetails::Refresh(RefreshProgress::default()),
            JobKind::Billing => JobDetails::Billing(BillingProgress::default()),
            JobKind::Deploy => JobDetails::Deploy(DeployChecklist::default()),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobDetails::Refresh(p) => p.error.as_deref(),
            JobDetails::Billing(p) => p.error.as_deref(),
            JobDetails::Deploy(p) => p.error.as_deref(),
        }
    }

    /// Record a human-readable failure cause
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = Some(message.into());
        match self {
            JobDetails::Refresh(p) => p.error = message,
            JobDetails::Billing(p) => p.error = message,
            JobDetails::Deploy(p) => p.error = message,
        }
    }
}

/// One status row per (subject, kind)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Identity of this row instance; a newer job for the same key gets a new id
    pub id: Uuid,
    pub subject: String,
    pub kind: JobKind,
    pub state: JobState,
    pub details: JobDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn pending(subject: &str, details: JobDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            subject: subject.to_string(),
            kind: details.kind(),
            state: JobState::Pending,
            details,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == JobState::Pending
    }
}

/// Last successfully completed result for a subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub subject: String,
    pub payload: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_job_kind_strings() {
        assert_eq!(JobKind::Refresh.to_string(), "refresh");
        assert_eq!(JobKind::from_str("deploy").unwrap(), JobKind::Deploy);
        assert!(JobKind::from_str("unknown").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn test_details_are_tagged_by_kind() {
        let details = JobDetails::Refresh(RefreshProgress::new(2));
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["kind"], "refresh");
        assert_eq!(json["regions_total"], 2);

        let back: JobDetails = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), JobKind::Refresh);
    }

    #[test]
    fn test_deploy_checklist_starts_with_three_pending_phases() {
        let mut checklist = DeployChecklist::default();
        assert_eq!(checklist.phases.len(), 3);
        assert!(checklist.phases.iter().all(|p| p.state == PhaseState::Pending));

        checklist.mark(DeployPhase::Generation, PhaseState::Done);
        assert_eq!(checklist.state_of(DeployPhase::Generation), Some(PhaseState::Done));
        assert_eq!(checklist.state_of(DeployPhase::Initialization), Some(PhaseState::Pending));
    }

    #[test]
    fn test_record_error() {
        let mut details = JobDetails::empty(JobKind::Billing);
        assert_eq!(details.error(), None);
        details.record_error("cost explorer unavailable");
        assert_eq!(details.error(), Some("cost explorer unavailable"));
    }
}
