//! The triage pass: decide which failures warrant tickets and file them.
//!
//! One pass covers one build. Exactly one tracker session is opened before
//! the loop; failure to open it aborts the pass with zero tickets filed,
//! while a failed submission is recorded per item and the loop continues.

use crate::payload::{strip_workspace_prefix, TicketPayload};
use crate::test_results::{BuildContext, FailedTest};
use crate::tracker::{ConnectionError, TicketId, Tracker};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

/// Logging depth for the per-record diagnostic dump.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Silent,
    Debug,
    VerboseDebug,
}

impl Verbosity {
    /// Verbose implies debug.
    pub fn from_flags(debug: bool, verbose_debug: bool) -> Self {
        if verbose_debug {
            Self::VerboseDebug
        } else if debug {
            Self::Debug
        } else {
            Self::Silent
        }
    }

    pub fn debug_enabled(self) -> bool {
        self >= Self::Debug
    }

    pub fn verbose_enabled(self) -> bool {
        self == Self::VerboseDebug
    }
}

/// Immutable per-pass policy: which failures get tickets and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriagePolicy {
    /// Target tracker project.
    pub project_key: String,
    /// Ticket every failure regardless of age.
    pub create_all: bool,
    pub verbosity: Verbosity,
}

/// Per-failure result of the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketOutcome {
    /// A ticket was filed and acknowledged by the tracker.
    Created { id: TicketId },
    /// Failure older than this build and create-all is off. A policy
    /// decision, not an error.
    SkippedStale,
    /// The tracker refused the ticket or the submission did not complete.
    Failed { reason: String },
}

/// Outcome for one input record. The report holds one per failure, in
/// input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Full name of the failed test this outcome belongs to.
    pub test: String,
    pub outcome: TicketOutcome,
}

/// Result of one triage pass over one build's failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageReport {
    pub outcomes: Vec<TestOutcome>,
    pub timestamp: String,
}

impl TriageReport {
    pub fn created_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, TicketOutcome::Created { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == TicketOutcome::SkippedStale)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, TicketOutcome::Failed { .. }))
            .count()
    }

    /// Compact one-line summary for the build log.
    pub fn summary(&self) -> String {
        format!(
            "{} failures examined | {} created | {} stale | {} failed",
            self.outcomes.len(),
            self.created_count(),
            self.skipped_count(),
            self.failed_count()
        )
    }
}

/// Drives one pass: opens a session, applies the inclusion policy, files
/// tickets, and collects outcomes.
pub struct TriageEngine {
    policy: TriagePolicy,
}

impl TriageEngine {
    pub fn new(policy: TriagePolicy) -> Self {
        Self { policy }
    }

    /// Run one pass over `failures` in input order.
    ///
    /// An empty list is vacuously successful. The session is the only
    /// resource the pass owns; it is released before returning.
    pub async fn run(
        &self,
        tracker: &dyn Tracker,
        build: &BuildContext,
        failures: &[FailedTest],
    ) -> Result<TriageReport, ConnectionError> {
        info!(count = failures.len(), build = %build.build_url(), "Examining test results");
        debug!(result = %build.result_status, workspace = %build.workspace_root, "Build context");

        if self.policy.verbosity.debug_enabled() {
            self.dump_failures(build, failures);
        }

        let session = match tracker.open().await {
            Ok(session) => session,
            Err(e) => {
                error!("Could not open tracker session: {e}");
                return Err(e);
            }
        };

        let mut outcomes = Vec::with_capacity(failures.len());
        for failure in failures {
            let outcome = if self.policy.create_all || failure.is_new() {
                let payload = TicketPayload::for_failure(&self.policy.project_key, build, failure);
                debug!(project = %self.policy.project_key, test = %failure.full_name, "Creating issue");
                match session.submit(&payload).await {
                    Ok(id) => {
                        info!(id = %id, test = %failure.full_name, "Issue created");
                        TicketOutcome::Created { id }
                    }
                    Err(e) => {
                        warn!(test = %failure.full_name, "Issue creation failed: {e}");
                        TicketOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            } else {
                info!(test = %failure.full_name, age = failure.age, "This issue is old; not reporting");
                TicketOutcome::SkippedStale
            };
            outcomes.push(TestOutcome {
                test: failure.full_name.clone(),
                outcome,
            });
        }

        session.close().await;

        Ok(TriageReport {
            outcomes,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Log every record's raw fields before any submission decision is made.
    /// Side effects are confined to the log sink.
    fn dump_failures(&self, build: &BuildContext, failures: &[FailedTest]) {
        for failure in failures {
            debug!(
                project = %self.policy.project_key,
                name = %failure.name,
                class = %failure.class_name,
                package = %failure.package_name,
                full_name = %failure.full_name,
                age = failure.age,
                status = %failure.status,
                details = %failure.error_details,
                "failed test"
            );
            debug!(test = %failure.full_name, trace = %failure.error_stack_trace, "stack trace (raw)");
            debug!(
                test = %failure.full_name,
                trace = %strip_workspace_prefix(&failure.error_stack_trace, &build.workspace_root),
                "stack trace (workspace stripped)"
            );
            if self.policy.verbosity.verbose_enabled() {
                match serde_json::to_string(failure) {
                    Ok(record) => trace!(record = %record, "failed test (full record)"),
                    Err(e) => trace!("could not serialize record: {e}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_results::TestStatus;
    use crate::tracker::{SubmissionError, TrackerSession};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted tracker: optionally fails open, pops one scripted result per
    /// submit (default: acknowledge), and records every payload it saw.
    struct ScriptedTracker {
        fail_open: bool,
        script: Arc<Mutex<Vec<Result<TicketId, SubmissionError>>>>,
        submitted: Arc<Mutex<Vec<TicketPayload>>>,
        closed: Arc<AtomicUsize>,
    }

    impl ScriptedTracker {
        fn acknowledging() -> Self {
            Self {
                fail_open: false,
                script: Arc::new(Mutex::new(Vec::new())),
                submitted: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn refusing_to_open() -> Self {
            Self {
                fail_open: true,
                ..Self::acknowledging()
            }
        }

        fn with_script(script: Vec<Result<TicketId, SubmissionError>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script)),
                ..Self::acknowledging()
            }
        }

        fn submitted(&self) -> Vec<TicketPayload> {
            self.submitted.lock().unwrap().clone()
        }
    }

    struct ScriptedSession {
        script: Arc<Mutex<Vec<Result<TicketId, SubmissionError>>>>,
        submitted: Arc<Mutex<Vec<TicketPayload>>>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tracker for ScriptedTracker {
        async fn open(&self) -> Result<Box<dyn TrackerSession>, ConnectionError> {
            if self.fail_open {
                return Err(ConnectionError::Network("connection refused".to_string()));
            }
            Ok(Box::new(ScriptedSession {
                script: Arc::clone(&self.script),
                submitted: Arc::clone(&self.submitted),
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    #[async_trait]
    impl TrackerSession for ScriptedSession {
        async fn submit(&self, ticket: &TicketPayload) -> Result<TicketId, SubmissionError> {
            let count = {
                let mut submitted = self.submitted.lock().unwrap();
                submitted.push(ticket.clone());
                submitted.len()
            };
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(TicketId(format!("TT-{count}")))
            } else {
                script.remove(0)
            }
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn build_context() -> BuildContext {
        BuildContext {
            result_status: "UNSTABLE".to_string(),
            host_root_url: "https://ci.example.com/".to_string(),
            build_url_path: "job/app/42/".to_string(),
            workspace_root: "/ws".to_string(),
        }
    }

    fn failure(name: &str, age: u32) -> FailedTest {
        FailedTest {
            name: name.to_string(),
            class_name: "Foo".to_string(),
            package_name: "com.example".to_string(),
            full_name: format!("com.example.Foo.{name}"),
            error_details: "NPE".to_string(),
            error_stack_trace: "/ws/Foo.java:10".to_string(),
            age,
            status: TestStatus::Failed,
        }
    }

    fn policy(create_all: bool) -> TriagePolicy {
        TriagePolicy {
            project_key: "PLAT".to_string(),
            create_all,
            verbosity: Verbosity::Silent,
        }
    }

    #[tokio::test]
    async fn test_one_outcome_per_failure_in_input_order() {
        let tracker = ScriptedTracker::acknowledging();
        let failures = vec![failure("testA", 1), failure("testB", 3), failure("testC", 1)];
        let engine = TriageEngine::new(policy(true));

        let report = engine.run(&tracker, &build_context(), &failures).await.unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcomes[0].test, "com.example.Foo.testA");
        assert_eq!(report.outcomes[1].test, "com.example.Foo.testB");
        assert_eq!(report.outcomes[2].test, "com.example.Foo.testC");
        assert_eq!(report.created_count(), 3);
    }

    #[tokio::test]
    async fn test_new_failure_ticketed_without_create_all() {
        let tracker = ScriptedTracker::acknowledging();
        let failures = vec![failure("testA", 1)];
        let engine = TriageEngine::new(policy(false));

        let report = engine.run(&tracker, &build_context(), &failures).await.unwrap();

        assert!(matches!(
            report.outcomes[0].outcome,
            TicketOutcome::Created { .. }
        ));
        let submitted = tracker.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].description.contains("Foo.java:10"));
        assert!(!submitted[0].description.contains("/ws"));
    }

    #[tokio::test]
    async fn test_stale_failure_skipped_without_tracker_call() {
        let tracker = ScriptedTracker::acknowledging();
        let failures = vec![failure("testA", 3)];
        let engine = TriageEngine::new(policy(false));

        let report = engine.run(&tracker, &build_context(), &failures).await.unwrap();

        assert_eq!(report.outcomes[0].outcome, TicketOutcome::SkippedStale);
        assert!(tracker.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_stale_failure_ticketed_with_create_all() {
        let tracker = ScriptedTracker::acknowledging();
        let failures = vec![failure("testA", 7)];
        let engine = TriageEngine::new(policy(true));

        let report = engine.run(&tracker, &build_context(), &failures).await.unwrap();

        assert!(matches!(
            report.outcomes[0].outcome,
            TicketOutcome::Created { .. }
        ));
        assert_eq!(tracker.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_aborts_with_no_submissions() {
        let tracker = ScriptedTracker::refusing_to_open();
        let failures = vec![failure("testA", 1), failure("testB", 1)];
        let engine = TriageEngine::new(policy(false));

        let err = engine
            .run(&tracker, &build_context(), &failures)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectionError::Network(_)));
        assert!(tracker.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_failed_submission_does_not_stop_the_pass() {
        let tracker = ScriptedTracker::with_script(vec![
            Err(SubmissionError::Http("timed out".to_string())),
            Ok(TicketId("PLAT-2".to_string())),
        ]);
        let failures = vec![failure("testA", 1), failure("testB", 1)];
        let engine = TriageEngine::new(policy(false));

        let report = engine.run(&tracker, &build_context(), &failures).await.unwrap();

        assert!(matches!(
            report.outcomes[0].outcome,
            TicketOutcome::Failed { .. }
        ));
        assert_eq!(
            report.outcomes[1].outcome,
            TicketOutcome::Created {
                id: TicketId("PLAT-2".to_string())
            }
        );
        assert_eq!(tracker.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_failure_list_is_vacuously_successful() {
        let tracker = ScriptedTracker::acknowledging();
        let engine = TriageEngine::new(policy(false));

        let report = engine.run(&tracker, &build_context(), &[]).await.unwrap();

        assert!(report.outcomes.is_empty());
        assert_eq!(report.summary(), "0 failures examined | 0 created | 0 stale | 0 failed");
    }

    #[tokio::test]
    async fn test_session_closed_after_the_pass() {
        let tracker = ScriptedTracker::acknowledging();
        let engine = TriageEngine::new(policy(false));

        engine
            .run(&tracker, &build_context(), &[failure("testA", 1)])
            .await
            .unwrap();

        assert_eq!(tracker.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_report_counts_mixed_outcomes() {
        let tracker = ScriptedTracker::with_script(vec![
            Ok(TicketId("PLAT-1".to_string())),
            Err(SubmissionError::Rejected {
                status: 400,
                body: "bad field".to_string(),
            }),
        ]);
        let failures = vec![failure("testA", 1), failure("testB", 1), failure("testC", 4)];
        let engine = TriageEngine::new(policy(false));

        let report = engine.run(&tracker, &build_context(), &failures).await.unwrap();

        assert_eq!(report.created_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(
            report.summary(),
            "3 failures examined | 1 created | 1 stale | 1 failed"
        );
    }

    #[tokio::test]
    async fn test_debug_dump_does_not_affect_outcomes() {
        let tracker = ScriptedTracker::acknowledging();
        let mut verbose = policy(false);
        verbose.verbosity = Verbosity::VerboseDebug;
        let engine = TriageEngine::new(verbose);

        let report = engine
            .run(&tracker, &build_context(), &[failure("testA", 1)])
            .await
            .unwrap();

        assert_eq!(report.created_count(), 1);
        assert_eq!(tracker.submitted().len(), 1);
    }

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Silent);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::VerboseDebug);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::VerboseDebug);
    }

    #[test]
    fn test_verbose_implies_debug() {
        assert!(Verbosity::VerboseDebug.debug_enabled());
        assert!(Verbosity::Debug.debug_enabled());
        assert!(!Verbosity::Silent.debug_enabled());
        assert!(!Verbosity::Debug.verbose_enabled());
    }

    #[test]
    fn test_outcome_serialization_round_trip() {
        let report = TriageReport {
            outcomes: vec![
                TestOutcome {
                    test: "com.example.Foo.testA".to_string(),
                    outcome: TicketOutcome::Created {
                        id: TicketId("PLAT-1".to_string()),
                    },
                },
                TestOutcome {
                    test: "com.example.Foo.testB".to_string(),
                    outcome: TicketOutcome::SkippedStale,
                },
            ],
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };

        let json = serde_json::to_string(&report).unwrap();
        let restored: TriageReport = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.outcomes.len(), 2);
        assert_eq!(restored.created_count(), 1);
        assert_eq!(restored.skipped_count(), 1);
    }
}
