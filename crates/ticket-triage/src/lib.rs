//! Post-build test-failure triage.
//!
//! Inspects the failed tests of one completed build and selectively files
//! tracker tickets for them: newly broken tests (age 1) always, stale ones
//! only when the create-all policy is on.
//!
//! The pass opens exactly one tracker session. A session that cannot be
//! established aborts the pass with zero tickets filed; a single rejected
//! ticket is recorded per item and the pass continues. Ticket filing is
//! best-effort auxiliary reporting; it never gates the build.
//!
//! # Usage
//!
//! ```bash
//! # One pass over a build's results document
//! ticket-triage --config reporter.toml --results build-results.json
//!
//! # Ticket every failure, not just new ones, and dump the records
//! ticket-triage --config reporter.toml --results build-results.json \
//!     --create-all --debug
//! ```

pub mod config;
pub mod engine;
pub mod payload;
pub mod test_results;
pub mod tracker;

pub use config::{normalize_endpoint, ConfigError, ReporterConfig};
pub use engine::{
    TestOutcome, TicketOutcome, TriageEngine, TriagePolicy, TriageReport, Verbosity,
};
pub use payload::{strip_workspace_prefix, TicketPayload};
pub use test_results::{BuildContext, BuildResults, FailedTest, ResultsError, TestStatus};
pub use tracker::rest::RestTracker;
pub use tracker::{
    ConnectionError, Credentials, SubmissionError, TicketId, Tracker, TrackerSession,
};
