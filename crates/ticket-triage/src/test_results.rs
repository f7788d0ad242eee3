//! Host-supplied build and test-result records.
//!
//! The CI host hands the triage pass a snapshot of one completed build:
//! identity metadata plus the failed test cases. Everything here is read-only
//! input; the pass never mutates build state.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Outcome state of a failed test case as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Test was already failing before this build.
    Failed,
    /// Test passed previously and broke in this build.
    Regression,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed => write!(f, "FAILED"),
            Self::Regression => write!(f, "REGRESSION"),
        }
    }
}

/// One failed test case from the build's result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTest {
    pub name: String,
    pub class_name: String,
    pub package_name: String,
    pub full_name: String,
    /// Short diagnostic text (assertion message, exception summary).
    #[serde(default)]
    pub error_details: String,
    /// Full stack trace; may embed absolute workspace paths.
    #[serde(default)]
    pub error_stack_trace: String,
    /// Consecutive builds this test has failed in; 1 = newly broken.
    pub age: u32,
    pub status: TestStatus,
}

impl FailedTest {
    /// Whether this failure first appeared in the current build.
    pub fn is_new(&self) -> bool {
        self.age == 1
    }
}

/// Identity of the build whose failures are being triaged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildContext {
    /// Overall build result as reported by the host (e.g. "UNSTABLE").
    pub result_status: String,
    /// Root URL of the CI host, trailing slash included.
    pub host_root_url: String,
    /// Path of this build below the host root (e.g. "job/app/42/").
    pub build_url_path: String,
    /// Absolute workspace path. Used only for text substitution in stack
    /// traces, never for filesystem access.
    pub workspace_root: String,
}

impl BuildContext {
    /// Full browsable URL of the build.
    pub fn build_url(&self) -> String {
        format!("{}{}", self.host_root_url, self.build_url_path)
    }
}

/// The document the host hands over: one build plus its failed tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResults {
    pub build: BuildContext,
    pub failed_tests: Vec<FailedTest>,
}

/// Errors raised while loading the host's results document.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("failed to read results file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse results JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid results document: {0}")]
    Invalid(String),
}

impl BuildResults {
    /// Load and validate a results document from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ResultsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ResultsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let results: Self = serde_json::from_str(&raw)?;
        results.validate()?;
        Ok(results)
    }

    /// Boundary checks on host-supplied data. A failed test failed at least
    /// in the current build, so `age == 0` marks a malformed document.
    pub fn validate(&self) -> Result<(), ResultsError> {
        if self.build.host_root_url.is_empty() {
            return Err(ResultsError::Invalid(
                "build.host_root_url must not be empty".to_string(),
            ));
        }
        if let Some(test) = self.failed_tests.iter().find(|t| t.age == 0) {
            return Err(ResultsError::Invalid(format!(
                "test {} has age 0",
                test.full_name
            )));
        }
        Ok(())
    }
}
