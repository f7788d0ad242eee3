//! Ticket content assembly.
//!
//! Summary and description are built deterministically from test metadata,
//! so re-running a pass over the same build produces identical tickets. No
//! length limit or field escaping is applied; a tracker that enforces one
//! rejects the submission and the rejection is recorded per item.

use crate::test_results::{BuildContext, FailedTest};
use serde::{Deserialize, Serialize};

/// Content of one ticket to be filed, tracker-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPayload {
    pub project_key: String,
    pub summary: String,
    pub description: String,
}

impl TicketPayload {
    /// Assemble the ticket for one failed test.
    ///
    /// The description carries the build reference URL and the stack trace
    /// with the workspace root stripped, so tickets show relative paths.
    pub fn for_failure(project_key: &str, build: &BuildContext, failure: &FailedTest) -> Self {
        let summary = format!(
            "The test {} failed {}: {}",
            failure.name, failure.class_name, failure.error_details
        );
        let description = format!(
            "Build {}\r\n Test class: {} -- {}",
            build.build_url(),
            failure.class_name,
            strip_workspace_prefix(&failure.error_stack_trace, &build.workspace_root)
        );
        Self {
            project_key: project_key.to_string(),
            summary,
            description,
        }
    }
}

/// Remove every occurrence of the workspace root from a stack trace.
///
/// An empty root leaves the trace untouched (`str::replace` with an empty
/// pattern would mangle it), as does a root that never appears.
pub fn strip_workspace_prefix(trace: &str, workspace_root: &str) -> String {
    if workspace_root.is_empty() {
        return trace.to_string();
    }
    trace.replace(workspace_root, "")
}
