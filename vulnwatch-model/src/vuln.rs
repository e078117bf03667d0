//! Vulnerability findings.

use serde::{Deserialize, Serialize};

/// One finding belonging to a scan job. Append-only per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    /// URL the finding was observed on.
    pub url: String,
    /// Free-form risk classification, e.g. `Safe`, `Warning`, `High`.
    /// The server owns the vocabulary; clients map unknown values to the
    /// most severe presentation.
    pub risk: String,
    /// Human-readable explanation of the finding.
    #[serde(default)]
    pub details: String,
}
