use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Only return log lines with a sequence number greater than this.
    pub since: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StopResult {
    pub stopped: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResult {
    pub status: &'static str,
    pub version: &'static str,
}
