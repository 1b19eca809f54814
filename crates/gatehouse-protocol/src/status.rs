//! Status messages published by the bus devices.
//!
//! ```text
//! {"Mode":"register_fp","Status":"progress change mode to register fp"}
//! {"Mode":"register_fp","Status":"enrolling"}
//! {"Mode":"register_fp","Status":"success","Data":{"uid":12,"fid":3,"size":1024}}
//! ```
//!
//! There is no enforced transition order; any status may follow any other.
//! Only the classification of a single message matters to the correlator.

use gatehouse_core::constants::STATUS_UID_NOT_FOUND;
use gatehouse_core::{BusVerb, Error, OperationResult, Result, Uid};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Statuses that end an operation with a failure, besides the generic
/// `failed...`/`error...` prefixes.
const KNOWN_FAILURES: [&str; 2] = [
    STATUS_UID_NOT_FOUND,
    "failed card not register in selected user",
];

/// Classification of a status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Device switched mode and is preparing.
    Progress,
    /// Device waits for physical input (finger on the sensor).
    Enrolling,
    /// Terminal success.
    Success,
    /// Terminal failure.
    Failure,
}

impl StatusKind {
    /// Classify a raw status string.
    pub fn classify(status: &str) -> Self {
        let status = status.trim().to_ascii_lowercase();
        if status == "success" {
            StatusKind::Success
        } else if status == "enrolling" {
            StatusKind::Enrolling
        } else if KNOWN_FAILURES.contains(&status.as_str())
            || status.starts_with("failed")
            || status.starts_with("error")
        {
            StatusKind::Failure
        } else {
            StatusKind::Progress
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusKind::Success | StatusKind::Failure)
    }
}

/// One message from a device status topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(rename = "Mode", alias = "mode")]
    pub mode: String,
    #[serde(rename = "Status", alias = "status")]
    pub status: String,
    #[serde(
        rename = "Data",
        alias = "data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
}

impl StatusMessage {
    /// Parse a raw payload.
    ///
    /// # Errors
    /// Returns `Error::InvalidStatus` if the payload is not a JSON object with
    /// string `Mode` and `Status` fields.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| Error::InvalidStatus(e.to_string()))
    }

    #[must_use]
    pub fn kind(&self) -> StatusKind {
        StatusKind::classify(&self.status)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Verb named by `Mode`, if it is one the gateway issues.
    pub fn verb(&self) -> Option<BusVerb> {
        self.mode.trim().parse().ok()
    }

    /// Identity carried in `Data`, under `uid` or `UID`.
    pub fn uid(&self) -> Option<Uid> {
        let data = self.data.as_ref()?;
        data.get("uid")
            .or_else(|| data.get("UID"))
            .and_then(Uid::from_json)
    }

    /// String field of `Data`, accepting numbers as well.
    pub fn data_text(&self, key: &str) -> Option<String> {
        match self.data.as_ref()?.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Map a terminal message onto the uniform result shape.
    ///
    /// The status text becomes the message on success and the error on
    /// failure; `Data` is carried through either way.
    pub fn to_result(&self) -> OperationResult {
        let result = match self.kind() {
            StatusKind::Failure => OperationResult::failure(self.status.clone()),
            _ => OperationResult::with_message(self.status.clone()),
        };
        match &self.data {
            Some(data) => result.data(data.clone()),
            None => result,
        }
    }
}
