use std::fmt;

use serde::{Deserialize, Serialize};
use ::time::{format_description::well_known, OffsetDateTime};

/// Current phase of the scan gate.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    Ready,
    Scanning,
    Success,
    Error,
}

impl ScanStatus {
    /// Short human-readable message for status displays.
    pub fn label(self) -> &'static str {
        match self {
            ScanStatus::Ready => "Ready to scan",
            ScanStatus::Scanning => "Processing QR code...",
            ScanStatus::Success => "Scan succeeded",
            ScanStatus::Error => "Failed to process QR code",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanStatus::Ready => "ready",
            ScanStatus::Scanning => "scanning",
            ScanStatus::Success => "success",
            ScanStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Terminal result of one scan attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Success,
    Error,
}

/// One finished scan attempt as shown in the recent-scans list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanHistoryEntry {
    pub id: u64,
    pub payload: String,
    pub display_name: String,
    pub class_name: String,
    pub nis: Option<String>,
    pub timestamp: String,
    pub outcome: ScanOutcome,
}

/// Body of `POST /api/scan`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub qr: String,
}

/// Success body of `POST /api/scan`. Every field is optional.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReply {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub nis: Option<String>,
}

/// A student as stored by the backend.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Student {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nis: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub qr_code: String,
}

/// Create/update body for `/api/students`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentForm {
    pub name: String,
    pub nis: String,
    pub class: String,
    pub phone: String,
    pub qr_code: String,
}

/// One attendance row from `GET /api/attendances`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceRecord {
    #[serde(rename = "ID", default)]
    pub id: u64,
    #[serde(rename = "StudentID", default)]
    pub student_id: u64,
    #[serde(rename = "Student", default)]
    pub student: Option<Student>,
    #[serde(rename = "ScanTime", default)]
    pub scan_time: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub name: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Login response; stored as-is in the session file.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
