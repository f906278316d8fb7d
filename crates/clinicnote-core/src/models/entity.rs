//! Entity types synchronized by the engine

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four record kinds managed by the client.
///
/// Each maps to one collection in the local store and one resource on
/// the remote authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Clinic,
    Appointment,
    Memo,
    DoctorMemo,
}

impl EntityType {
    /// All entity types, in the order reconciliation visits them.
    pub const ALL: [Self; 4] = [Self::Clinic, Self::Appointment, Self::Memo, Self::DoctorMemo];

    /// Stable name used as the collection discriminator in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clinic => "clinic",
            Self::Appointment => "appointment",
            Self::Memo => "memo",
            Self::DoctorMemo => "doctor_memo",
        }
    }

    /// Resource path on the remote authority.
    #[must_use]
    pub const fn api_path(self) -> &'static str {
        match self {
            Self::Clinic => "/api/clinics",
            Self::Appointment => "/api/appointments",
            Self::Memo => "/api/appointments/memos",
            Self::DoctorMemo => "/api/appointments/doctor-memos",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clinic" => Ok(Self::Clinic),
            "appointment" => Ok(Self::Appointment),
            "memo" => Ok(Self::Memo),
            "doctor_memo" => Ok(Self::DoctorMemo),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown entity type: {other}"
            ))),
        }
    }
}
