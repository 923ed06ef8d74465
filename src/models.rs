use std::fmt;
use std::str::FromStr;

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::schedule::WeeklySchedule;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    /// Wall-clock zone of the clinic; every slot is expressed in it.
    pub clinic_zone: FixedOffset,
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

/* -------------------------
   Domain enums
--------------------------*/

/// Stored as lowercase text in `appointment.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Cancelled appointments release their slot.
    pub fn blocks_slot(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    /// scheduled -> completed | cancelled; the other two are final.
    pub fn can_become(self, next: AppointmentStatus) -> bool {
        self == next
            || matches!(
                (self, next),
                (AppointmentStatus::Scheduled, AppointmentStatus::Completed)
                    | (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
            )
    }
}

impl FromStr for AppointmentStatus {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(ScheduleError::validation(format!(
                "invalid appointment status: {other}"
            ))),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DoctorRow {
    pub doctor_id: i64,
    pub name: String,
    pub crm: String,
    pub specialty_id: i64,
    pub phone: String,
    pub email: String,
    pub work_days: String,
    pub work_start: Option<NaiveTime>,
    pub work_end: Option<NaiveTime>,
}

impl DoctorRow {
    pub fn schedule(&self) -> Result<WeeklySchedule, ScheduleError> {
        WeeklySchedule::from_storage(&self.work_days, self.work_start, self.work_end)
    }
}

pub const DOCTOR_COLUMNS: &str =
    "doctor_id, name, crm, specialty_id, phone, email, work_days, work_start, work_end";
