//! Notification dispatcher contract

use async_trait::async_trait;
use chrono::{DateTime, Local};
use rollcall_util::{AttendanceTypeId, PersonId};
use thiserror::Error;
use tracing::info;

/// Notification sent after an attendance record is stored
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceNotification {
    pub person_id: PersonId,
    pub attendance_type: AttendanceTypeId,
    pub timestamp: DateTime<Local>,
    pub distance_m: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification channel unavailable")]
    Unavailable,
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Delivers attendance notifications (chat, email, ...).
///
/// Called fire-and-forget after a record is stored; failures are logged
/// and never affect the submission.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: AttendanceNotification) -> NotifyResult<()>;
}

/// Notifier that only writes a log line
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: AttendanceNotification) -> NotifyResult<()> {
        info!(
            person_id = %n.person_id,
            attendance_type = %n.attendance_type,
            timestamp = %rollcall_util::format_datetime_full(&n.timestamp),
            distance_m = n.distance_m,
            accuracy_m = n.accuracy_m,
            reason = n.reason.as_deref(),
            "Attendance notification"
        );
        Ok(())
    }
}
