//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{Connection, ErrorCode, Row, params};
use rollcall_api::Zone;
use rollcall_util::{AttendanceTypeId, PersonId, RecordId};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    AttendanceRecord, AuditEvent, RecordedLocation, Store, StoreError, StoreResult,
};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Attendance records, at most one per person/day/type
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                person_id TEXT NOT NULL,
                day TEXT NOT NULL,
                attendance_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                accuracy_m REAL,
                distance_m REAL,
                zone TEXT,
                reason TEXT,
                UNIQUE (person_id, day, attendance_type)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_records_person_day ON records(person_id, day);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn parse_timestamp(raw: &str) -> DateTime<Local> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local))
        .unwrap_or_else(|_| rollcall_util::now())
}

/// Columns as stored, before conversion back into domain types
struct RecordRow {
    id: String,
    person_id: String,
    day: String,
    attendance_type: String,
    timestamp: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy_m: Option<f64>,
    distance_m: Option<f64>,
    zone: Option<String>,
    reason: Option<String>,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            person_id: row.get(1)?,
            day: row.get(2)?,
            attendance_type: row.get(3)?,
            timestamp: row.get(4)?,
            latitude: row.get(5)?,
            longitude: row.get(6)?,
            accuracy_m: row.get(7)?,
            distance_m: row.get(8)?,
            zone: row.get(9)?,
            reason: row.get(10)?,
        })
    }

    fn into_record(self) -> StoreResult<AttendanceRecord> {
        let id = uuid::Uuid::parse_str(&self.id)
            .map(RecordId::from_uuid)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let day = NaiveDate::parse_from_str(&self.day, DAY_FORMAT)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let location = match (self.latitude, self.longitude, self.accuracy_m, self.zone) {
            (Some(latitude), Some(longitude), Some(accuracy_m), Some(zone)) => {
                Some(RecordedLocation {
                    latitude,
                    longitude,
                    accuracy_m,
                    distance_m: self.distance_m,
                    zone: zone.parse::<Zone>().map_err(StoreError::Serialization)?,
                })
            }
            _ => None,
        };

        Ok(AttendanceRecord {
            id,
            person_id: PersonId::new(self.person_id),
            attendance_type: AttendanceTypeId::new(self.attendance_type),
            day,
            timestamp: parse_timestamp(&self.timestamp),
            location,
            reason: self.reason,
        })
    }
}

impl Store for SqliteStore {
    fn exists(
        &self,
        person_id: &PersonId,
        day: NaiveDate,
        attendance_type: &AttendanceTypeId,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let day_str = day.format(DAY_FORMAT).to_string();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE person_id = ? AND day = ? AND attendance_type = ?",
            params![person_id.as_str(), day_str, attendance_type.as_str()],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn append(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let day_str = record.day.format(DAY_FORMAT).to_string();
        let location = record.location.as_ref();

        let result = conn.execute(
            r#"
            INSERT INTO records (
                id, person_id, day, attendance_type, timestamp,
                latitude, longitude, accuracy_m, distance_m, zone, reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.id.to_string(),
                record.person_id.as_str(),
                day_str,
                record.attendance_type.as_str(),
                record.timestamp.to_rfc3339(),
                location.map(|l| l.latitude),
                location.map(|l| l.longitude),
                location.map(|l| l.accuracy_m),
                location.and_then(|l| l.distance_m),
                location.map(|l| l.zone.to_string()),
                record.reason.as_deref(),
            ],
        );

        match result {
            Ok(_) => {
                debug!(
                    record_id = %record.id,
                    person_id = %record.person_id,
                    attendance_type = %record.attendance_type,
                    day = %record.day,
                    "Attendance record appended"
                );
                Ok(())
            }
            Err(e) if is_constraint_violation(&e) => {
                warn!(
                    person_id = %record.person_id,
                    attendance_type = %record.attendance_type,
                    day = %record.day,
                    "Duplicate attendance record refused"
                );
                Err(StoreError::Duplicate {
                    person_id: record.person_id.clone(),
                    attendance_type: record.attendance_type.clone(),
                    day: record.day,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn records_for_day(
        &self,
        person_id: &PersonId,
        day: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let conn = self.conn.lock().unwrap();
        let day_str = day.format(DAY_FORMAT).to_string();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, person_id, day, attendance_type, timestamp,
                   latitude, longitude, accuracy_m, distance_m, zone, reason
            FROM records
            WHERE person_id = ? AND day = ?
            ORDER BY timestamp ASC
            "#,
        )?;

        let rows = stmt.query_map(params![person_id.as_str(), day_str], RecordRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }

        Ok(records)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp: parse_timestamp(&timestamp_str),
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store mutex poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, hour, 0, 0).unwrap()
    }

    fn inside() -> RecordedLocation {
        RecordedLocation {
            latitude: -6.2,
            longitude: 106.8,
            accuracy_m: 12.0,
            distance_m: Some(40.0),
            zone: Zone::Inside,
        }
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::LocationRefreshed))
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].event, AuditEventType::LocationRefreshed));
        assert!(events[0].id > events[1].id);
    }

    #[test]
    fn test_record_roundtrip_keeps_location_and_reason() {
        let store = SqliteStore::in_memory().unwrap();
        let person = PersonId::new("ana");

        let check_in = AttendanceRecord::new(person.clone(), "check_in".into(), at(8))
            .with_location(inside());
        let leave =
            AttendanceRecord::new(person.clone(), "leave".into(), at(9)).with_reason("dentist");

        store.append(&check_in).unwrap();
        store.append(&leave).unwrap();

        let records = store.records_for_day(&person, check_in.day).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, check_in.id);
        assert_eq!(records[0].location, Some(inside()));
        assert_eq!(records[0].reason, None);
        assert_eq!(records[1].location, None);
        assert_eq!(records[1].reason.as_deref(), Some("dentist"));
    }

    #[test]
    fn test_same_day_duplicate_is_refused() {
        let store = SqliteStore::in_memory().unwrap();
        let person = PersonId::new("ana");
        let kind = AttendanceTypeId::new("check_in");
        let day = at(8).date_naive();

        assert!(!store.exists(&person, day, &kind).unwrap());
        store
            .append(&AttendanceRecord::new(person.clone(), kind.clone(), at(8)))
            .unwrap();
        assert!(store.exists(&person, day, &kind).unwrap());

        let again = store.append(&AttendanceRecord::new(person.clone(), kind.clone(), at(17)));
        assert!(matches!(again, Err(StoreError::Duplicate { .. })));
        assert_eq!(store.records_for_day(&person, day).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicates_are_scoped_to_person_day_and_type() {
        let store = SqliteStore::in_memory().unwrap();
        let ana = PersonId::new("ana");
        let budi = PersonId::new("budi");

        store
            .append(&AttendanceRecord::new(ana.clone(), "check_in".into(), at(8)))
            .unwrap();
        store
            .append(&AttendanceRecord::new(ana.clone(), "check_out".into(), at(17)))
            .unwrap();
        store
            .append(&AttendanceRecord::new(budi.clone(), "check_in".into(), at(8)))
            .unwrap();

        let next_day = Local.with_ymd_and_hms(2025, 3, 15, 8, 0, 0).unwrap();
        store
            .append(&AttendanceRecord::new(ana.clone(), "check_in".into(), next_day))
            .unwrap();

        assert_eq!(store.records_for_day(&ana, at(8).date_naive()).unwrap().len(), 2);
        assert_eq!(store.records_for_day(&budi, at(8).date_naive()).unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.db");
        let person = PersonId::new("ana");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .append(&AttendanceRecord::new(person.clone(), "check_in".into(), at(8)))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(
            store
                .exists(&person, at(8).date_naive(), &"check_in".into())
                .unwrap()
        );
    }
}
