//! Append-only per-patient timing accumulator.
//!
//! Shared across all workers behind a mutex; the critical section is a
//! single vector push. Rows can be exported as CSV after the run.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// One worker's timing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingRow {
    pub row: usize,
    pub patient_index: usize,
    pub patient_key: String,
    pub admissions: usize,
    pub elapsed_ms: u128,
}

/// Thread-safe timing log, one row per converted patient.
#[derive(Debug, Default)]
pub struct TimingLog {
    rows: Mutex<Vec<TimingRow>>,
}

impl TimingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &self,
        patient_index: usize,
        patient_key: impl Into<String>,
        admissions: usize,
        elapsed: Duration,
    ) {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let row = rows.len() + 1;
        rows.push(TimingRow {
            row,
            patient_index,
            patient_key: patient_key.into(),
            admissions,
            elapsed_ms: elapsed.as_millis(),
        });
    }

    pub fn snapshot(&self) -> Vec<TimingRow> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Writes all rows as CSV, matching the
    /// `row_id,job_id,subject_id,number_admissions,time_milliseconds` layout.
    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        let rows = self.snapshot();
        let mut file = std::fs::File::create(path)?;
        writeln!(
            file,
            "row_id,job_id,subject_id,number_admissions,time_milliseconds"
        )?;
        for r in rows {
            writeln!(
                file,
                "{},{},{},{},{}",
                r.row,
                r.patient_index + 1,
                r.patient_key,
                r.admissions,
                r.elapsed_ms
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_numbered_in_arrival_order() {
        let log = TimingLog::new();
        log.add(3, "p-3", 2, Duration::from_millis(120));
        log.add(0, "p-0", 1, Duration::from_millis(40));

        let rows = log.snapshot();
        assert_eq!(rows[0].row, 1);
        assert_eq!(rows[0].patient_index, 3);
        assert_eq!(rows[1].row, 2);
        assert_eq!(rows[1].patient_key, "p-0");
    }

    #[test]
    fn test_survives_poisoned_lock() {
        let log = std::sync::Arc::new(TimingLog::new());
        log.add(0, "p-0", 1, Duration::from_millis(5));

        // A worker panicking mid-push poisons the mutex.
        let poisoner = std::sync::Arc::clone(&log);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.rows.lock().unwrap();
            panic!("worker died");
        })
        .join();

        log.add(1, "p-1", 1, Duration::from_millis(6));
        let rows = log.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].patient_key, "p-1");
    }

    #[test]
    fn test_csv_layout() {
        let log = TimingLog::new();
        log.add(0, "10000032", 2, Duration::from_millis(57));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timings.csv");
        log.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("row_id,job_id,subject_id,number_admissions,time_milliseconds")
        );
        assert_eq!(lines.next(), Some("1,1,10000032,2,57"));
    }
}
