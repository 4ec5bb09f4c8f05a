use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::PersistenceError;
use crate::measurement::HeartRateSample;

pub const HEADER: [&str; 2] = ["time", "rate"];

/// Append-only destination for accepted samples.
///
/// `write` must not return before the record is durable. `close` is
/// idempotent.
pub trait SampleSink {
    /// Acquire the underlying resource for a session started at `started_at`.
    fn open(&mut self, started_at: DateTime<Local>) -> Result<(), PersistenceError>;

    fn write(&mut self, sample: &HeartRateSample) -> Result<(), PersistenceError>;

    fn close(&mut self);

    /// Where the records go, if the sink is backed by a file.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// File name of the CSV file for a session started at `started_at`.
pub fn file_name(started_at: DateTime<Local>) -> String {
    format!("heart_rate_{}.csv", started_at.format("%Y%m%d_%H%M%S"))
}

/// Writes one `time,rate` CSV file per session.
pub struct CsvSink {
    directory: PathBuf,
    path: Option<PathBuf>,
    writer: Option<csv::Writer<File>>,
}

impl CsvSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            path: None,
            writer: None,
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl SampleSink for CsvSink {
    fn open(&mut self, started_at: DateTime<Local>) -> Result<(), PersistenceError> {
        self.close();
        self.path = None;

        if !self.directory.exists() {
            fs::create_dir_all(&self.directory).map_err(|source| PersistenceError::Open {
                path: self.directory.clone(),
                source,
            })?;
        }

        let path = self.directory.join(file_name(started_at));
        let file = File::create(&path).map_err(|source| PersistenceError::Open {
            path: path.clone(),
            source,
        })?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush()?;

        log::info!("Saving heart rate data to {}", path.display());

        self.writer = Some(writer);
        self.path = Some(path);
        Ok(())
    }

    fn write(&mut self, sample: &HeartRateSample) -> Result<(), PersistenceError> {
        let writer = self.writer.as_mut().ok_or(PersistenceError::NotOpen)?;

        let time = Local::now().format("%H:%M:%S").to_string();
        writer.write_record([time, sample.heart_rate.to_string()])?;
        writer.flush()?;
        writer.get_ref().sync_data()?;

        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                log::warn!("Failed to flush heart rate data: {}", e);
            }
            if let Some(path) = self.path.as_ref() {
                log::info!("Heart rate data saved to {}", path.display());
            }
        }
    }

    fn location(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::SensorContact;
    use chrono::TimeZone;

    fn sample(heart_rate: u16) -> HeartRateSample {
        HeartRateSample {
            heart_rate,
            sensor_contact: SensorContact::Detected,
            raw_flags: 0x06,
            captured_at: Local::now(),
        }
    }

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap()
    }

    #[test]
    fn file_name_uses_session_start() {
        assert_eq!(file_name(start()), "heart_rate_20240309_070502.csv");
    }

    #[test]
    fn writes_header_then_one_row_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path());

        sink.open(start()).unwrap();
        let path = sink.location().unwrap().to_path_buf();
        assert_eq!(path, dir.path().join("heart_rate_20240309_070502.csv"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "time,rate\n");

        sink.write(&sample(72)).unwrap();
        sink.write(&sample(336)).unwrap();

        // durable before close
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "time,rate");

        let (time, rate) = lines[2].split_once(',').unwrap();
        assert_eq!(rate, "336");
        assert_eq!(time.len(), 8);
        assert!(chrono::NaiveTime::parse_from_str(time, "%H:%M:%S").is_ok());

        sink.close();
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path());
        sink.close();

        sink.open(start()).unwrap();
        assert!(sink.is_open());
        sink.close();
        sink.close();
        assert!(!sink.is_open());
    }

    #[test]
    fn write_requires_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path());
        assert!(matches!(sink.write(&sample(60)), Err(PersistenceError::NotOpen)));
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path().join("sessions"));
        sink.open(start()).unwrap();
        assert!(dir.path().join("sessions").is_dir());
    }

    #[test]
    fn open_fails_when_directory_is_a_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut sink = CsvSink::new(file.path());
        assert!(matches!(
            sink.open(start()),
            Err(PersistenceError::Open { .. })
        ));
        assert!(!sink.is_open());
        assert_eq!(sink.location(), None);
    }

    #[test]
    fn failed_reopen_forgets_the_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = dir.path().join("sessions");
        let mut sink = CsvSink::new(&sessions);

        sink.open(start()).unwrap();
        sink.close();
        // the finished file stays reported until the next open
        assert!(sink.location().is_some());

        fs::remove_dir_all(&sessions).unwrap();
        fs::write(&sessions, b"").unwrap();

        assert!(sink.open(start()).is_err());
        assert!(!sink.is_open());
        assert_eq!(sink.location(), None);
    }
}
