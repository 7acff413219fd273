use crate::error::LogError;
use crate::placer::TargetPlacer;
use chrono::{DateTime, Local};
use fitts_input::RawPointerState;
use serde::{Serialize, Serializer};
use std::fs;
use std::path::{Path, PathBuf};

/// One CSV row, written for every frame of an active phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub trial_number: usize,
    #[serde(rename = "time(ms)")]
    pub time_ms: u64,
    pub mouse_x: i32,
    pub mouse_y: i32,
    pub target_x: i32,
    pub target_y: i32,
    pub target_size: u32,
    pub former_target_x: i32,
    pub former_target_y: i32,
    pub former_target_size: u32,
    pub distance_center: f64,
    pub distance_edge: f64,
    pub time_since_target: u64,
    pub time_since_edge: i64,
    #[serde(serialize_with = "as_flag")]
    pub clicked: bool,
    #[serde(serialize_with = "as_flag")]
    pub hit: bool,
    pub overshoot_count: u32,
    #[serde(rename = "raw_dx")]
    pub raw_dx: f64,
    #[serde(rename = "raw_dy")]
    pub raw_dy: f64,
    #[serde(rename = "raw_buttons")]
    pub raw_buttons: u32,
}

impl LogRecord {
    pub const HEADER: [&'static str; 20] = [
        "trialNumber",
        "time(ms)",
        "mouseX",
        "mouseY",
        "targetX",
        "targetY",
        "targetSize",
        "formerTargetX",
        "formerTargetY",
        "formerTargetSize",
        "distanceCenter",
        "distanceEdge",
        "timeSinceTarget",
        "timeSinceEdge",
        "clicked",
        "hit",
        "overshootCount",
        "raw_dx",
        "raw_dy",
        "raw_buttons",
    ];
}

fn as_flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

/// Destination of a session's records.
pub trait LogSink {
    /// Writes the complete record set, replacing anything written before.
    fn write_records(&mut self, records: &[LogRecord]) -> Result<(), LogError>;

    /// Human-readable location for status messages.
    fn describe(&self) -> String;
}

/// `mouse_log_<YYYY-MM-DD_HH-MM-SS>.csv` inside the output directory.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    dir: PathBuf,
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(dir: impl Into<PathBuf>, started_at: DateTime<Local>) -> Self {
        let dir = dir.into();
        let path = dir.join(format!(
            "mouse_log_{}.csv",
            started_at.format("%Y-%m-%d_%H-%M-%S")
        ));
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for CsvFileSink {
    fn write_records(&mut self, records: &[LogRecord]) -> Result<(), LogError> {
        fs::create_dir_all(&self.dir).map_err(|source| LogError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let write_err = |source| LogError::Write {
            path: self.path.clone(),
            source,
        };
        // header written by hand so an empty session still gets one
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)
            .map_err(write_err)?;
        writer.write_record(LogRecord::HEADER).map_err(write_err)?;
        for record in records {
            writer.serialize(record).map_err(write_err)?;
        }
        writer.flush().map_err(|source| LogError::Flush {
            path: self.path.clone(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Keeps every write in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub writes: Vec<Vec<LogRecord>>,
}

impl LogSink for MemorySink {
    fn write_records(&mut self, records: &[LogRecord]) -> Result<(), LogError> {
        self.writes.push(records.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Buffers one record per logged frame and saves them once.
#[derive(Debug)]
pub struct FrameLogger<W: LogSink> {
    records: Vec<LogRecord>,
    sink: W,
    saved: bool,
    clicked: bool,
    hit: bool,
}

impl<W: LogSink> FrameLogger<W> {
    pub fn new(sink: W) -> Self {
        Self {
            records: Vec::new(),
            sink,
            saved: false,
            clicked: false,
            hit: false,
        }
    }

    /// Flags a click for the next logged frame.
    pub fn mark_click(&mut self, hit: bool) {
        self.clicked = true;
        self.hit = hit;
    }

    pub fn clear_flags(&mut self) {
        self.clicked = false;
        self.hit = false;
    }

    /// Appends the record for this frame. Does nothing before the first
    /// target is placed.
    pub fn log_frame(
        &mut self,
        trial_number: usize,
        now_ms: u64,
        pointer: &RawPointerState,
        placer: &mut TargetPlacer,
    ) -> Option<&LogRecord> {
        let target = *placer.current()?;
        let former = placer.former();
        let (x, y) = pointer.snapshot_position();

        let distance_center = target.center_distance(x, y);
        let distance_edge = target.edge_distance(x, y);
        let edge = placer.edge_mut();
        edge.observe(distance_edge, now_ms);
        let time_since_edge = edge.time_since_edge(now_ms);
        let overshoot_count = edge.overshoots();

        let delta = pointer.take_frame_delta();

        self.records.push(LogRecord {
            trial_number,
            time_ms: now_ms,
            mouse_x: x,
            mouse_y: y,
            target_x: target.x,
            target_y: target.y,
            target_size: target.size,
            former_target_x: former.x,
            former_target_y: former.y,
            former_target_size: former.size,
            distance_center,
            distance_edge,
            time_since_target: now_ms.saturating_sub(placer.shown_at_ms()),
            time_since_edge,
            clicked: self.clicked,
            hit: self.hit,
            overshoot_count,
            raw_dx: delta.dx,
            raw_dy: delta.dy,
            raw_buttons: delta.buttons,
        });
        self.clear_flags();
        self.records.last()
    }

    /// Writes the buffer unless a save already succeeded. Returns whether
    /// anything was written.
    pub fn save(&mut self) -> Result<bool, LogError> {
        if self.saved {
            return Ok(false);
        }
        self.sink.write_records(&self.records)?;
        self.saved = true;
        tracing::info!(
            records = self.records.len(),
            location = %self.sink.describe(),
            "log saved"
        );
        Ok(true)
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fitts_core::Condition;
    use pretty_assertions::assert_eq;

    fn setup() -> (FrameLogger<MemorySink>, RawPointerState, TargetPlacer) {
        let pointer = RawPointerState::new(800, 400);
        let placer = TargetPlacer::new(800, 400);
        (FrameLogger::new(MemorySink::default()), pointer, placer)
    }

    #[test]
    fn nothing_logged_without_target() {
        let (mut logger, pointer, mut placer) = setup();
        assert!(logger.log_frame(1, 0, &pointer, &mut placer).is_none());
        assert!(logger.records().is_empty());
    }

    #[test]
    fn record_captures_frame_state() {
        let (mut logger, pointer, mut placer) = setup();
        // left target at x = 300, pointer starts at (400, 200)
        placer.place(Condition::new(200, 40), 1000);
        pointer.apply_delta(-70.0, 0.0);
        pointer.apply_delta(-10.0, 0.0);
        logger.mark_click(false);

        let record = logger.log_frame(1, 1016, &pointer, &mut placer).cloned().unwrap();
        assert_eq!(
            record,
            LogRecord {
                trial_number: 1,
                time_ms: 1016,
                mouse_x: 320,
                mouse_y: 200,
                target_x: 300,
                target_y: 200,
                target_size: 40,
                former_target_x: 0,
                former_target_y: 0,
                former_target_size: 0,
                distance_center: 20.0,
                distance_edge: 0.0,
                time_since_target: 16,
                time_since_edge: 0,
                clicked: true,
                hit: false,
                overshoot_count: 0,
                raw_dx: -80.0,
                raw_dy: 0.0,
                raw_buttons: 0,
            }
        );

        // flags and accumulator reset after the row
        let next = logger.log_frame(1, 1032, &pointer, &mut placer).unwrap();
        assert!(!next.clicked);
        assert_eq!(next.raw_dx, 0.0);
        assert_eq!(next.time_since_edge, 16);
    }

    #[test]
    fn overshoot_and_edge_time_per_frame() {
        let (mut logger, pointer, mut placer) = setup();
        placer.place(Condition::new(200, 20), 0);
        // pointer at 400, target at 300 radius 10
        let moves = [-50.0, -45.0, -5.0, 12.0, -12.0, 30.0];
        let mut rows = Vec::new();
        for (i, dx) in moves.into_iter().enumerate() {
            pointer.apply_delta(dx, 0.0);
            let r = logger.log_frame(1, (i as u64 + 1) * 10, &pointer, &mut placer).unwrap();
            rows.push((r.distance_edge, r.time_since_edge, r.overshoot_count));
        }
        assert_eq!(
            rows,
            vec![
                (40.0, -1, 0),
                (0.0, 0, 0),
                (0.0, 10, 0),
                (2.0, 20, 1),
                (0.0, 30, 1),
                (20.0, 40, 2),
            ]
        );
    }

    #[test]
    fn save_is_idempotent() {
        let (mut logger, pointer, mut placer) = setup();
        placer.place(Condition::new(200, 40), 0);
        logger.log_frame(1, 16, &pointer, &mut placer);

        assert!(logger.save().unwrap());
        assert!(!logger.save().unwrap());
        assert!(logger.is_saved());
        assert_eq!(logger.sink().writes.len(), 1);
        assert_eq!(logger.sink().writes[0].len(), 1);
    }

    #[test]
    fn csv_file_has_expected_layout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let sink = CsvFileSink::new(&out, started);
        let path = sink.path().to_path_buf();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "mouse_log_2024-03-09_14-05-07.csv"
        );

        let (_, pointer, mut placer) = setup();
        let mut logger = FrameLogger::new(sink);
        placer.place(Condition::new(200, 40), 0);
        pointer.apply_delta(3.0, -2.0);
        logger.mark_click(true);
        logger.log_frame(4, 16, &pointer, &mut placer);
        logger.save().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, LogRecord::HEADER.to_vec());

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(&row[0], "4");
        assert_eq!(&row[2], "403");
        assert_eq!(&row[13], "-1");
        assert_eq!(&row[14], "1");
        assert_eq!(&row[15], "1");
        assert_eq!(&row[17], "3.0");
        assert_eq!(&row[18], "-2.0");
    }

    #[test]
    fn empty_session_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvFileSink::new(dir.path(), Local::now());
        let path = sink.path().to_path_buf();
        let mut logger = FrameLogger::new(sink);
        logger.save().unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.trim_end(), LogRecord::HEADER.join(","));
    }
}
