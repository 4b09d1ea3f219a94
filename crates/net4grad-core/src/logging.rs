//! Per-connection frame logs.
//!
//! With a log directory configured, each socket gets `{log_dir}/ws-{id}.log`
//! and every frame is appended as `[timestamp] IN|OUT|EVENT: payload`.
//! Without one, recording is a no-op.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    /// Connection lifecycle notes, not frames.
    Event,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
            Direction::Event => "EVENT",
        })
    }
}

/// Append-only log for one socket.
#[derive(Debug, Default)]
pub struct FrameLog {
    target: Option<(PathBuf, Mutex<File>)>,
}

impl FrameLog {
    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open `{dir}/ws-{connection_id}.log`, creating the directory.
    ///
    /// Failing to open the file disables the log; the socket still works.
    pub fn open(dir: Option<&Path>, connection_id: &str) -> Self {
        let Some(dir) = dir else {
            return Self::disabled();
        };

        let path = dir.join(format!("ws-{connection_id}.log"));
        let opened = fs::create_dir_all(dir)
            .and_then(|()| OpenOptions::new().create(true).append(true).open(&path));

        match opened {
            Ok(file) => Self {
                target: Some((path, Mutex::new(file))),
            },
            Err(e) => {
                log::warn!("Frame log disabled, cannot open {}: {}", path.display(), e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.target.as_ref().map(|(path, _)| path.as_path())
    }

    pub fn record(&self, direction: Direction, data: &str) {
        let Some((_, file)) = &self.target else {
            return;
        };
        if let Ok(mut file) = file.lock() {
            let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            let _ = writeln!(file, "[{stamp}] {direction}: {data}");
            let _ = file.flush();
        }
    }
}
