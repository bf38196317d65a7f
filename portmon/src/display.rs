//! Turning received data into terminal lines.
//!
//! Every line gets a `[HH:MM:SS] ` prefix. Payloads are shown as lossy UTF-8
//! text or, in hex view, as space-separated upper-case byte values. UDP
//! chunks are tagged with their sender.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use crate::error::Result;
use crate::event::LifecycleEvent;
use crate::transport::Chunk;

/// Capture file name used when none is given.
pub const DEFAULT_LOG_FILE: &str = "monitor_log.txt";

/// `[HH:MM:SS] ` for the given moment.
pub fn timestamp_prefix(at: OffsetDateTime) -> String {
    format!("[{}] ", crate::tracing::clock(at))
}

/// `50 49 4E 47` for `b"PING"`.
pub fn hex_view(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Payload of one chunk, without timestamp.
pub fn render_chunk(chunk: &Chunk, hex: bool) -> String {
    let body = if hex {
        hex_view(chunk.data())
    } else {
        String::from_utf8_lossy(chunk.data()).into_owned()
    };
    match chunk.origin() {
        Some(origin) => format!("[{origin}] {body}"),
        None => body,
    }
}

pub fn render_event(event: &LifecycleEvent) -> String {
    event.to_string()
}

/// Timestamped display line.
pub fn line(at: OffsetDateTime, text: &str) -> String {
    format!("{}{}", timestamp_prefix(at), text)
}

/// Timestamped display line for right now.
pub fn stamp(text: &str) -> String {
    line(crate::tracing::now(), text)
}

/// Append-only capture of displayed lines.
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    file: File,
}

impl LogFile {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, "{line}")?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn hex_view_is_spaced_upper_case() {
        assert_eq!(hex_view(b"PING"), "50 49 4E 47");
        assert_eq!(hex_view(&[0x00, 0xff, 0x0a]), "00 FF 0A");
        assert_eq!(hex_view(&[]), "");
    }

    #[test]
    fn chunk_text_and_hex() {
        let chunk = Chunk::new(&b"ok\xff"[..], None);
        assert_eq!(render_chunk(&chunk, false), "ok\u{fffd}");
        assert_eq!(render_chunk(&chunk, true), "6F 6B FF");
    }

    #[test]
    fn udp_chunks_show_origin() {
        let chunk = Chunk::new(&b"hi"[..], Some("192.168.1.7:5000".parse().unwrap()));
        assert_eq!(render_chunk(&chunk, false), "[192.168.1.7:5000] hi");
        assert_eq!(render_chunk(&chunk, true), "[192.168.1.7:5000] 68 69");
    }

    #[test]
    fn lines_are_timestamped() {
        let at = datetime!(2024-06-01 09:08:07 UTC);
        assert_eq!(line(at, "hello"), "[09:08:07] hello");
        assert_eq!(
            line(at, &render_event(&LifecycleEvent::Disconnected)),
            "[09:08:07] Connection closed by peer."
        );
    }

    #[test]
    fn log_file_appends() {
        let path = std::env::temp_dir().join(format!(
            "portmon-log-{}-{}.txt",
            std::process::id(),
            OffsetDateTime::now_utc().unix_timestamp_nanos()
        ));

        let mut log = LogFile::open(&path).unwrap();
        log.append_line("first").unwrap();
        drop(log);
        let mut log = LogFile::open(&path).unwrap();
        log.append_line("second").unwrap();
        assert_eq!(log.path(), path.as_path());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
        std::fs::remove_file(&path).unwrap();
    }
}
