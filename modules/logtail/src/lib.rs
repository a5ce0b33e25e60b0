//! Follow an append-only log file from its current end, surviving rotation
//! and truncation.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[cfg(unix)]
type FileId = (u64, u64);
#[cfg(not(unix))]
type FileId = ();

#[cfg(unix)]
fn file_id(meta: &fs::Metadata) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_id(_meta: &fs::Metadata) -> Option<FileId> {
    None
}

/// Longest line kept, terminator excluded. Longer lines are dropped whole.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Non-blocking line reader over a growing file. [`Follower::next_line`]
/// returns `Ok(None)` when no complete line is available yet; the caller
/// decides how long to wait before polling again.
pub struct Follower {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    id: Option<FileId>,
    pos: u64,
    partial: Vec<u8>,
    max_line: usize,
    /// Inside an oversized line: bytes are dropped up to the next newline.
    discarding: bool,
}

impl Follower {
    /// Open `path` positioned at its current end so existing content is never
    /// replayed. A missing file is waited for and read from its start once it
    /// appears.
    pub fn open_at_end(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut follower = Follower {
            path,
            reader: None,
            id: None,
            pos: 0,
            partial: Vec::new(),
            max_line: MAX_LINE_BYTES,
            discarding: false,
        };
        match File::open(&follower.path) {
            Ok(mut file) => {
                let end = file.seek(SeekFrom::End(0))?;
                follower.id = file_id(&file.metadata()?);
                follower.pos = end;
                follower.reader = Some(BufReader::new(file));
                debug!(path = %follower.path.display(), offset = end, "following from end of file");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %follower.path.display(), "file does not exist yet; waiting for it");
            }
            Err(e) => return Err(e),
        }
        Ok(follower)
    }

    /// Byte offset of the next unread byte in the current file.
    #[cfg(test)]
    fn position(&self) -> u64 {
        self.pos
    }

    /// Next complete line without its terminator, decoded lossily as UTF-8.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if self.reader.is_none() && !self.attach_from_start()? {
                return Ok(None);
            }
            if let Some(reader) = self.reader.as_mut() {
                let budget = (self.max_line + 1).saturating_sub(self.partial.len()).max(1) as u64;
                let n = reader.by_ref().take(budget).read_until(b'\n', &mut self.partial)?;
                self.pos += n as u64;
                if self.partial.last() == Some(&b'\n') {
                    if self.discarding {
                        self.discarding = false;
                        self.partial.clear();
                        continue;
                    }
                    let line = String::from_utf8_lossy(&self.partial)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    self.partial.clear();
                    return Ok(Some(line));
                }
                if self.partial.len() > self.max_line {
                    if !self.discarding {
                        warn!(path = %self.path.display(), limit = self.max_line, "line exceeds maximum length; dropping it");
                        self.discarding = true;
                    }
                    self.partial.clear();
                    continue;
                }
            }
            if !self.reopen_if_replaced()? {
                return Ok(None);
            }
        }
    }

    /// Open the path from offset zero. Returns `false` while it does not exist.
    fn attach_from_start(&mut self) -> io::Result<bool> {
        match File::open(&self.path) {
            Ok(file) => {
                self.id = file_id(&file.metadata()?);
                self.pos = 0;
                self.partial.clear();
                self.discarding = false;
                self.reader = Some(BufReader::new(file));
                info!(path = %self.path.display(), "file appeared; following from start");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Detect rotation (a different file now lives at the path) or truncation
    /// (the file shrank below our offset). Either way the new content is read
    /// from its start.
    fn reopen_if_replaced(&mut self) -> io::Result<bool> {
        let meta = match fs::metadata(&self.path) {
            Ok(m) => m,
            // Mid-rotation: keep draining the old handle until the new file shows up.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        let current = file_id(&meta);
        if current.is_some() && current != self.id {
            info!(path = %self.path.display(), "file rotated; reopening");
            self.reader = None;
            return self.attach_from_start();
        }
        if meta.len() < self.pos {
            info!(path = %self.path.display(), previous_offset = self.pos, size = meta.len(), "file truncated; rewinding");
            if let Some(reader) = self.reader.as_mut() {
                reader.seek(SeekFrom::Start(0))?;
            }
            self.pos = 0;
            self.partial.clear();
            self.discarding = false;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, text: &str) {
        let mut f = fs::OpenOptions::new().create(true).append(true).open(path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn existing_content_is_not_replayed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conn.log");
        append(&path, "#fields\tts\nold line\n");
        let mut t = Follower::open_at_end(&path).unwrap();
        assert_eq!(t.next_line().unwrap(), None);
        append(&path, "new line\r\nsecond\n");
        assert_eq!(t.next_line().unwrap().as_deref(), Some("new line"));
        assert_eq!(t.next_line().unwrap().as_deref(), Some("second"));
        assert_eq!(t.next_line().unwrap(), None);
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eve.json");
        append(&path, "");
        let mut t = Follower::open_at_end(&path).unwrap();
        append(&path, "{\"event_type\":");
        assert_eq!(t.next_line().unwrap(), None);
        append(&path, "\"alert\"}\n");
        assert_eq!(t.next_line().unwrap().as_deref(), Some("{\"event_type\":\"alert\"}"));
    }

    #[test]
    fn oversized_line_is_dropped_whole() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conn.log");
        append(&path, "");
        let mut t = Follower::open_at_end(&path).unwrap();
        t.max_line = 8;
        append(&path, "12345678\n");
        assert_eq!(t.next_line().unwrap().as_deref(), Some("12345678"));
        append(&path, "0123456789abcdef");
        assert_eq!(t.next_line().unwrap(), None);
        assert!(t.partial.len() <= 8);
        append(&path, "still the same line\nok\n");
        assert_eq!(t.next_line().unwrap().as_deref(), Some("ok"));
        assert_eq!(t.next_line().unwrap(), None);
    }

    #[test]
    fn truncation_rewinds_to_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conn.log");
        append(&path, "aaaaaaaa\nbbbbbbbb\n");
        let mut t = Follower::open_at_end(&path).unwrap();
        fs::write(&path, "c\n").unwrap();
        assert_eq!(t.next_line().unwrap().as_deref(), Some("c"));
        assert_eq!(t.position(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn rotation_follows_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conn.log");
        append(&path, "history\n");
        let mut t = Follower::open_at_end(&path).unwrap();
        append(&path, "tail of old file\n");
        fs::rename(&path, dir.path().join("conn.log.1")).unwrap();
        append(&path, "fresh\n");
        assert_eq!(t.next_line().unwrap().as_deref(), Some("tail of old file"));
        assert_eq!(t.next_line().unwrap().as_deref(), Some("fresh"));
        assert_eq!(t.next_line().unwrap(), None);
    }

    #[test]
    fn missing_file_is_read_from_start_once_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("later.log");
        let mut t = Follower::open_at_end(&path).unwrap();
        assert_eq!(t.next_line().unwrap(), None);
        append(&path, "first\n");
        assert_eq!(t.next_line().unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.log");
        append(&path, "");
        let mut t = Follower::open_at_end(&path).unwrap();
        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"ab\xffcd\n").unwrap();
        assert_eq!(t.next_line().unwrap().as_deref(), Some("ab\u{fffd}cd"));
    }
}
