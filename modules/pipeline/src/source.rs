use logtail::Follower;
use std::io;
use std::path::PathBuf;

/// A stream of text lines. `Ok(None)` means nothing new is available yet.
pub trait LineSource {
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

impl LineSource for Follower {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        Follower::next_line(self)
    }
}

/// Opens a fresh [`LineSource`] positioned at the current end of its input.
/// Called each time a worker enters its streaming phase.
pub trait OpenSource: Send {
    type Source: LineSource;

    fn open_at_end(&self) -> io::Result<Self::Source>;
    fn describe(&self) -> String;
}

/// A log file followed across rotation and truncation.
#[derive(Debug, Clone)]
pub struct TailFile {
    path: PathBuf,
}

impl TailFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TailFile { path: path.into() }
    }
}

impl OpenSource for TailFile {
    type Source = Follower;

    fn open_at_end(&self) -> io::Result<Follower> {
        Follower::open_at_end(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
