//! Per-channel transcripts of received lines.
//!
//! One append-only file per channel or nick, `<dir>/log_<name>`. Writing is
//! best-effort: failures are logged and the line is dropped.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

pub struct Transcript {
    dir: Option<PathBuf>,
    files: Mutex<HashMap<String, File>>,
}

impl Transcript {
    /// Transcripts under `dir`, created on first use (mode 0750 on unix).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// A sink that records nothing.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Append `line` to the transcript for `key`.
    pub fn append(&self, key: &str, line: &str) {
        let Some(dir) = &self.dir else {
            return;
        };
        let mut files = self.files.lock();
        if !files.contains_key(key) {
            match open_log(dir, key) {
                Ok(file) => {
                    files.insert(key.to_string(), file);
                }
                Err(e) => {
                    tracing::error!(key, error = %e, "Cannot open transcript");
                    return;
                }
            }
        }
        if let Some(file) = files.get_mut(key) {
            if let Err(e) = writeln!(file, "{line}") {
                tracing::error!(key, error = %e, "Cannot write transcript");
            }
        }
    }

    /// Flush and close every open transcript.
    pub fn close(&self) {
        let mut files = self.files.lock();
        for (key, file) in files.iter_mut() {
            if let Err(e) = file.flush() {
                tracing::warn!(key = %key, error = %e, "Cannot flush transcript");
            }
        }
        files.clear();
    }
}

/// File name for a key; path separators are replaced so a key can never
/// leave the transcript directory.
fn file_name(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("log_{safe}")
}

fn open_log(dir: &Path, key: &str) -> io::Result<File> {
    if !dir.exists() {
        create_dir(dir)?;
    }
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o640);
    }
    options.open(dir.join(file_name(key)))
}

fn create_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o750);
    }
    builder.create(dir)
}
