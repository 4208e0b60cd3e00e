// Size-based log rotation shared by the transition log and the
// structured event sink (.log -> .log.1 -> .log.2 ...).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub(crate) struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backup_count: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub(crate) fn open(
        path: impl Into<PathBuf>,
        max_bytes: u64,
        backup_count: usize,
    ) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            path,
            max_bytes,
            backup_count,
            file,
            written,
        })
    }

    pub(crate) fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let bytes = line.as_bytes();
        if self.written + bytes.len() as u64 + 1 > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(bytes)?;
        self.file.write_all(b"\n")?;
        self.written += bytes.len() as u64 + 1;
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.file.flush()?;

        if self.backup_count > 0 {
            for i in (1..self.backup_count).rev() {
                let from = backup_path(&self.path, i);
                let to = backup_path(&self.path, i + 1);
                if from.exists() {
                    let _ = std::fs::rename(&from, &to);
                }
            }
            let _ = std::fs::rename(&self.path, backup_path(&self.path, 1));
        } else {
            // No backups configured: start the file over in place.
            let _ = std::fs::remove_file(&self.path);
        }

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}
