//! The work-dispatch relay
//!
//! Followers run the same external command as the leader but cannot derive
//! its arguments themselves, so the leader publishes them here once per work
//! item. The record carries exactly the fields a follower cannot compute:
//! the two image paths, the output directory, the item name, and the thread
//! budget, newline-delimited in that order.
//!
//! There is no lock on this file. Correctness comes from ordering: the
//! leader publishes strictly before broadcasting START, and followers only
//! consume after observing START, so a consumer never sees a partial write.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::error::CoordError;

/// Parameters for one work item, relayed leader → followers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub fixed: PathBuf,
    pub moving: PathBuf,
    pub output_dir: PathBuf,
    pub item: String,
    pub threads: u32,
}

impl DispatchRecord {
    fn to_wire(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}\n",
            self.fixed.display(),
            self.moving.display(),
            self.output_dir.display(),
            self.item,
            self.threads
        )
    }

    fn from_wire(text: &str, path: &Path) -> Result<Self, CoordError> {
        let fields: Vec<&str> = text.lines().collect();
        if fields.len() != 5 {
            return Err(CoordError::Corrupt {
                what: "dispatch",
                path: path.to_path_buf(),
                details: format!("expected 5 fields, found {}", fields.len()),
            });
        }
        let threads = fields[4].trim().parse().map_err(|_| CoordError::Corrupt {
            what: "dispatch",
            path: path.to_path_buf(),
            details: format!("thread budget is not an integer: {:?}", fields[4]),
        })?;
        Ok(Self {
            fixed: PathBuf::from(fields[0]),
            moving: PathBuf::from(fields[1]),
            output_dir: PathBuf::from(fields[2]),
            item: fields[3].to_string(),
            threads,
        })
    }
}

/// The durable record behind the relay.
pub struct DispatchFile {
    path: PathBuf,
}

impl DispatchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Overwrite the record. Leader-only, and strictly before the matching
    /// START broadcast.
    pub fn publish(&self, record: &DispatchRecord) -> Result<(), CoordError> {
        fs::write(&self.path, record.to_wire()).map_err(|e| {
            CoordError::io(format!("publishing dispatch {}", self.path.display()), e)
        })
    }

    /// Parse the current record; `Ok(None)` if nothing has been published.
    pub fn consume(&self) -> Result<Option<DispatchRecord>, CoordError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => DispatchRecord::from_wire(&text, &self.path).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoordError::io(
                format!("reading dispatch {}", self.path.display()),
                e,
            )),
        }
    }
}
