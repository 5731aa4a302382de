//! The durable worker counter
//!
//! One decimal integer in a shared file, guarded by its own lock. It hands
//! out worker identifiers during role assignment, lets the rendezvous
//! barrier watch the cohort fill up, and counts workers back out during
//! teardown. The record is never touched without holding the counter lock;
//! creation and every read-modify-write serialize on it, which is what makes
//! "whoever creates the record leads" a race-free election.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use super::error::CoordError;
use super::lock::FileLock;

pub struct CounterFile {
    path: PathBuf,
    lock: FileLock,
}

impl CounterFile {
    pub fn new(path: PathBuf, lock: FileLock) -> Self {
        Self { path, lock }
    }

    /// Assign the next worker identifier.
    ///
    /// The worker that creates the record is assigned 0 and leaves the value
    /// at 1; every later caller reads the value as its own identifier and
    /// writes back the increment.
    pub fn assign_next(&self) -> Result<u32, CoordError> {
        let _guard = self.lock.acquire()?;
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                file.write_all(b"1").map_err(|e| {
                    CoordError::io(format!("initializing counter {}", self.path.display()), e)
                })?;
                Ok(0)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let value = self.read_value()?;
                self.write_value(value + 1)?;
                Ok(value)
            }
            Err(e) => Err(CoordError::io(
                format!("creating counter {}", self.path.display()),
                e,
            )),
        }
    }

    /// Current value, `Ok(None)` before any worker has joined.
    pub fn current(&self) -> Result<Option<u32>, CoordError> {
        let _guard = self.lock.acquire()?;
        match fs::read_to_string(&self.path) {
            Ok(text) => self.parse(&text).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoordError::io(
                format!("reading counter {}", self.path.display()),
                e,
            )),
        }
    }

    /// Decrement on the way out; returns how many workers remain.
    pub fn decrement(&self) -> Result<u32, CoordError> {
        let _guard = self.lock.acquire()?;
        let value = match fs::read_to_string(&self.path) {
            Ok(text) => self.parse(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CoordError::Corrupt {
                    what: "counter",
                    path: self.path.clone(),
                    details: "record missing during teardown".to_string(),
                })
            }
            Err(e) => {
                return Err(CoordError::io(
                    format!("reading counter {}", self.path.display()),
                    e,
                ))
            }
        };
        if value == 0 {
            return Err(CoordError::Corrupt {
                what: "counter",
                path: self.path.clone(),
                details: "underflow: decrement past zero".to_string(),
            });
        }
        let remaining = value - 1;
        self.write_value(remaining)?;
        Ok(remaining)
    }

    // Callers hold the counter lock.
    fn read_value(&self) -> Result<u32, CoordError> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            CoordError::io(format!("reading counter {}", self.path.display()), e)
        })?;
        self.parse(&text)
    }

    fn write_value(&self, value: u32) -> Result<(), CoordError> {
        fs::write(&self.path, value.to_string()).map_err(|e| {
            CoordError::io(format!("writing counter {}", self.path.display()), e)
        })
    }

    fn parse(&self, text: &str) -> Result<u32, CoordError> {
        text.trim().parse().map_err(|_| CoordError::Corrupt {
            what: "counter",
            path: self.path.clone(),
            details: format!("not an integer: {:?}", text),
        })
    }
}
