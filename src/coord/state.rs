//! The leader's broadcast signal
//!
//! A single shared record holding one of three values. The leader is its only
//! writer; followers poll it to learn when to start an item, when the item is
//! finished, and when the run is over. Reads and writes each take the state
//! lock for the duration of one small file operation.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::error::CoordError;
use super::lock::FileLock;

/// The three signals a leader can broadcast.
///
/// Wire form is the bare decimal code, one per file write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// No item in flight; followers keep polling.
    Idle,
    /// An item is dispatched; followers run the relayed command.
    Start,
    /// The run is over; followers proceed to teardown. Terminal.
    Exit,
}

impl Signal {
    pub fn code(self) -> u8 {
        match self {
            Signal::Idle => 0,
            Signal::Start => 1,
            Signal::Exit => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Signal::Idle),
            1 => Some(Signal::Start),
            2 => Some(Signal::Exit),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::Idle => "IDLE",
            Signal::Start => "START",
            Signal::Exit => "EXIT",
        }
    }

    /// Legal broadcasts: IDLE→START, START→IDLE, anything→EXIT.
    /// EXIT is terminal.
    pub fn may_transition_to(self, next: Signal) -> bool {
        match (self, next) {
            (Signal::Exit, _) => false,
            (_, Signal::Exit) => true,
            (Signal::Idle, Signal::Start) => true,
            (Signal::Start, Signal::Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The durable record behind the broadcast channel.
pub struct StateFile {
    path: PathBuf,
    lock: FileLock,
}

impl StateFile {
    pub fn new(path: PathBuf, lock: FileLock) -> Self {
        Self { path, lock }
    }

    /// Overwrite the record. Leader-only by protocol contract.
    pub fn write(&self, signal: Signal) -> Result<(), CoordError> {
        let _guard = self.lock.acquire()?;
        fs::write(&self.path, signal.code().to_string()).map_err(|e| {
            CoordError::io(format!("writing state record {}", self.path.display()), e)
        })
    }

    /// Read the current signal.
    ///
    /// `Ok(None)` until the leader first writes, so a follower that starts
    /// polling before the leader initializes retries instead of failing.
    pub fn read(&self) -> Result<Option<Signal>, CoordError> {
        let _guard = self.lock.acquire()?;
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CoordError::io(
                    format!("reading state record {}", self.path.display()),
                    e,
                ))
            }
        };

        let code: u8 = text.trim().parse().map_err(|_| CoordError::Corrupt {
            what: "state",
            path: self.path.clone(),
            details: format!("not an integer: {:?}", text),
        })?;
        match Signal::from_code(code) {
            Some(signal) => Ok(Some(signal)),
            None => Err(CoordError::Corrupt {
                what: "state",
                path: self.path.clone(),
                details: format!("unknown signal code {}", code),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn state_in(dir: &TempDir) -> StateFile {
        let lock = FileLock::new(
            "leader_state",
            dir.path().join("leader_state.lock"),
            Duration::from_secs(2),
        );
        StateFile::new(dir.path().join("leader_state"), lock)
    }

    #[test]
    fn test_absent_record_reads_as_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(state_in(&dir).read().unwrap(), None);
    }

    #[test]
    fn test_write_then_read_each_signal() {
        let dir = TempDir::new().unwrap();
        let state = state_in(&dir);

        for signal in [Signal::Idle, Signal::Start, Signal::Exit] {
            state.write(signal).unwrap();
            assert_eq!(state.read().unwrap(), Some(signal));
        }
    }

    #[test]
    fn test_wire_codes_are_stable() {
        let dir = TempDir::new().unwrap();
        let state = state_in(&dir);

        state.write(Signal::Start).unwrap();
        let raw = fs::read_to_string(dir.path().join("leader_state")).unwrap();
        assert_eq!(raw, "1");
    }

    #[test]
    fn test_unknown_code_is_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("leader_state"), "9").unwrap();

        assert!(matches!(
            state_in(&dir).read(),
            Err(CoordError::Corrupt { what: "state", .. })
        ));
    }

    #[test]
    fn test_garbage_record_is_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("leader_state"), "starting").unwrap();

        assert!(matches!(
            state_in(&dir).read(),
            Err(CoordError::Corrupt { what: "state", .. })
        ));
    }

    #[test]
    fn test_transition_table() {
        use Signal::*;

        assert!(Idle.may_transition_to(Start));
        assert!(Start.may_transition_to(Idle));
        assert!(Idle.may_transition_to(Exit));
        assert!(Start.may_transition_to(Exit));

        assert!(!Idle.may_transition_to(Idle));
        assert!(!Start.may_transition_to(Start));
        assert!(!Exit.may_transition_to(Idle));
        assert!(!Exit.may_transition_to(Start));
        assert!(!Exit.may_transition_to(Exit));
    }
}
