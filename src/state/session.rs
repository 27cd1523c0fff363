use std::fmt;

/// Why a worker tears down and recreates its page driver session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// The configured number of consecutive jobs completed on this session
    UnitLimit,
    /// A job failed with a session-level error (driver disconnect)
    SessionError,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnitLimit => write!(f, "unit limit reached"),
            Self::SessionError => write!(f, "session error"),
        }
    }
}

/// Tracks one worker's session for the restart policy
///
/// A session is reused across jobs until either `restart_every` consecutive
/// jobs completed on it or a session-related failure was observed.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Jobs completed since the current session was opened
    pub units_since_restart: u32,

    /// Sessions opened by this worker so far
    pub sessions_opened: u32,

    restart_every: u32,
    pending: Option<RestartReason>,
}

impl SessionState {
    pub fn new(restart_every: u32) -> Self {
        Self {
            units_since_restart: 0,
            sessions_opened: 0,
            restart_every: restart_every.max(1),
            pending: None,
        }
    }

    /// Records that a job committed on the current session
    pub fn record_completed(&mut self) {
        self.units_since_restart += 1;
        if self.units_since_restart >= self.restart_every && self.pending.is_none() {
            self.pending = Some(RestartReason::UnitLimit);
        }
    }

    /// Records a retry-exhausted failure caused by the session itself
    pub fn record_session_failure(&mut self) {
        self.pending = Some(RestartReason::SessionError);
    }

    /// Returns the reason the session must be recreated, if any
    pub fn restart_due(&self) -> Option<RestartReason> {
        self.pending
    }

    /// Resets counters after a fresh session has been opened
    pub fn record_opened(&mut self) {
        self.sessions_opened += 1;
        self.units_since_restart = 0;
        self.pending = None;
    }
}
