//! Hand-rolled error types, in the style the rest of this codebase uses
//! (no `thiserror`/`anyhow` anywhere in the workspace).

use std::fmt;

/// A mode setter was called outside the window the design allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChangeError {
    /// `set_should_or`/`set_slow_mode` called with `petit_counter != 0`.
    WrongPhase,
    /// `set_dump` called after the first big cycle has executed.
    MachineAlreadyRunning,
}

impl fmt::Display for ModeChangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeChangeError::WrongPhase => {
                write!(f, "mode can only change at petit-cycle 0")
            }
            ModeChangeError::MachineAlreadyRunning => {
                write!(f, "dump mode can only be set before the first big cycle")
            }
        }
    }
}

impl std::error::Error for ModeChangeError {}

/// A message's overflow-referral walk visited every router in the
/// hypercube without finding buffer space. This is fatal: the design
/// treats it as an abort of the simulation, not a recoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterOverflowError;

impl fmt::Display for RouterOverflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "referer chain exhausted: every router in the hypercube is full")
    }
}

impl std::error::Error for RouterOverflowError {}
