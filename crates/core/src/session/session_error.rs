use thiserror::Error;

use crate::session::decoder_session::SessionState;
use crate::shared::constants::GENERIC_FAILURE_STATUS;
use crate::shared::hardware_status::HardwareStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("failed to install the process-wide lock manager ({0})")]
    LockRegistration(HardwareStatus),
    #[error("decode engine refused the session configuration ({0})")]
    Configuration(HardwareStatus),
    #[error("decode engine rejected the submission ({0})")]
    Submission(HardwareStatus),
    #[error("decode engine failed to flush pending frames ({0})")]
    Flush(HardwareStatus),
    #[error("decode engine failed to close the session ({0})")]
    Teardown(HardwareStatus),
    #[error("cannot {operation} a session that is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl SessionError {
    /// The engine's native status when there is one, otherwise the generic
    /// failure sentinel. Never 0.
    pub fn code(&self) -> i32 {
        let status = match self {
            Self::LockRegistration(status)
            | Self::Configuration(status)
            | Self::Submission(status)
            | Self::Flush(status)
            | Self::Teardown(status) => *status,
            Self::InvalidState { .. } => return GENERIC_FAILURE_STATUS,
        };
        if status.is_ok() {
            GENERIC_FAILURE_STATUS
        } else {
            status.code()
        }
    }
}

/// Flattens a session call's outcome to a status code: 0 on success.
pub fn status_code(result: &Result<(), SessionError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}
