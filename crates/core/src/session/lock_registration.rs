use std::sync::{Mutex, PoisonError};

use crate::shared::hardware_status::HardwareStatus;

static PROCESS_REGISTRATION: LockRegistration = LockRegistration::new();

/// At-most-once installation of a lock-manager hook.
///
/// The flag is only set after a successful install, so a failed attempt is
/// retried by the next caller. Concurrent callers serialize on the flag's
/// mutex; exactly one of them runs `install`.
pub struct LockRegistration {
    installed: Mutex<bool>,
}

impl LockRegistration {
    pub const fn new() -> Self {
        Self {
            installed: Mutex::new(false),
        }
    }

    /// The registration shared by every session in the process.
    pub fn process() -> &'static LockRegistration {
        &PROCESS_REGISTRATION
    }

    pub fn ensure<F>(&self, install: F) -> Result<(), HardwareStatus>
    where
        F: FnOnce() -> Result<(), HardwareStatus>,
    {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if *installed {
            return Ok(());
        }
        install()?;
        *installed = true;
        log::debug!("Lock manager installed");
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        *self.installed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LockRegistration {
    fn default() -> Self {
        Self::new()
    }
}
