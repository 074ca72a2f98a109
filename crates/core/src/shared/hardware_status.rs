use std::fmt;

use crate::shared::constants::GENERIC_FAILURE_STATUS;

/// Native status code reported by a decode engine. Zero means success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HardwareStatus(i32);

impl HardwareStatus {
    pub const OK: Self = Self(0);
    pub const GENERIC_FAILURE: Self = Self(GENERIC_FAILURE_STATUS);

    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for HardwareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}
