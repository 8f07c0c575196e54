/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

use std::fmt;

/// The single observable outcome of a [`crate::Supervisor::run`] call.
///
/// Exactly one [`ExitCode`] is produced per run, whether the process shuts down cleanly,
/// times out during a phase, or a component misbehaves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean shutdown after the [`crate::Wire`] cancelled the run token.
    Ok = 0,

    /// A phase deadline expired (Setup or Close).
    Interrupted = 1,

    /// A component's Setup returned an error or panicked.
    SetupFailed = 3,

    /// A component's Start returned an error or panicked, the readiness callback failed, or a
    /// Probe surfaced a non-retryable error.
    Internal = 4,
}

impl ExitCode {
    /// Returns the severity of this code: higher is more severe.
    ///
    /// Used to resolve races between the wire-cancellation trigger and the Close stage: the
    /// more severe of the two always surfaces as the final code.
    #[must_use]
    pub(crate) const fn severity(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Interrupted => 1,
            Self::SetupFailed => 2,
            Self::Internal => 3,
        }
    }

    /// Returns the more severe of `self` and `other`.
    #[must_use]
    pub(crate) const fn max_severity(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Returns the raw process exit status this code maps to.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Interrupted => "Interrupted",
            Self::SetupFailed => "SetupFailed",
            Self::Internal => "Internal",
        };
        write!(f, "{name}({})", self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_i32_matches_the_documented_process_codes() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        assert_eq!(ExitCode::Interrupted.as_i32(), 1);
        assert_eq!(ExitCode::SetupFailed.as_i32(), 3);
        assert_eq!(ExitCode::Internal.as_i32(), 4);
    }

    #[test]
    fn max_severity_prefers_the_more_severe_code() {
        assert_eq!(ExitCode::Ok.max_severity(ExitCode::Interrupted), ExitCode::Interrupted);
        assert_eq!(ExitCode::Internal.max_severity(ExitCode::Ok), ExitCode::Internal);
        assert_eq!(
            ExitCode::SetupFailed.max_severity(ExitCode::Internal),
            ExitCode::Internal
        );
    }
}
