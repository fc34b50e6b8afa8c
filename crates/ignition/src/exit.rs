//! Process exit status.

use std::process::{ExitCode, Termination};

/// Outcome of an orchestrator run, usable as the return type of `main`.
///
/// ```rust,no_run
/// use ignition::ExitStatus;
///
/// fn main() -> ExitStatus {
///     ExitStatus::Success
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Clean completion, exit code `0`.
    Success,
    /// Any fatal bootstrap or run failure, exit code `1`.
    Failure,
}

impl ExitStatus {
    /// The numeric exit code.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }

    /// Returns `true` for [`ExitStatus::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl<E> From<Result<(), E>> for ExitStatus {
    fn from(result: Result<(), E>) -> Self {
        if result.is_ok() {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failure.code(), 1);
        assert!(ExitStatus::Success.is_success());
        assert!(!ExitStatus::Failure.is_success());
    }

    #[test]
    fn test_from_result() {
        assert_eq!(ExitStatus::from(Ok::<(), ()>(())), ExitStatus::Success);
        assert_eq!(ExitStatus::from(Err::<(), _>("boom")), ExitStatus::Failure);
    }
}
