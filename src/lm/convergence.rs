//! Termination codes of the solver.
//!
//! Every solve ends with exactly one [`Termination`], which maps one to one
//! onto the classical MINPACK `info` integer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Improper input; nothing was evaluated. Code 0.
    InvalidInput,

    /// Actual and predicted relative reductions of the sum of squares are at most `ftol`. Code 1.
    FtolReached,

    /// Relative error between two consecutive iterates is at most `xtol`. Code 2.
    XtolReached,

    /// Both `ftol` and `xtol` conditions hold. Code 3.
    FtolAndXtolReached,

    /// The residuals are orthogonal to the Jacobian columns to within `gtol`. Code 4.
    GtolReached,

    /// The evaluation budget was exhausted. Code 5.
    MaxFevReached,

    /// `ftol` is too small; no further reduction of the sum of squares is possible. Code 6.
    FtolTooSmall,

    /// `xtol` is too small; no further improvement of the iterate is possible. Code 7.
    XtolTooSmall,

    /// `gtol` is too small; the residuals are orthogonal to machine precision. Code 8.
    GtolTooSmall,

    /// The residual callback stopped the solve. Carries the negative status.
    UserAbort(i32),
}

impl Termination {
    /// The MINPACK `info` value.
    pub fn code(&self) -> i32 {
        match self {
            Termination::InvalidInput => 0,
            Termination::FtolReached => 1,
            Termination::XtolReached => 2,
            Termination::FtolAndXtolReached => 3,
            Termination::GtolReached => 4,
            Termination::MaxFevReached => 5,
            Termination::FtolTooSmall => 6,
            Termination::XtolTooSmall => 7,
            Termination::GtolTooSmall => 8,
            Termination::UserAbort(status) => *status,
        }
    }

    /// Inverse of [`Termination::code`]. Codes above 8 have no meaning.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            c if c < 0 => Termination::UserAbort(c),
            0 => Termination::InvalidInput,
            1 => Termination::FtolReached,
            2 => Termination::XtolReached,
            3 => Termination::FtolAndXtolReached,
            4 => Termination::GtolReached,
            5 => Termination::MaxFevReached,
            6 => Termination::FtolTooSmall,
            7 => Termination::XtolTooSmall,
            8 => Termination::GtolTooSmall,
            _ => return None,
        })
    }

    /// Returns true for the normal termination codes 1 to 4.
    pub fn is_converged(&self) -> bool {
        matches!(self.code(), 1..=4)
    }

    /// Returns true when the solve stopped because of bad input or an abort.
    pub fn is_error(&self) -> bool {
        self.code() <= 0
    }

    /// Returns a description of the termination reason.
    pub fn description(&self) -> String {
        match self {
            Termination::InvalidInput => "Improper input parameters".to_string(),
            Termination::FtolReached => {
                "Converged: relative reduction in the sum of squares is at most ftol".to_string()
            }
            Termination::XtolReached => {
                "Converged: relative error between two iterates is at most xtol".to_string()
            }
            Termination::FtolAndXtolReached => {
                "Converged: both ftol and xtol conditions hold".to_string()
            }
            Termination::GtolReached => {
                "Converged: residuals are orthogonal to the Jacobian within gtol".to_string()
            }
            Termination::MaxFevReached => {
                "Terminated: maximum number of function evaluations reached".to_string()
            }
            Termination::FtolTooSmall => {
                "Terminated: ftol is too small, no further reduction is possible".to_string()
            }
            Termination::XtolTooSmall => {
                "Terminated: xtol is too small, no further improvement is possible".to_string()
            }
            Termination::GtolTooSmall => {
                "Terminated: gtol is too small, residuals are orthogonal to machine precision"
                    .to_string()
            }
            Termination::UserAbort(status) => {
                format!("Terminated: residual evaluation aborted with status {}", status)
            }
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "info={} ({})", self.code(), self.description())
    }
}
