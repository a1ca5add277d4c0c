//! Numerical building blocks shared by the solver.

pub mod enorm;
pub mod finite_difference;
pub mod qr;

// Re-export commonly used utilities
pub use enorm::enorm;
pub use finite_difference::fdjac2;
pub use qr::{qrfac, qrsolv};
