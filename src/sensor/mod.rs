//! Sensor Acquisition
//!
//! The register-addressed sensor behind the two-wire bus and the loop that
//! samples it.

pub mod acquisition;
pub mod bus;
pub mod registers;
