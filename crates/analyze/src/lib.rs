//! mapwright rule analysis.
//!
//! - [`lint`]: static checks over normalized rules
//! - [`diagnose`]: lint plus an optional run against a sample payload
//! - [`check_compatibility`]: `schemaVersion` against a runtime version
//!
//! Every check returns data; nothing here fails with `Err`.

pub mod compat;
pub mod doctor;
pub mod lint;
pub mod report;

pub use compat::{check_compatibility, check_rules_compatibility};
pub use doctor::diagnose;
pub use lint::lint;
pub use report::{codes, CompatibilityReport, Diagnostic, DoctorReport, Severity};
