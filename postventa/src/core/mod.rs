//! Deterministic, pure logic shared by the service.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod assignment;
pub mod folio;
pub mod identity;
pub mod invariants;
pub mod kpi;
pub mod password;
pub mod rut;
pub mod schedule;
pub mod status;
pub mod types;
