//! # Traffic Management Module
//!
//! Outbound traffic shaping for the upstream CRM.
//!
//! - `AdmissionController`: sliding-window limit on upstream calls

pub mod admission;

pub use admission::{Admission, AdmissionConfig, AdmissionController, AdmissionStats};
