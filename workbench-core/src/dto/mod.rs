//! Data transfer objects
//!
//! Shapes exchanged with the Spec & Validation Provider.

pub mod spec;
pub mod validation;
