//! Core domain types
//!
//! This module contains the domain structures shared between the runner
//! (which launches and persists jobs) and front ends (which build them from
//! user input or saved parameter files).

pub mod args;
pub mod job;
pub mod settings;
