//! Workbench Core
//!
//! Core types and pure logic for the model workbench.
//!
//! This crate contains:
//! - Domain types: Core business entities (JobRecord, ArgValue, settings)
//! - DTOs: Data exchanged with the Spec & Validation Provider
//! - Datastack: The argument payload handed to a model executable
//! - Validation: Aggregation of provider results into a run gate
//!
//! Note: Process supervision and persistence live in the runner crate.

pub mod datastack;
pub mod domain;
pub mod dto;
pub mod validation;
