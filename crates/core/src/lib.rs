//! Core library: change detection and duplicate suppression for the folder
//! upload agent.

pub mod agent;
pub mod config;
pub mod fingerprint;
pub mod ledger;
pub mod naming;
pub mod orchestrator;
