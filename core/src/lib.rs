//! Core verification engine: case lifecycle, document intake and analysis,
//! watchlist screening, risk scoring, and the compliance rule layer, all
//! persisted in SQLite.
//!
//! RULE: Only the store talks to the database. The engine calls store
//! methods; it never executes SQL directly.

pub mod capture;
pub mod case;
pub mod clock;
pub mod config;
pub mod document_analyzer;
pub mod engine;
pub mod error;
pub mod event;
pub mod metrics;
pub mod risk;
pub mod rules;
pub mod screening;
pub mod store;
pub mod types;
pub mod workflow;
