//! Integration test suite for deckflow.
//!
//! These tests drive whole requests through the engine, from brief to
//! pipeline outcome, against scripted in-process backends.
//!
//! # Test Categories
//!
//! - `scenarios`: Happy path, retry, abort, validator timeout, routing failure
//! - `routing`: Policy selection, fallback and the status policy table
//! - `qa_fanout`: Concurrent validators and the soft finalization path
//! - `cancellation`: Cancellation, deadlines and best-effort output
//! - `idempotence`: Execution shape across repeated runs
//! - `engine`: Start-up from configuration and request validation
//!
//! # CI Compatibility
//!
//! No test starts a model process; every backend is an in-process stub.

mod fixtures;

mod cancellation;
mod engine;
mod idempotence;
mod routing;
mod scenarios;
