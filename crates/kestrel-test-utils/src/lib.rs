// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Kestrel.
//!
//! Scripted stand-ins for every external capability so supervisor, dispatcher,
//! and pipeline tests run deterministically without a network.
//!
//! - [`ScriptedGenerator`] - per-key scripted provider replies with call counters
//! - [`ScriptedConnector`] / [`MockSession`] - scripted logins and an injectable listen loop
//! - [`MemoryHistoryStore`] - in-memory durable store with a failure switch
//! - [`RecordingSink`] - captures activity reports

pub mod memory_store;
pub mod mock_connector;
pub mod mock_generator;
pub mod recording_sink;

pub use memory_store::MemoryHistoryStore;
pub use mock_connector::{MockSession, ScriptedConnector};
pub use mock_generator::{ScriptedGenerator, ScriptedReply};
pub use recording_sink::RecordingSink;

use std::sync::{Mutex, MutexGuard};

/// Locks a std mutex, recovering the data if a panicking test poisoned it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
