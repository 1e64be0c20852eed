// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for Kestrel conversation history.

pub mod history;
pub mod migrations;

pub use history::SqliteHistoryStore;
