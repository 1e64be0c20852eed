// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Gemini backend for the Kestrel generation dispatcher.

pub mod client;
pub mod types;

pub use client::{GeminiClient, GeminiClientFactory};
