// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply pipeline and runtime wiring for Kestrel.
//!
//! [`ReplyPipeline`] is the message handler the connector supervisor calls
//! for every inbound message. It consults the conversation throttle, calls
//! the generation dispatcher under a deadline, and always answers with text.

pub mod activity;
pub mod pipeline;
pub mod relogin;
pub mod shutdown;

pub use activity::{HttpActivitySink, sink_from_config};
pub use pipeline::{ReplyOutcome, ReplyPipeline, ReplySettings, build_prompt};
pub use relogin::SupervisorRelogin;
pub use shutdown::install_signal_handler;
