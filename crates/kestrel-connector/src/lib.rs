// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat connector supervision for Kestrel.
//!
//! [`ConnectorSupervisor`] owns the one logged-in session, retries
//! session-expiry login failures, and runs the platform's listen loop on a
//! background worker so the control path stays responsive.

pub mod heartbeat;
pub mod normalize;
pub mod supervisor;

pub use heartbeat::HeartbeatSession;
pub use normalize::{normalize_cookies, normalize_fullwidth};
pub use supervisor::{
    ConnectorMode, ConnectorSupervisor, LoginFailure, SessionEnd, SupervisorSettings,
    SupervisorState, SupervisorStatus,
};
