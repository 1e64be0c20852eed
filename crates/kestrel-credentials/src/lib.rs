// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential pool and failover dispatch for the generation provider.
//!
//! [`CredentialPool`] rotates through interchangeable API keys and parks
//! rate-limited ones for a cooldown. [`GenerationDispatcher`] drives the
//! retry loop on top of it and can fire a connector re-login through
//! [`ReloginGuard`] when a rate limit hits chat-platform traffic.

pub mod dispatcher;
pub mod pool;
pub mod relogin;

pub use dispatcher::{Attempt, DispatchSettings, GenerationDispatcher};
pub use pool::{Checkout, CredentialPool, KeyStatus, PoolStatus};
pub use relogin::{ReloginGuard, ReloginStatus};
