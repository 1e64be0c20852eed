// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `/etc/kestrel/kestrel.toml`, then the XDG user config, then
//! `./kestrel.toml`, then `KESTREL_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use tracing::debug;

use crate::model::KestrelConfig;

/// Top-level sections, used to turn `KESTREL_SECTION_KEY` into `section.key`.
const SECTIONS: &[&str] = &[
    "agent",
    "connector",
    "generation",
    "throttle",
    "replies",
    "storage",
    "activity",
];

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/kestrel/kestrel.toml`
/// 3. `~/.config/kestrel/kestrel.toml`
/// 4. `./kestrel.toml`
/// 5. `KESTREL_*` environment variables
pub fn load_config() -> Result<KestrelConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults.
pub fn load_config_from_str(toml_content: &str) -> Result<KestrelConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KestrelConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KestrelConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KestrelConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The unextracted Figment for the standard hierarchy.
pub fn build_figment() -> Figment {
    let system = system_config_path();
    let user = user_config_path().unwrap_or_default();
    for path in [system.as_path(), user.as_path(), Path::new("kestrel.toml")] {
        if path.is_file() {
            debug!(path = %path.display(), "config file found");
        }
    }

    Figment::new()
        .merge(Serialized::defaults(KestrelConfig::default()))
        .merge(Toml::file(system))
        .merge(Toml::file(user))
        .merge(Toml::file("kestrel.toml"))
        .merge(env_provider())
}

pub(crate) fn system_config_path() -> PathBuf {
    PathBuf::from("/etc/kestrel/kestrel.toml")
}

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kestrel/kestrel.toml"))
}

/// Maps `KESTREL_GENERATION_MAX_RETRIES` to `generation.max_retries`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// keys that themselves contain underscores survive intact.
fn env_provider() -> Env {
    Env::prefixed("KESTREL_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(
            map_env_key("generation_max_retries"),
            "generation.max_retries"
        );
        assert_eq!(
            map_env_key("connector_login_retry_delay_secs"),
            "connector.login_retry_delay_secs"
        );
        assert_eq!(map_env_key("storage_database_path"), "storage.database_path");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }

    #[test]
    fn env_overrides_apply_over_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                "[generation]\nmodel = \"from-file\"\nmax_retries = 2\n",
            )?;
            jail.set_env("KESTREL_GENERATION_MAX_RETRIES", "5");
            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.generation.model, "from-file");
            assert_eq!(config.generation.max_retries, 5);
            Ok(())
        });
    }
}
