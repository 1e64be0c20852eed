// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fullwidth-to-ASCII normalisation for saved session cookies.
//!
//! Cookies copied out of some browsers come back with fullwidth digits and
//! Latin letters, which the platform rejects.

use std::collections::BTreeMap;

/// Offset between a fullwidth form (U+FF01..U+FF5E) and its ASCII counterpart.
const FULLWIDTH_OFFSET: u32 = 0xFEE0;

/// Maps fullwidth `０-９`, `Ａ-Ｚ`, `ａ-ｚ` to ASCII. Everything else is kept.
pub fn normalize_fullwidth(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{FF10}'..='\u{FF19}' | '\u{FF21}'..='\u{FF3A}' | '\u{FF41}'..='\u{FF5A}' => {
                char::from_u32(c as u32 - FULLWIDTH_OFFSET).unwrap_or(c)
            }
            _ => c,
        })
        .collect()
}

/// Normalises every cookie value.
pub fn normalize_cookies(cookies: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    cookies
        .iter()
        .map(|(k, v)| (k.clone(), normalize_fullwidth(v)))
        .collect()
}
