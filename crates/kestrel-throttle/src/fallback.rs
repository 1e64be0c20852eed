// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Insertion-ordered in-memory history used when durable storage is down.

use std::collections::{HashMap, VecDeque};

use kestrel_core::{ConversationId, Exchange};

/// Conversation histories for one channel kind, remembering first-insert order.
#[derive(Debug, Default)]
pub struct FallbackHistory {
    records: HashMap<ConversationId, Vec<Exchange>>,
    order: VecDeque<ConversationId>,
}

impl FallbackHistory {
    pub fn get(&self, id: &ConversationId) -> Option<&Vec<Exchange>> {
        self.records.get(id)
    }

    /// Stores `exchanges`. Updating an existing conversation keeps its position.
    pub fn put(&mut self, id: &ConversationId, exchanges: Vec<Exchange>) {
        if self.records.insert(id.clone(), exchanges).is_none() {
            self.order.push_back(id.clone());
        }
    }

    pub fn remove(&mut self, id: &ConversationId) -> bool {
        if self.records.remove(id).is_some() {
            self.order.retain(|o| o != id);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Above `ceiling`, drops the oldest fifth. Returns how many were dropped.
    pub fn trim_to(&mut self, ceiling: usize) -> usize {
        if self.records.len() <= ceiling {
            return 0;
        }
        let evict = self.records.len() / 5;
        for _ in 0..evict {
            if let Some(oldest) = self.order.pop_front() {
                self.records.remove(&oldest);
            }
        }
        evict
    }
}
