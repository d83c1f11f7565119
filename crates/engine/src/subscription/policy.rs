// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Which upstream tags a subscription mirrors.

use regex::Regex;

/// A tag filter. The empty policy matches every tag; anything else is a
/// regular expression that must match the whole tag.
#[derive(Debug, Clone)]
pub struct TagPolicy {
    pattern: Option<Regex>,
}

impl TagPolicy {
    pub fn parse(policy: &str) -> Result<Self, regex::Error> {
        let policy = policy.trim();
        if policy.is_empty() {
            return Ok(Self { pattern: None });
        }
        let pattern = Regex::new(&format!("^(?:{policy})$"))?;
        Ok(Self { pattern: Some(pattern) })
    }

    pub fn matches(&self, tag: &str) -> bool {
        self.pattern.as_ref().map_or(true, |p| p.is_match(tag))
    }

    /// The newest `size` matching tags, in the order upstream listed them.
    ///
    /// Registries list tags oldest first, so the newest are the tail.
    pub fn select(&self, tags: Vec<String>, size: usize) -> Vec<String> {
        let mut matched: Vec<String> = tags.into_iter().filter(|t| self.matches(t)).collect();
        let excess = matched.len().saturating_sub(size);
        matched.drain(..excess);
        matched
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
