//! Tab title sanitizing and collision handling

use std::collections::HashSet;

/// Longest tab title the remote service accepts
pub const MAX_TAB_NAME_LEN: usize = 100;

const RESERVED: &[char] = &['[', ']', '*', '?', '/', '\\', ':'];
const FALLBACK_NAME: &str = "Sheet";

/// Make `raw` acceptable as a tab title
///
/// Reserved and control characters become `_`, surrounding whitespace and
/// apostrophes are dropped, and the result is cut to `MAX_TAB_NAME_LEN`
/// characters.
pub fn sanitize_tab_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim().trim_matches('\'').trim();
    let name = truncate_chars(trimmed, MAX_TAB_NAME_LEN);

    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect::<String>().trim_end().to_string()
}

/// Tab titles already present in the target spreadsheet
///
/// Titles compare case-insensitively, as the remote service does.
#[derive(Debug, Clone, Default)]
pub struct TabRegistry {
    taken: HashSet<String>,
}

impl TabRegistry {
    pub fn new<I, S>(existing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            taken: existing
                .into_iter()
                .map(|name| name.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }

    /// Sanitized, collision-free title for `desired`
    ///
    /// Does not reserve the title; call `insert` once the tab exists.
    pub fn unique_name(&self, desired: &str) -> String {
        let base = sanitize_tab_name(desired);
        if !self.contains(&base) {
            return base;
        }

        let mut counter = 2usize;
        loop {
            let suffix = format!(" ({})", counter);
            let room = MAX_TAB_NAME_LEN.saturating_sub(suffix.chars().count());
            let candidate = format!("{}{}", truncate_chars(&base, room), suffix);
            if !self.contains(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn insert(&mut self, name: &str) {
        self.taken.insert(name.to_lowercase());
    }
}
