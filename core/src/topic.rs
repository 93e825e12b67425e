//! Wildcard topic expansion
//!
//! A topic pattern may contain one wildcard marker (`*`). Expansion replaces
//! the marker with a leaf name `T<n>`, so `TEST.BULK.*` with a count of 3 and
//! a start of 10 becomes `TEST.BULK.T10`, `TEST.BULK.T11`, `TEST.BULK.T12`.

/// Wildcard marker substituted during expansion
pub const WILDCARD: char = '*';

/// Number of wildcard markers in `pattern`
pub fn wildcard_markers(pattern: &str) -> usize {
    pattern.matches(WILDCARD).count()
}

/// Whether `pattern` contains a wildcard marker
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(WILDCARD)
}

/// Substitute the marker in `pattern` with the leaf `T<index>`
///
/// Only the first marker is replaced; patterns with more than one marker are
/// rejected by `RunConfig::validate`.
pub fn leaf_topic(pattern: &str, index: usize) -> String {
    pattern.replacen(WILDCARD, &format!("T{index}"), 1)
}

/// Expand a topic pattern into its concrete topic list
///
/// Returns `[pattern]` unchanged when the pattern has no marker or
/// `count == 0`; the broker is then expected to accept the literal pattern.
/// Otherwise returns `count` topics in leaf index order starting at `start`.
pub fn expand(pattern: &str, count: usize, start: usize) -> Vec<String> {
    if count == 0 || !has_wildcard(pattern) {
        return vec![pattern.to_string()];
    }

    (0..count).map(|i| leaf_topic(pattern, start + i)).collect()
}

/// Expand several patterns, concatenating the results in pattern order
pub fn expand_all<S: AsRef<str>>(patterns: &[S], count: usize, start: usize) -> Vec<String> {
    patterns
        .iter()
        .flat_map(|pattern| expand(pattern.as_ref(), count, start))
        .collect()
}

/// Round-robin router over the leaves of one pattern
///
/// Applies the same substitution as [`expand`], one topic per call, cycling
/// back to `start` after `count` leaves. With no marker or `count == 0` every
/// call yields the base pattern.
#[derive(Debug, Clone)]
pub struct TopicCycle {
    base: String,
    count: usize,
    start: usize,
    next_leaf: usize,
}

impl TopicCycle {
    /// Create a router for `base`
    pub fn new(base: impl Into<String>, count: usize, start: usize) -> Self {
        let base = base.into();
        let count = if has_wildcard(&base) { count } else { 0 };
        Self {
            base,
            count,
            start,
            next_leaf: 0,
        }
    }

    /// Base pattern this router was created for
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Number of distinct topics this router yields
    pub fn len(&self) -> usize {
        self.count.max(1)
    }

    /// Always false; a router yields at least the base topic
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Route the next topic to the first leaf again
    ///
    /// Called at the start of every burst, so each burst begins at `T<start>`.
    pub fn restart(&mut self) {
        self.next_leaf = 0;
    }

    /// Next topic in round-robin order
    pub fn next_topic(&mut self) -> String {
        if self.count == 0 {
            return self.base.clone();
        }

        let topic = leaf_topic(&self.base, self.start + self.next_leaf);
        self.next_leaf += 1;
        if self.next_leaf >= self.count {
            self.next_leaf = 0;
        }
        topic
    }
}
