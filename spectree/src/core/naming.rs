//! Display-name rules for declared nodes.

use std::collections::HashSet;

/// Rewrite parentheses to square brackets.
///
/// Reporting layers use `name(context)` as a delimiter convention, so
/// parentheses inside display names would be misread.
pub fn sanitise(name: &str) -> String {
    name.replace('(', "[").replace(')', "]")
}

/// Names already claimed by the children of one suite.
#[derive(Debug, Clone, Default)]
pub struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    /// Claim a display name for a new child, suffixing `_1`, `_2`, ... on collision.
    pub fn claim(&mut self, name: &str) -> String {
        let base = sanitise(name);
        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }

    pub fn clear(&mut self) {
        self.taken.clear();
    }
}
