//! Which files of a commit are staged.

/// Per-path admission policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterPolicy {
    /// Reject paths starting with any of these prefixes; admit the rest.
    /// An empty list admits everything.
    ExcludePrefixes(Vec<String>),
    /// Admit only paths exactly equal to one of these names.
    AllowList(Vec<String>),
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::ExcludePrefixes(Vec::new())
    }
}

impl FilterPolicy {
    /// `true` if `path` belongs in the staged set.
    #[must_use]
    pub fn admits(&self, path: &str) -> bool {
        match self {
            Self::ExcludePrefixes(prefixes) => !prefixes.iter().any(|p| path.starts_with(p.as_str())),
            Self::AllowList(names) => names.iter().any(|n| n == path),
        }
    }
}
