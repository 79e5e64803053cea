//! Error kinds shared by both backend tiers and the allocator.

/// Error type for id allocation.
///
/// `EmptyList` is the only variant the allocator recovers from; everything
/// else is reported to the caller. Misconfiguration (an unregistered
/// provider name) and broken invariants panic instead; they cannot be
/// handled at request time.
#[derive(Debug)]
pub enum IdError {
    /// The cache-tier list for a group yielded no element.
    EmptyList { group: String },
    /// Empty group name, zero bounds, or an inverted range.
    InvalidArgument(String),
    /// Pool acquisition timed out or a backend round-trip failed.
    BackendUnavailable(String),
    /// A backend handed back a value that is not a decimal u64.
    BackendCorruption(String),
    /// A provider with the same name is already registered.
    DuplicateProvider(String),
}

impl std::fmt::Display for IdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdError::EmptyList { group } => write!(f, "the id list of group '{}' is empty", group),
            IdError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            IdError::BackendUnavailable(msg) => write!(f, "backend unavailable: {}", msg),
            IdError::BackendCorruption(msg) => write!(f, "backend corruption: {}", msg),
            IdError::DuplicateProvider(name) => {
                write!(f, "a provider named '{}' is already registered", name)
            }
        }
    }
}

impl std::error::Error for IdError {}

impl IdError {
    /// True for the recoverable "queue exhausted" signal.
    pub fn is_empty_list(&self) -> bool {
        matches!(self, IdError::EmptyList { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_distinguishable_by_kind() {
        let err = IdError::EmptyList {
            group: "g".to_string(),
        };
        assert!(err.is_empty_list());
        assert!(!IdError::InvalidArgument("x".to_string()).is_empty_list());
    }

    #[test]
    fn display_carries_context() {
        let err = IdError::DuplicateProvider("redis-cache".to_string());
        assert!(err.to_string().contains("redis-cache"));
    }
}
