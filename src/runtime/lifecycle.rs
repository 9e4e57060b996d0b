use std::fmt;

/// Per-capability state machine:
/// `Uninitialized -> Initializing -> Live -> Error -> Recovering -> {Live | Fatal}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No resources held yet
    Uninitialized,
    /// Acquiring prerequisites and subscribing to the feed
    Initializing,
    /// Applying inbound events and firing hooks
    Live,
    /// A fault was detected; teardown in progress
    Error,
    /// Subscription torn down, re-running initialization
    Recovering,
    /// Retry budget exhausted; the capability is dead until relaunch
    Fatal,
}

impl Lifecycle {
    pub fn is_live(self) -> bool {
        self == Lifecycle::Live
    }

    pub fn is_fatal(self) -> bool {
        self == Lifecycle::Fatal
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Uninitialized => "UNINITIALIZED",
            Lifecycle::Initializing => "INITIALIZING",
            Lifecycle::Live => "LIVE",
            Lifecycle::Error => "ERROR",
            Lifecycle::Recovering => "RECOVERING",
            Lifecycle::Fatal => "FATAL",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_predicates() {
        assert!(Lifecycle::Live.is_live());
        assert!(!Lifecycle::Recovering.is_live());
        assert!(Lifecycle::Fatal.is_fatal());
        assert!(!Lifecycle::Error.is_fatal());
    }
}
