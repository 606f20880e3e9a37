//! Feature flags for optional functionality.

/// Feature flags for the suggestion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Analyze the prompt automatically while the user types.
    ///
    /// When disabled, only manual "ask for help" requests reach the analyzer.
    pub auto_suggestions: bool,
    /// Offer "show me" demonstrations on the active chip.
    pub show_me: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl FeatureFlags {
    /// Creates feature flags with all features disabled.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            auto_suggestions: false,
            show_me: false,
        }
    }

    /// Creates feature flags with all features enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            auto_suggestions: true,
            show_me: true,
        }
    }
}
