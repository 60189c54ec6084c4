use std::time::Duration;

use crate::results::ResultSet;
use crate::types::BindMap;

/// Per-call execution options. Unset fields fall back to the bridge-wide
/// defaults in `BridgeConfig`.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Run the statement through the dialect translation engine.
    pub convert_syntax: Option<bool>,
    /// Run bind values through coercion (booleans to 0/1, JSON to text).
    pub convert_binds: Option<bool>,
    /// Consult and populate the statement cache.
    pub use_cache: bool,
    /// Locale for the suggested action on failures.
    pub locale: Option<String>,
    /// Per-statement timeout override.
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    #[must_use]
    pub fn with_syntax_conversion(mut self, enabled: bool) -> Self {
        self.convert_syntax = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_bind_conversion(mut self, enabled: bool) -> Self {
        self.convert_binds = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of one successful statement execution.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    /// Rows returned by a SELECT (empty for DML).
    pub rows: ResultSet,
    /// Rows affected by a DML statement.
    pub rows_affected: u64,
    /// OUT/RETURNING bind values.
    pub out_binds: BindMap,
    /// Whether the statement fingerprint was already cached.
    pub from_cache: bool,
    /// How many translation rules changed text for this statement. Zero for
    /// an untranslated call, or when translation was a silent no-op.
    pub rules_applied: usize,
}
