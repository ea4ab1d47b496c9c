//! Freezer tuning knobs.

use std::time::Duration;

/// Configuration for a [`Freezer`](crate::Freezer).
///
/// # Examples
///
/// ```
/// use quiesce::FreezerConfig;
/// use std::time::Duration;
///
/// let config = FreezerConfig::default();
/// assert!(config.cancel_on_reentry);
/// assert_eq!(config.poll_timeout, Duration::from_secs(20));
///
/// let strict = FreezerConfig {
///     cancel_on_reentry: false,
///     ..FreezerConfig::default()
/// };
/// assert!(!strict.cancel_on_reentry);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezerConfig {
    /// Whether a pending stop request may abort a refrigerator pass that was
    /// re-entered after a freezing condition reappeared during exit. When
    /// false, only the first pass honors `allow_cancel`.
    pub cancel_on_reentry: bool,
    /// Deadline used by [`Freezer::freeze_registered`](crate::Freezer::freeze_registered).
    pub poll_timeout: Duration,
}

impl Default for FreezerConfig {
    fn default() -> Self {
        Self {
            cancel_on_reentry: true,
            poll_timeout: Duration::from_secs(20),
        }
    }
}
