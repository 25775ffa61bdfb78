//! Centralized configuration for Ripple.
//!
//! All tunable parameters of the comment extension are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

use crate::comment::TimestampPolicy;

/// Extension name advertised in the BEP 10 handshake.
pub const COMMENT_EXTENSION_NAME: &str = "ut_comment";

/// Central configuration for all Ripple components.
#[derive(Debug, Clone, Default)]
pub struct RippleConfig {
    pub comments: CommentConfig,
}

/// `ut_comment` protocol configuration.
///
/// Controls the advertised extension name, how many comments are requested
/// from peers, how often the request is repeated, and how stored timestamps
/// are aged when sent.
#[derive(Debug, Clone)]
pub struct CommentConfig {
    /// Name matched against the peer's extension map
    pub extension_name: String,
    /// Comment count asked for in every request
    pub request_count: usize,
    /// Interval between repeated requests on an active session
    pub refresh_interval: Duration,
    /// Timestamp aging for stores built with `CommentStore::from_config`.
    /// Sessions never read it; they age comments with their store's policy.
    pub timestamp_policy: TimestampPolicy,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            extension_name: COMMENT_EXTENSION_NAME.to_string(),
            request_count: 20,
            refresh_interval: Duration::from_secs(20 * 60), // 20 minutes
            timestamp_policy: TimestampPolicy::RewriteOnRead,
        }
    }
}

impl CommentConfig {
    /// Creates a configuration for deterministic testing.
    ///
    /// Uses the non-destructive timestamp policy so repeated reads in a test
    /// see stable ages.
    pub fn for_testing() -> Self {
        Self {
            timestamp_policy: TimestampPolicy::PreserveCreation,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RippleConfig::default();

        assert_eq!(config.comments.extension_name, "ut_comment");
        assert_eq!(config.comments.request_count, 20);
        assert_eq!(config.comments.refresh_interval, Duration::from_secs(1200));
        assert_eq!(
            config.comments.timestamp_policy,
            TimestampPolicy::RewriteOnRead
        );
    }

    #[test]
    fn test_testing_config() {
        let config = CommentConfig::for_testing();
        assert_eq!(config.timestamp_policy, TimestampPolicy::PreserveCreation);
        assert_eq!(config.request_count, 20);
    }
}
