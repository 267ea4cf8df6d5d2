//! Maps a failure onto the categories the retry loop reacts to.

use crate::error::{BrowserError, ErrorKind};

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out"];
const NAVIGATION_MARKERS: &[&str] = &["navigation"];
const CONNECTION_MARKERS: &[&str] = &["net::", "connection", "network"];
const DETACHED_MARKERS: &[&str] = &[
    "frame",
    "detached",
    "session closed",
    "target closed",
    "protocol error",
];
const CAPTCHA_MARKERS: &[&str] = &["captcha", "challenge"];

/// Categories of a single failure. Several flags may be set at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorClassification {
    pub is_timeout: bool,
    pub is_navigation: bool,
    pub is_connection: bool,
    pub is_detached_frame: bool,
    pub is_captcha: bool,
    pub consecutive_timeouts: u32,
    pub consecutive_navigation_errors: u32,
}

fn contains_any(message: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| message.contains(m))
}

/// Classify an error. The typed kind sets its own flag; message markers are
/// matched as well so untyped driver errors still land in a category.
pub fn classify(
    error: &BrowserError,
    consecutive_timeouts: u32,
    consecutive_navigation_errors: u32,
) -> ErrorClassification {
    let message = error.to_string().to_lowercase();
    let kind = error.kind();

    ErrorClassification {
        is_timeout: kind == ErrorKind::Timeout || contains_any(&message, TIMEOUT_MARKERS),
        is_navigation: kind == ErrorKind::Navigation
            || contains_any(&message, NAVIGATION_MARKERS),
        is_connection: kind == ErrorKind::Connection
            || contains_any(&message, CONNECTION_MARKERS),
        is_detached_frame: kind == ErrorKind::DetachedFrame
            || contains_any(&message, DETACHED_MARKERS),
        is_captcha: kind == ErrorKind::Captcha || contains_any(&message, CAPTCHA_MARKERS),
        consecutive_timeouts,
        consecutive_navigation_errors,
    }
}

pub fn is_timeout(error: &BrowserError) -> bool {
    classify(error, 0, 0).is_timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_message_is_detached_frame() {
        let c = classify(
            &BrowserError::Driver("Execution context detached".into()),
            0,
            0,
        );
        assert!(c.is_detached_frame);
        assert!(!c.is_timeout);
    }

    #[test]
    fn typed_kind_sets_flag_without_markers() {
        let c = classify(&BrowserError::DetachedFrame("gone".into()), 0, 0);
        assert!(c.is_detached_frame);

        let c = classify(&BrowserError::Connection("reset by peer".into()), 0, 0);
        assert!(c.is_connection);
    }

    #[test]
    fn markers_are_case_insensitive() {
        let c = classify(&BrowserError::Driver("Navigation Timeout Exceeded".into()), 0, 0);
        assert!(c.is_timeout);
        assert!(c.is_navigation);
    }

    #[test]
    fn connection_markers() {
        for msg in ["net::ERR_CONNECTION_RESET", "Network changed", "connection refused"] {
            assert!(classify(&BrowserError::Driver(msg.into()), 0, 0).is_connection, "{}", msg);
        }
    }

    #[test]
    fn protocol_markers_count_as_detached() {
        for msg in ["Session closed.", "Target closed", "Protocol error (Runtime.evaluate)"] {
            assert!(classify(&BrowserError::Driver(msg.into()), 0, 0).is_detached_frame, "{}", msg);
        }
    }

    #[test]
    fn captcha_markers() {
        let c = classify(&BrowserError::Driver("Cloudflare challenge page".into()), 0, 0);
        assert!(c.is_captcha);
    }

    #[test]
    fn counters_are_threaded_through() {
        let c = classify(&BrowserError::Driver("boom".into()), 3, 2);
        assert_eq!(c.consecutive_timeouts, 3);
        assert_eq!(c.consecutive_navigation_errors, 2);
        assert!(!c.is_timeout && !c.is_navigation && !c.is_connection);
    }
}
