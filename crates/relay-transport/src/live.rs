//! Live-stream module interface.
//!
//! A live-stream module owns its whole send path: it pulls frames from the
//! frame source itself once started. Callers only set the URL, start, stop
//! and read an integer result code.

/// Result codes returned by [`LiveStreamModule::start_stream`].
pub mod result_code {
    /// Stream started.
    pub const SUCCESS: i32 = 0;

    /// URL missing or malformed.
    pub const INVALID_URL: i32 = -1;

    /// Server unreachable or refused the session.
    pub const CONNECTION_FAILED: i32 = -2;

    /// A stream is already running.
    pub const ALREADY_STREAMING: i32 = -3;

    /// Internal runtime could not be created.
    pub const RUNTIME_FAILED: i32 = -4;

    /// Frame source refused the subscription.
    pub const FEED_UNAVAILABLE: i32 = -5;
}

/// Get a display message for a result code.
pub fn describe_result_code(code: i32) -> &'static str {
    match code {
        result_code::SUCCESS => "success",
        result_code::INVALID_URL => "invalid URL",
        result_code::CONNECTION_FAILED => "connection failed",
        result_code::ALREADY_STREAMING => "already streaming",
        result_code::RUNTIME_FAILED => "runtime failure",
        result_code::FEED_UNAVAILABLE => "frame source unavailable",
        _ => "unknown error",
    }
}

/// A self-contained live streaming module.
pub trait LiveStreamModule: Send {
    /// Set the URL used by the next `start_stream`.
    fn set_destination_url(&mut self, url: &str);

    /// Start streaming. Returns [`result_code::SUCCESS`] or a negative code.
    fn start_stream(&mut self) -> i32;

    /// Stop streaming. No-op when not streaming.
    fn stop_stream(&mut self);

    /// Returns true while the stream is running.
    fn is_streaming(&self) -> bool;

    /// Returns true if audio is published alongside video.
    fn is_audio_enabled(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_result_code() {
        assert_eq!(describe_result_code(0), "success");
        assert_eq!(describe_result_code(-2), "connection failed");
        assert_eq!(describe_result_code(42), "unknown error");
    }
}
