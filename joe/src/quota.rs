//! Sliding-window request quota.

use std::time::Instant;

use crate::error::EngineError;
use crate::model::Quota;

impl Quota {
    /// Consume one request against the window, rolling the window
    /// forward once `interval` has elapsed since `window_start`.
    pub fn request(&mut self, now: Instant) -> Result<(), EngineError> {
        if now.duration_since(self.window_start) >= self.interval {
            self.window_start = now;
            self.count = 0;
        }

        if self.count >= self.limit {
            let secs = self.interval.as_secs();
            let plural = if secs == 1 { "" } else { "s" };
            return Err(EngineError::RateLimit(format!(
                "You have reached the limit of requests per {secs} second{plural} ({}). \
                 Please wait before trying again",
                self.limit
            )));
        }

        self.count += 1;
        Ok(())
    }
}
