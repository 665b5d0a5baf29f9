use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use log::{debug, warn};

/// Request count for one key within its current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow
{   pub count: u32
  , pub window_start: Instant
}

#[derive(Debug)]
struct LimiterState
{   windows: HashMap<String, RateWindow>
  , last_sweep: Instant
}

/// Fixed-window counter keyed by client identity
#[derive(Debug)]
pub struct RateLimiter
{   state: Mutex<LimiterState>
  , max_requests: u32
  , window: Duration
}

impl RateLimiter
{   pub fn new(max_requests: u32, window: Duration) -> Self
    {   debug!(
          "Creating RateLimiter: {} requests per {:?}"
        , max_requests
        , window
        );
        RateLimiter
        {   state: Mutex::new(LimiterState
            {   windows: HashMap::new()
              , last_sweep: Instant::now()
            })
          , max_requests
          , window
        }
    }

    pub fn from_config(config: &crate::config::RateLimitConfig) -> Self
    {   RateLimiter::new(config.max_requests, config.window())
    }

    /// Count one request for `key` and decide whether it may proceed
    pub fn check(&self, key: &str) -> Result<(), crate::error::Error>
    {   self.check_at(key, Instant::now())
    }

    /// [`RateLimiter::check`] against an explicit clock reading
    pub fn check_at(
      &self
    , key: &str
    , now: Instant
    ) -> Result<(), crate::error::Error>
    {   let mut state = self.state
          .lock()
          .unwrap_or_else(|p| p.into_inner());

        if now.saturating_duration_since(state.last_sweep) >= self.window
        {   self.sweep(&mut state.windows, now);
            state.last_sweep = now;
        }

        let window = state.windows
          .entry(key.to_string())
          .or_insert(RateWindow
          {   count: 0
            , window_start: now
          });

        if now.saturating_duration_since(window.window_start) >= self.window
        {   window.count = 0;
            window.window_start = now;
        }

        window.count = window.count.saturating_add(1);
        if window.count > self.max_requests
        {   warn!(
              "Rate limit exceeded for {} ({} requests in window)"
            , key
            , window.count
            );
            return Err(crate::error::Error::RateLimitExceeded);
        }
        Ok(())
    }

    /// Requests counted for `key` in its live window
    pub fn count(&self, key: &str) -> u32
    {   let now = Instant::now();
        let state = self.state
          .lock()
          .unwrap_or_else(|p| p.into_inner());
        state.windows
          .get(key)
          .filter(|w| now.saturating_duration_since(w.window_start) < self.window)
          .map(|w| w.count)
          .unwrap_or(0)
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize
    {   self.state
          .lock()
          .unwrap_or_else(|p| p.into_inner())
          .windows
          .len()
    }

    fn sweep(&self, windows: &mut HashMap<String, RateWindow>, now: Instant)
    {   let before = windows.len();
        windows.retain(|_, w| {
          now.saturating_duration_since(w.window_start) < self.window
        });
        let removed = before - windows.len();
        if removed > 0
        {   debug!("Swept {} expired rate windows", removed);
        }
    }
}
