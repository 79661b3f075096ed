//! Calls-per-second limiter for remote requests.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

const WINDOW: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct Window {
    started: Instant,
    calls: u32,
}

/// Admits at most `max_calls_per_sec` calls per one-second window.
#[derive(Debug)]
pub struct Throttler {
    max_calls_per_sec: u32,
    window: Mutex<Window>,
}

impl Throttler {
    pub fn new(max_calls_per_sec: u32) -> Self {
        Self {
            max_calls_per_sec: max_calls_per_sec.max(1),
            window: Mutex::new(Window {
                started: Instant::now(),
                calls: 0,
            }),
        }
    }

    pub fn max_calls_per_sec(&self) -> u32 {
        self.max_calls_per_sec
    }

    /// Wait until a call slot is free, then take it.
    pub async fn acquire(&self) {
        loop {
            {
                let mut window = self.window.lock().await;
                if window.started.elapsed() >= WINDOW {
                    window.started = Instant::now();
                    window.calls = 0;
                }
                if window.calls < self.max_calls_per_sec {
                    window.calls += 1;
                    return;
                }
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}
