//! Process-wide "connection is slow" gate.
//!
//! At most one slow notice is visible at a time, and a new one may not appear
//! within the cooldown of the previous one. Only the executor mutates it.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct SlowState {
    active: bool,
    cooldown_until: Option<Instant>,
}

/// Shared slow-notice flag.
#[derive(Debug, Default)]
pub struct SlowSignal {
    state: Mutex<SlowState>,
}

impl SlowSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to show a slow notice.
    ///
    /// Succeeds only if no notice is active and the previous cooldown has
    /// passed; on success the signal becomes active and the cooldown restarts.
    pub fn try_activate(&self, now: Instant, cooldown: Duration) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let cooled = state.cooldown_until.is_none_or(|until| now > until);
        if state.active || !cooled {
            return false;
        }
        state.active = true;
        state.cooldown_until = Some(now + cooldown);
        true
    }

    /// Clear the active flag. The cooldown is left untouched.
    pub fn release(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.active = false;
        }
    }

    /// Whether a slow notice is currently showing.
    pub fn is_active(&self) -> bool {
        self.state.lock().map(|s| s.active).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_activation_succeeds() {
        let signal = SlowSignal::new();
        assert!(signal.try_activate(Instant::now(), Duration::from_secs(15)));
        assert!(signal.is_active());
    }

    #[test]
    fn second_activation_blocked_while_active() {
        let signal = SlowSignal::new();
        let now = Instant::now();
        assert!(signal.try_activate(now, Duration::ZERO));
        assert!(!signal.try_activate(now + Duration::from_secs(60), Duration::ZERO));
    }

    #[test]
    fn cooldown_blocks_after_release() {
        let signal = SlowSignal::new();
        let now = Instant::now();
        assert!(signal.try_activate(now, Duration::from_secs(15)));
        signal.release();
        assert!(!signal.is_active());
        assert!(!signal.try_activate(now + Duration::from_secs(10), Duration::from_secs(15)));
        assert!(signal.try_activate(now + Duration::from_secs(16), Duration::from_secs(15)));
    }
}
