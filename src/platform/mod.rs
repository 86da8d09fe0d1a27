//! # Platform primitives for the MQTT session
//!
//! The session needs exactly one thing from the platform: a countdown
//! timer over a monotonic, millisecond-resolution clock. Two long-lived
//! timers pace the keep-alive machinery, and every synchronous API call
//! arms a fresh one as its deadline. Timers are created through
//! [`Default`] and are born expired, matching a countdown that was never
//! started.
//!
//! On hosted platforms the `std` feature provides `SysTimer`, backed by
//! `std::time::Instant`. Embedded targets implement [`Timer`] on top of
//! their tick source (SysTick, a hardware timer, an RTOS tick count).

/// A monotonic countdown timer with millisecond resolution.
///
/// # Examples
///
/// ```rust
/// use libmqtt::platform::Timer;
///
/// fn wait_budget<T: Timer + Default>(ms: u32) -> u32 {
///     let mut timer = T::default();
///     timer.countdown(ms);
///     timer.left()
/// }
/// ```
pub trait Timer {
    /// Start (or restart) the countdown with the given number of
    /// milliseconds.
    fn countdown(&mut self, ms: u32);

    /// Milliseconds remaining until expiry; 0 once expired or when the
    /// countdown was never started.
    fn left(&self) -> u32;

    /// Whether the countdown has run out.
    fn expired(&self) -> bool;
}

/// A [`Timer`] backed by `std::time::Instant`.
#[cfg(feature = "std")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SysTimer {
    deadline: Option<std::time::Instant>,
}

#[cfg(feature = "std")]
impl Timer for SysTimer {
    fn countdown(&mut self, ms: u32) {
        let now = std::time::Instant::now();
        self.deadline = Some(now + std::time::Duration::from_millis(u64::from(ms)));
    }

    fn left(&self) -> u32 {
        match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                u32::try_from(remaining.as_millis()).unwrap_or(u32::MAX)
            }
            None => 0,
        }
    }

    fn expired(&self) -> bool {
        self.left() == 0
    }
}
