use chrono::{DateTime, Utc};

/// Port for time abstraction
///
/// Volume-profile windowing quantizes on the wall-clock minute, so tests
/// need to pin the clock to exercise window rollover deterministically.
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock for production use
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let time1 = clock.now();
        thread::sleep(std::time::Duration::from_millis(5));
        let time2 = clock.now();
        assert!(time2 > time1);
    }
}
