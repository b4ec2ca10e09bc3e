use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MIN_HZ: f64 = 0.001;

/// Fixed-rate pacer for blocking loops.
#[derive(Debug)]
pub struct TickRate {
    period: Duration,
    next: Instant,
}

impl TickRate {
    pub fn new(hz: f64) -> Self {
        let period = Duration::from_secs_f64(1.0 / hz.max(MIN_HZ));
        Self { period, next: Instant::now() + period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleep until the next tick boundary. After an overrun longer than a
    /// full period the schedule restarts from now instead of bursting.
    pub fn sleep(&mut self) {
        let now = Instant::now();
        if now < self.next {
            std::thread::sleep(self.next - now);
            self.next += self.period;
        } else if now - self.next > self.period {
            self.next = now + self.period;
        } else {
            self.next += self.period;
        }
    }
}

/// Process-wide stop request, observed once per tick by every blocking loop.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifty_hz_is_twenty_ms() {
        assert_eq!(TickRate::new(50.0).period(), Duration::from_millis(20));
    }

    #[test]
    fn sleep_keeps_cadence() {
        let mut rate = TickRate::new(200.0);
        let start = Instant::now();
        for _ in 0..10 {
            rate.sleep();
        }
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn shutdown_is_shared_between_clones() {
        let a = Shutdown::new();
        let b = a.clone();
        assert!(!b.is_requested());
        a.request();
        assert!(b.is_requested());
    }
}
