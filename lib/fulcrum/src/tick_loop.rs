//! Fixed-rate tick loop: a dedicated worker thread driving a tick callback at
//! `tickRate` ticks per second with monotonic deadline arithmetic
//! (`nextTick += targetFrameTime`), expressed as a `std::thread` worker
//! dedicated to one long-running service.

use slog::Logger;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, Default)]
pub struct TickMetrics {
    pub tick_number: u64,
    pub update_time: Duration,
    pub frame_time: Duration,
    pub budget_utilization: f64,
    pub overrun: bool,
}

type TickCallback = dyn FnMut(f64) + Send;
type MetricsObserver = dyn Fn(TickMetrics) + Send + Sync;

/// Dedicated-thread fixed-rate scheduler. `tickRate` of 0 is treated as 20.
pub struct TickLoop {
    target_frame_time: Duration,
    running: Arc<AtomicBool>,
    tick_number: Arc<AtomicU64>,
    last_metrics: Arc<Mutex<TickMetrics>>,
    callback: Arc<Mutex<Box<TickCallback>>>,
    observer: Arc<Mutex<Option<Box<MetricsObserver>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    log: Logger,
}

impl TickLoop {
    pub fn new(tick_rate: u32, callback: impl FnMut(f64) + Send + 'static, log: &Logger) -> Self {
        let effective_rate = if tick_rate == 0 { 20 } else { tick_rate };
        TickLoop {
            target_frame_time: Duration::from_secs_f64(1.0 / effective_rate as f64),
            running: Arc::new(AtomicBool::new(false)),
            tick_number: Arc::new(AtomicU64::new(0)),
            last_metrics: Arc::new(Mutex::new(TickMetrics::default())),
            callback: Arc::new(Mutex::new(Box::new(callback))),
            observer: Arc::new(Mutex::new(None)),
            handle: Mutex::new(None),
            log: log.new(slog::o!("component" => "tick_loop")),
        }
    }

    pub fn set_metrics_observer(&self, observer: impl Fn(TickMetrics) + Send + Sync + 'static) {
        *self.observer.lock().unwrap() = Some(Box::new(observer));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_metrics(&self) -> TickMetrics {
        *self.last_metrics.lock().unwrap()
    }

    /// Launch the dedicated worker thread. Returns false if already running.
    pub fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let running = self.running.clone();
        let tick_number = self.tick_number.clone();
        let last_metrics = self.last_metrics.clone();
        let callback = self.callback.clone();
        let observer = self.observer.clone();
        let target_frame_time = self.target_frame_time;
        let log = self.log.clone();

        let join_handle = std::thread::spawn(move || {
            let mut next_tick = Instant::now();
            while running.load(Ordering::SeqCst) {
                next_tick += target_frame_time;

                let metrics = run_one_tick(&tick_number, &callback, target_frame_time);
                *last_metrics.lock().unwrap() = metrics;
                if metrics.overrun {
                    slog::warn!(log, "tick overrun"; "tick" => metrics.tick_number, "update_time_us" => metrics.update_time.as_micros() as u64);
                }
                if let Some(observer) = observer.lock().unwrap().as_ref() {
                    observer(metrics);
                }

                let now = Instant::now();
                if now < next_tick {
                    std::thread::sleep(next_tick - now);
                } else {
                    next_tick = now;
                }
            }
        });

        *self.handle.lock().unwrap() = Some(join_handle);
        true
    }

    /// Stop the worker and join it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Run a single iteration synchronously. Callable only while the worker
    /// is not running.
    pub fn tick(&self) -> Option<TickMetrics> {
        if self.is_running() {
            return None;
        }
        let metrics = run_one_tick(&self.tick_number, &self.callback, self.target_frame_time);
        *self.last_metrics.lock().unwrap() = metrics;
        if let Some(observer) = self.observer.lock().unwrap().as_ref() {
            observer(metrics);
        }
        Some(metrics)
    }
}

fn run_one_tick(tick_number: &AtomicU64, callback: &Mutex<Box<TickCallback>>, target_frame_time: Duration) -> TickMetrics {
    let dt = target_frame_time.as_secs_f64();
    let start = Instant::now();
    (callback.lock().unwrap())(dt);
    let end = Instant::now();

    let update_time = end - start;
    TickMetrics {
        tick_number: tick_number.fetch_add(1, Ordering::SeqCst),
        update_time,
        frame_time: update_time,
        budget_utilization: update_time.as_secs_f64() / target_frame_time.as_secs_f64(),
        overrun: update_time > target_frame_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn tick_is_callable_synchronously_when_not_running() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let loop_ = TickLoop::new(20, move |_dt| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }, &test_logger());

        let metrics = loop_.tick().unwrap();
        assert_eq!(metrics.tick_number, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tick_number_increments_monotonically() {
        let loop_ = TickLoop::new(20, |_dt| {}, &test_logger());
        let first = loop_.tick().unwrap();
        let second = loop_.tick().unwrap();
        assert_eq!(first.tick_number, 0);
        assert_eq!(second.tick_number, 1);
    }

    #[test]
    fn zero_tick_rate_is_treated_as_20() {
        let loop_ = TickLoop::new(0, |_dt| {}, &test_logger());
        assert_eq!(loop_.target_frame_time, Duration::from_secs_f64(1.0 / 20.0));
    }

    #[test]
    fn start_twice_returns_false_on_second_call() {
        let loop_ = TickLoop::new(1000, |_dt| {}, &test_logger());
        assert!(loop_.start());
        assert!(!loop_.start());
        loop_.stop();
    }

    #[test]
    fn tick_returns_none_while_worker_running() {
        let loop_ = TickLoop::new(50, |_dt| {}, &test_logger());
        loop_.start();
        assert!(loop_.tick().is_none());
        loop_.stop();
    }

    #[test]
    fn overrun_flag_set_when_update_exceeds_budget() {
        let loop_ = TickLoop::new(1_000_000, |_dt| {
            std::thread::sleep(Duration::from_millis(5));
        }, &test_logger());
        let metrics = loop_.tick().unwrap();
        assert!(metrics.overrun);
    }
}
