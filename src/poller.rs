// Periodic re-evaluation of the timeline against a cached schedule

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use log::{debug, info};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::{
    PitwallError,
    schedule::ResolvedSchedule,
    timeline::{Clock, TimelineEngine, TimelineState},
};

struct Shared {
    schedule: ResolvedSchedule,
    active: bool,
    state_tx: watch::Sender<TimelineState>,
}

/// Re-evaluates a cached schedule on a fixed interval and publishes the resulting
/// [`TimelineState`] to subscribers.
///
/// The poller never fetches. A reloaded schedule must be pushed in with
/// [`Poller::set_schedule`]. Publishing happens under the same lock that [`Poller::stop`]
/// takes, so once `stop` returns no subscriber sees another update. Dropping the poller stops it.
///
/// [`Poller::current`] and [`Poller::subscribe`] never touch that lock or the channel's value
/// lock, so a subscriber may call them while holding a `borrow()` of its receiver. Holding a
/// borrow still delays the next publish until it is released.
pub struct Poller {
    engine: TimelineEngine,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    shared: Arc<Mutex<Shared>>,
    latest: Arc<Mutex<TimelineState>>,
    state_rx: watch::Receiver<TimelineState>,
    cancel: Option<watch::Receiver<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn new(
        engine: TimelineEngine,
        clock: Arc<dyn Clock>,
        schedule: ResolvedSchedule,
        tick_interval: Duration,
    ) -> Self {
        let initial = engine.evaluate_resolved(&schedule, clock.now());
        let (state_tx, state_rx) = watch::channel(initial.clone());
        Self {
            engine,
            clock,
            tick_interval,
            shared: Arc::new(Mutex::new(Shared {
                schedule,
                active: false,
                state_tx,
            })),
            latest: Arc::new(Mutex::new(initial)),
            state_rx,
            cancel: None,
            task: None,
        }
    }

    /// Stop ticking as soon as `cancel` turns `true` or its sender goes away.
    pub fn cancel_on(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Begin ticking. The first evaluation happens immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), PitwallError> {
        if self.is_running() {
            return Err(PitwallError::PollerAlreadyRunning);
        }

        self.lock().active = true;

        let shared = self.shared.clone();
        let latest = self.latest.clone();
        let clock = self.clock.clone();
        let engine = self.engine;
        let tick_interval = self.tick_interval;
        let mut cancel = self.cancel.clone();

        debug!("Starting timeline poller every {:?}", tick_interval);
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                match cancel.as_mut() {
                    Some(cancel) => {
                        tokio::select! {
                            biased;
                            _ = cancelled(cancel) => break,
                            _ = interval.tick() => {}
                        }
                    }
                    None => {
                        interval.tick().await;
                    }
                }
                if !publish(&shared, &latest, &engine, clock.as_ref(), cancel.as_ref()) {
                    break;
                }
            }
            debug!("Timeline poller task finished");
        }));
        Ok(())
    }

    /// Stop ticking. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.lock().active = false;
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Timeline poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Replace the cached schedule. While running, the new state is published right away.
    pub fn set_schedule(&self, schedule: ResolvedSchedule) {
        let mut shared = self.lock();
        shared.schedule = schedule;
        if shared.active {
            let next = self
                .engine
                .evaluate_resolved(&shared.schedule, self.clock.now());
            send_state(&self.latest, &shared.state_tx, next);
        }
    }

    /// A receiver that only reports states published from now on as changed.
    pub fn subscribe(&self) -> watch::Receiver<TimelineState> {
        let mut rx = self.state_rx.clone();
        rx.mark_unchanged();
        rx
    }

    /// Last published state.
    pub fn current(&self) -> TimelineState {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        let is_cancelled = *cancel.borrow_and_update();
        if is_cancelled || cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Evaluate and publish one tick. Returns `false` when the poller should exit.
fn publish(
    shared: &Mutex<Shared>,
    latest: &Mutex<TimelineState>,
    engine: &TimelineEngine,
    clock: &dyn Clock,
    cancel: Option<&watch::Receiver<bool>>,
) -> bool {
    let shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
    if !shared.active || cancel.is_some_and(|cancel| *cancel.borrow()) {
        return false;
    }
    let next = engine.evaluate_resolved(&shared.schedule, clock.now());
    send_state(latest, &shared.state_tx, next);
    true
}

/// Record `next` as the latest state and publish it unless it equals the previous one.
///
/// The `latest` lock is released before the channel's value lock is taken.
fn send_state(
    latest: &Mutex<TimelineState>,
    state_tx: &watch::Sender<TimelineState>,
    next: TimelineState,
) {
    let previous = {
        let mut latest = latest.lock().unwrap_or_else(PoisonError::into_inner);
        if *latest == next {
            return;
        }
        std::mem::replace(&mut *latest, next.clone())
    };
    if previous.phase() != next.phase() {
        info!(
            "Timeline moved from {:?} to {:?} ({})",
            previous.phase(),
            next.phase(),
            next.active_session()
                .map(|session| session.name.as_str())
                .unwrap_or("no session")
        );
    }
    state_tx.send_replace(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{Schedule, ScheduleTier, Session};
    use crate::timeline::Phase;
    use chrono::{DateTime, TimeZone, Utc};

    /// Wall clock that follows tokio's (pausable) time.
    struct TokioClock {
        origin: DateTime<Utc>,
        started: tokio::time::Instant,
    }

    impl TokioClock {
        fn new(origin: DateTime<Utc>) -> Self {
            Self {
                origin,
                started: tokio::time::Instant::now(),
            }
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = tokio::time::Instant::now() - self.started;
            self.origin + chrono::Duration::from_std(elapsed).unwrap()
        }
    }

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 23, 13, 0, 0).unwrap()
    }

    fn single_session(offset_s: i64) -> ResolvedSchedule {
        ResolvedSchedule::Sessions {
            schedule: Schedule::new(vec![Session::new(
                "Race",
                Some(origin() + chrono::Duration::seconds(offset_s)),
            )]),
            tier: ScheduleTier::Full,
        }
    }

    fn poller(engine: TimelineEngine, schedule: ResolvedSchedule) -> Poller {
        Poller::new(
            engine,
            Arc::new(TokioClock::new(origin())),
            schedule,
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_down_once_per_second() {
        let mut poller = poller(TimelineEngine::default(), single_session(10));
        let mut rx = poller.subscribe();
        assert_eq!(rx.borrow_and_update().seconds_remaining(), 10);

        poller.start().unwrap();
        let mut seen = Vec::new();
        for _ in 0..5 {
            rx.changed().await.unwrap();
            seen.push(rx.borrow_and_update().seconds_remaining());
        }

        assert_eq!(seen, vec![9, 8, 7, 6, 5]);
        poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_walks_through_phases() {
        let engine = TimelineEngine::new(chrono::Duration::seconds(2));
        let mut poller = poller(engine, single_session(2));
        let mut rx = poller.subscribe();
        poller.start().unwrap();

        let mut phases = vec![rx.borrow_and_update().phase()];
        while phases.last() != Some(&Phase::Completed) {
            rx.changed().await.unwrap();
            let phase = rx.borrow_and_update().phase();
            if phases.last() != Some(&phase) {
                phases.push(phase);
            }
        }

        assert_eq!(phases, vec![Phase::Future, Phase::Running, Phase::Completed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_updates_after_stop() {
        let mut poller = poller(TimelineEngine::default(), single_session(3600));
        let mut rx = poller.subscribe();
        poller.start().unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(poller.is_running());
        poller.stop();
        poller.stop();
        assert!(!poller.is_running());

        rx.borrow_and_update();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!rx.has_changed().unwrap());
        assert_eq!(poller.current().seconds_remaining(), 3597);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_signal_stops_ticking() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut poller =
            poller(TimelineEngine::default(), single_session(3600)).cancel_on(cancel_rx);
        let mut rx = poller.subscribe();
        poller.start().unwrap();

        rx.changed().await.unwrap();
        cancel_tx.send_replace(true);
        rx.borrow_and_update();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!rx.has_changed().unwrap());
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pushed_schedule_is_published_immediately() {
        let mut poller = poller(TimelineEngine::default(), ResolvedSchedule::Unavailable);
        assert_eq!(poller.current(), TimelineState::Unknown);
        poller.start().unwrap();

        poller.set_schedule(single_session(60));
        assert_eq!(poller.current().phase(), Phase::Future);

        poller.set_schedule(ResolvedSchedule::SeasonFinished);
        assert_eq!(poller.current(), TimelineState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let mut poller = poller(TimelineEngine::default(), single_session(60));
        poller.start().unwrap();
        assert!(matches!(
            poller.start(),
            Err(PitwallError::PollerAlreadyRunning)
        ));

        poller.stop();
        assert!(poller.start().is_ok());
    }

    /// Moves one second forward on every reading, so every tick publishes a new state.
    struct SteppingClock {
        origin: DateTime<Utc>,
        readings: std::sync::atomic::AtomicI64,
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let step = self
                .readings
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.origin + chrono::Duration::seconds(step)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_current_while_holding_a_borrow() {
        let clock = SteppingClock {
            origin: origin(),
            readings: std::sync::atomic::AtomicI64::new(0),
        };
        let mut poller = Poller::new(
            TimelineEngine::default(),
            Arc::new(clock),
            single_session(3600),
            Duration::from_millis(1),
        );
        let rx = poller.subscribe();
        poller.start().unwrap();

        for _ in 0..50 {
            let held = rx.borrow();
            // give the ticker time to block on the value lock
            std::thread::sleep(Duration::from_millis(3));
            assert_eq!(poller.current().phase(), Phase::Future);
            let _late = poller.subscribe();
            assert_eq!(held.phase(), Phase::Future);
        }

        assert!(poller.is_running());
        poller.stop();
        assert!(poller.current().seconds_remaining() < 3600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_skips_already_published_states() {
        let mut poller = poller(TimelineEngine::default(), single_session(60));
        poller.start().unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let rx = poller.subscribe();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(*rx.borrow(), poller.current());
        assert_eq!(poller.current().seconds_remaining(), 58);
    }
}
