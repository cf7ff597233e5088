// A view-scoped timeline: one schedule cache, one engine and one poller per activation

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::watch;

use crate::{
    PitwallError,
    config::PitwallConfig,
    countdown::{TimelineDisplay, render},
    poller::{Poller, cancelled},
    schedule::{AggregatedSchedule, ScheduleSource, aggregate},
    timeline::{Clock, TimelineEngine, TimelineState},
};

/// Everything fetched when a view activates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedWeekend {
    pub aggregated: AggregatedSchedule,
    pub timezone: String,
}

/// Tears a [`WeekendView`] down from outside, e.g. from a navigation handler. Pending fetches
/// are abandoned and the view's poller exits.
#[derive(Clone)]
pub struct TeardownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl TeardownHandle {
    pub fn teardown(&self) {
        self.tx.send_replace(true);
    }
}

/// Owns the timeline of one event weekend for as long as the view showing it exists.
///
/// Nothing is shared between views: each has its own schedule cache, engine and poller, and
/// none of it outlives [`WeekendView::teardown`].
pub struct WeekendView {
    source: Arc<dyn ScheduleSource>,
    clock: Arc<dyn Clock>,
    config: PitwallConfig,
    engine: TimelineEngine,
    season: i32,
    round: u32,
    loaded: Option<LoadedWeekend>,
    poller: Option<Poller>,
    teardown_tx: Arc<watch::Sender<bool>>,
}

impl WeekendView {
    pub fn new(
        source: Arc<dyn ScheduleSource>,
        clock: Arc<dyn Clock>,
        config: PitwallConfig,
        season: i32,
        round: u32,
    ) -> Self {
        let engine = TimelineEngine::new(config.session_duration());
        let (teardown_tx, _) = watch::channel(false);
        Self {
            source,
            clock,
            config,
            engine,
            season,
            round,
            loaded: None,
            poller: None,
            teardown_tx: Arc::new(teardown_tx),
        }
    }

    pub fn teardown_handle(&self) -> TeardownHandle {
        TeardownHandle {
            tx: self.teardown_tx.clone(),
        }
    }

    pub fn is_torn_down(&self) -> bool {
        *self.teardown_tx.borrow()
    }

    /// Fetch the schedule once and start ticking. Returns the stream of timeline states.
    pub async fn activate(&mut self) -> Result<watch::Receiver<TimelineState>, PitwallError> {
        let loaded = self.load().await?;

        if let Some(mut previous) = self.poller.take() {
            previous.stop();
        }
        let mut poller = Poller::new(
            self.engine,
            self.clock.clone(),
            loaded.aggregated.resolved.clone(),
            self.config.tick_interval(),
        )
        .cancel_on(self.teardown_tx.subscribe());
        poller.start()?;

        let states = poller.subscribe();
        info!(
            "Weekend view for season {} round {} active ({:?})",
            self.season,
            self.round,
            poller.current().phase()
        );
        self.poller = Some(poller);
        self.loaded = Some(loaded);
        Ok(states)
    }

    /// Fetch again and push the result into the running poller.
    pub async fn reload(&mut self) -> Result<(), PitwallError> {
        let loaded = self.load().await?;
        if let Some(poller) = &self.poller {
            poller.set_schedule(loaded.aggregated.resolved.clone());
        }
        self.loaded = Some(loaded);
        Ok(())
    }

    async fn load(&self) -> Result<LoadedWeekend, PitwallError> {
        let mut teardown = self.teardown_tx.subscribe();
        if *teardown.borrow_and_update() {
            return Err(PitwallError::ViewTornDown);
        }

        let source = self.source.as_ref();
        let fetch = async {
            tokio::join!(
                aggregate(source, self.season, self.round),
                resolve_timezone(source, &self.config.default_timezone)
            )
        };

        tokio::select! {
            biased;
            _ = cancelled(&mut teardown) => {
                debug!("View torn down while fetching, dropping pending fetches");
                Err(PitwallError::ViewTornDown)
            }
            (aggregated, timezone) = fetch => Ok(LoadedWeekend { aggregated, timezone }),
        }
    }

    pub fn loaded(&self) -> Option<&LoadedWeekend> {
        self.loaded.as_ref()
    }

    /// Latest state, `Unknown` before activation.
    pub fn state(&self) -> TimelineState {
        self.poller
            .as_ref()
            .map(Poller::current)
            .unwrap_or(TimelineState::Unknown)
    }

    pub fn display(&self) -> TimelineDisplay {
        let state = self.state();
        match &self.loaded {
            Some(loaded) => render(
                &state,
                loaded.aggregated.event_label.as_deref(),
                &loaded.timezone,
            ),
            None => render(&state, None, &self.config.default_timezone),
        }
    }

    /// Stop the poller, abandon pending fetches and drop the cached schedule.
    pub fn teardown(&mut self) {
        self.teardown_tx.send_replace(true);
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        self.loaded = None;
    }
}

impl Drop for WeekendView {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// The user's timezone, or `default` when the source has none or fails.
pub async fn resolve_timezone(source: &dyn ScheduleSource, default: &str) -> String {
    match source.fetch_user_timezone().await {
        Ok(Some(timezone)) if !timezone.trim().is_empty() => timezone.trim().to_string(),
        Ok(_) => default.to_string(),
        Err(e) => {
            debug!("Could not fetch user timezone ({}), using {}", e, default);
            default.to_string()
        }
    }
}
