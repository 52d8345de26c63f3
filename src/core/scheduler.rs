/// Refresh scheduler: one cooperative loop driving fetch, render, change detection and
/// the panel. Every panel call happens on this loop, one at a time.
use chrono::{Local, NaiveDateTime};
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::content::cache::ContentCache;
use crate::content::{ContentSnapshot, ContentSource, FetchError};
use crate::core::detector::{ChangeDetector, Decision, Fingerprint, RefreshState, truncate_to_minute};
use crate::core::signals::{ReloadFlag, Shutdown};
use crate::panel::{PanelDriver, PanelError};
use crate::render::{Bitmap, Renderer};

/// Rejected fetches in a row, each followed by a credential reload, before the run gives up
const REJECTIONS_BEFORE_IDLE: u32 = 2;

/// Already-parsed timing policy
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Main tick interval
    pub poll_interval: Duration,
    /// Content cache time-to-live; zero refetches every tick
    pub cache_ttl: Duration,
    /// Unchanged ticks before a forced repaint; 0 disables forcing
    pub forced_repaint_period: u32,
    /// Minimum time between two panel refreshes
    pub panel_min_refresh: Duration,
    /// Secondary tick for the minute-boundary check, used only with a live clock
    pub time_check_interval: Option<Duration>,
    /// Upper bound on one fetch or authentication call
    pub fetch_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5 * 60),
            cache_ttl: Duration::from_secs(60 * 60),
            forced_repaint_period: 10,
            panel_min_refresh: Duration::from_secs(180),
            time_check_interval: Some(Duration::from_secs(30)),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Wall-clock source for the time shown on the panel
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Why `run` handed control back
#[derive(Debug)]
pub enum RunExit {
    Shutdown,
    /// New configuration is waiting
    Reload,
    /// The source rejected our credentials and reloading them did not help
    AuthLost(FetchError),
}

/// Why `idle` handed control back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleExit {
    Elapsed,
    Reload,
    Shutdown,
}

/// What a frame puts on the panel
#[derive(Debug, Clone)]
enum Frame {
    Content { clock_minute: Option<NaiveDateTime> },
    Message(String),
}

/// Frame refused by the panel's refresh throttle, retried once the panel allows it
struct Deferred {
    bitmap: Bitmap,
    due: Instant,
    frame: Frame,
}

pub struct RefreshScheduler<P, C = SystemClock> {
    config: SchedulerConfig,
    detector: ChangeDetector,
    state: RefreshState,
    panel: P,
    renderer: Renderer,
    clock: C,
    deferred: Option<Deferred>,
    /// Title of the status screen on the panel, if one is showing
    on_screen: Option<String>,
}

impl<P: PanelDriver, C: Clock> RefreshScheduler<P, C> {
    pub fn new(config: SchedulerConfig, panel: P, renderer: Renderer, clock: C) -> Self {
        Self {
            detector: ChangeDetector::new(config.forced_repaint_period),
            config,
            state: RefreshState::default(),
            panel,
            renderer,
            clock,
            deferred: None,
            on_screen: None,
        }
    }

    /// Apply new timing policy. Refresh bookkeeping carries over.
    pub fn reconfigure(&mut self, config: SchedulerConfig) {
        self.detector = ChangeDetector::new(config.forced_repaint_period);
        self.config = config;
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    /// Title of the status screen currently shown or waiting to be shown
    pub fn showing_message(&self) -> Option<&str> {
        self.on_screen.as_deref()
    }

    /// Bring the panel up and blank it
    pub fn start(&mut self) -> Result<(), PanelError> {
        self.panel.init()?;
        self.panel.clear()?;
        info!(
            "Panel ready ({}x{})",
            self.renderer.size().0,
            self.renderer.size().1
        );
        Ok(())
    }

    /// Put the panel into its safe state. Last panel call of the process.
    pub fn release(&mut self) {
        self.deferred = None;
        match self.panel.sleep() {
            Ok(()) => info!("Panel put to sleep"),
            Err(e) => error!("Failed to put panel to sleep: {}", e),
        }
    }

    /// Drive the refresh loop until shutdown, a reload request or lost authentication
    pub async fn run<S: ContentSource>(
        &mut self,
        cache: &mut ContentCache<S>,
        reload: &ReloadFlag,
        shutdown: &mut Shutdown,
    ) -> RunExit {
        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut time_check = self
            .config
            .time_check_interval
            .filter(|_| self.renderer.live_clock())
            .map(|period| {
                let mut check = time::interval_at(Instant::now() + period, period);
                check.set_missed_tick_behavior(MissedTickBehavior::Skip);
                check
            });

        info!(
            "Refresh loop started for {}: tick {}s, cache ttl {}s, forced repaint every {} ticks",
            cache.source_name(),
            self.config.poll_interval.as_secs(),
            self.config.cache_ttl.as_secs(),
            self.config.forced_repaint_period
        );

        loop {
            if shutdown.is_triggered() {
                return RunExit::Shutdown;
            }
            if reload.is_requested() {
                info!("Reload requested, leaving refresh loop");
                return RunExit::Reload;
            }

            let retry_at = self.deferred.as_ref().map(|d| d.due);
            tokio::select! {
                _ = shutdown.triggered() => return RunExit::Shutdown,
                _ = reload.requested() => {}
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(cache).await {
                        return RunExit::AuthLost(e);
                    }
                }
                _ = next_tick(&mut time_check) => self.time_check(cache),
                _ = deadline(retry_at) => self.retry_deferred(),
            }
        }
    }

    /// Wait up to `wait`, still flushing a deferred frame, until a reload or shutdown
    pub async fn idle(
        &mut self,
        wait: Duration,
        reload: &ReloadFlag,
        shutdown: &mut Shutdown,
    ) -> IdleExit {
        let until = Instant::now() + wait;
        loop {
            if shutdown.is_triggered() {
                return IdleExit::Shutdown;
            }
            if reload.is_requested() {
                return IdleExit::Reload;
            }

            let retry_at = self.deferred.as_ref().map(|d| d.due);
            tokio::select! {
                _ = shutdown.triggered() => return IdleExit::Shutdown,
                _ = reload.requested() => return IdleExit::Reload,
                _ = time::sleep_until(until) => return IdleExit::Elapsed,
                _ = deadline(retry_at) => self.retry_deferred(),
            }
        }
    }

    /// Static status screen. The next content tick always repaints over it.
    pub fn show_message(&mut self, title: &str, lines: &[&str]) {
        self.state.forget_fingerprint();
        match self.renderer.compose_message(title, lines, self.clock.now()) {
            Ok(bitmap) => {
                info!("Showing message: {}", title);
                self.paint(bitmap, Frame::Message(title.to_string()));
            }
            Err(e) => error!("Cannot render message '{}': {}", title, e),
        }
    }

    /// Main tick. Only an authentication failure that survives a credential reload is returned.
    /// A rejection hidden behind old content still paints that content first.
    async fn tick<S: ContentSource>(&mut self, cache: &mut ContentCache<S>) -> Result<(), FetchError> {
        let snapshot = match cache.get(false).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_auth() => {
                error!("{} rejected credentials: {}", cache.source_name(), e);
                return Err(e);
            }
            Err(e) => {
                error!("No content from {} yet: {}", cache.source_name(), e);
                return Ok(());
            }
        };
        let now = self.clock.now();
        self.consider(&snapshot, now);

        let Some(rejection) = cache.take_rejection() else {
            return Ok(());
        };
        if cache.rejected_streak() >= REJECTIONS_BEFORE_IDLE {
            error!(
                "{} keeps rejecting credentials: {}",
                cache.source_name(),
                rejection
            );
            return Err(rejection);
        }
        warn!(
            "{} rejected credentials ({}), reloading them",
            cache.source_name(),
            rejection
        );
        if let Err(e) = cache.reauthenticate().await {
            error!("Reloading {} credentials failed: {}", cache.source_name(), e);
            return Err(e);
        }
        Ok(())
    }

    /// Minute-boundary check for live-clock layouts
    fn time_check<S: ContentSource>(&mut self, cache: &ContentCache<S>) {
        if self.deferred.is_some() {
            return;
        }
        let Some(snapshot) = cache.current() else {
            return;
        };
        let now = self.clock.now();
        if self.state.last_clock_minute == Some(truncate_to_minute(now)) {
            return;
        }
        if let Some(last) = self.state.last_repaint_at {
            let since = Instant::now().saturating_duration_since(last);
            if since < self.config.panel_min_refresh {
                debug!(
                    "Clock minute changed, panel rested only {}s",
                    since.as_secs()
                );
                return;
            }
        }
        self.consider(&snapshot, now);
    }

    fn consider(&mut self, snapshot: &ContentSnapshot, now: NaiveDateTime) {
        let clock_minute = self
            .renderer
            .live_clock()
            .then(|| truncate_to_minute(now));

        let bitmap = match self.renderer.compose(snapshot, now) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                error!("Render failed, keeping current panel image: {}", e);
                return;
            }
        };

        let fp = Fingerprint::of(snapshot, clock_minute);
        match self.detector.decide(fp, &mut self.state) {
            Decision::Skip => {}
            Decision::Repaint(reason) => {
                info!("Repainting panel ({:?}, content {})", reason, fp);
                self.paint(bitmap, Frame::Content { clock_minute });
            }
        }
    }

    fn paint(&mut self, bitmap: Bitmap, frame: Frame) {
        match self.panel.display(&bitmap) {
            Ok(()) => {
                self.deferred = None;
                match frame {
                    Frame::Content { clock_minute } => {
                        self.state.record_repaint(Instant::now(), clock_minute);
                        self.on_screen = None;
                    }
                    Frame::Message(title) => {
                        self.state.record_repaint(Instant::now(), None);
                        self.on_screen = Some(title);
                    }
                }
                info!("Panel refreshed ({} repaints)", self.state.total_repaints);
            }
            Err(PanelError::Throttled { remaining }) => {
                info!("Panel busy, repaint deferred by {}s", remaining.as_secs());
                if let Frame::Message(title) = &frame {
                    self.on_screen = Some(title.clone());
                }
                self.deferred = Some(Deferred {
                    bitmap,
                    due: Instant::now() + remaining,
                    frame,
                });
            }
            Err(e) => {
                warn!("Panel refresh failed, retrying next tick: {}", e);
                self.deferred = None;
                self.state.forget_fingerprint();
            }
        }
    }

    fn retry_deferred(&mut self) {
        if let Some(deferred) = self.deferred.take() {
            debug!("Retrying deferred repaint");
            self.paint(deferred.bitmap, deferred.frame);
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// Wall clock that advances with tokio's (possibly paused) clock
    pub struct VirtualClock {
        base: NaiveDateTime,
        start: Instant,
    }

    impl VirtualClock {
        pub fn starting_at(base: NaiveDateTime) -> Self {
            Self {
                base,
                start: Instant::now(),
            }
        }
    }

    impl Clock for VirtualClock {
        fn now(&self) -> NaiveDateTime {
            let elapsed = Instant::now().saturating_duration_since(self.start);
            self.base + chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero())
        }
    }
}
