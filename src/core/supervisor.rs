/// Outer lifecycle around the refresh loop: startup, authentication cycles, reloads and
/// releasing the panel on shutdown.
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, FrameConfig};
use crate::content::cache::ContentCache;
use crate::content::{ContentSource, FetchError};
use crate::core::scheduler::{Clock, IdleExit, RefreshScheduler, RunExit};
use crate::core::signals::{ReloadFlag, Shutdown};
use crate::panel::PanelDriver;

/// Pause after a reload before the new source starts
const RELOAD_SETTLE: Duration = Duration::from_secs(5);

const AUTH_FAILED: &str = "Authentication Failed";
const AUTH_HINT: &str = "Check .env and token files.";

enum CycleEnd {
    Reload,
    Shutdown,
    /// Credentials failed; try again with freshly read configuration
    Reauthenticate,
}

pub struct Supervisor<P, C, L> {
    scheduler: RefreshScheduler<P, C>,
    config: FrameConfig,
    load_config: L,
    reload: ReloadFlag,
    shutdown: Shutdown,
}

impl<P, C, L> Supervisor<P, C, L>
where
    P: PanelDriver,
    C: Clock,
    L: FnMut() -> std::result::Result<FrameConfig, ConfigError>,
{
    pub fn new(
        scheduler: RefreshScheduler<P, C>,
        config: FrameConfig,
        load_config: L,
        reload: ReloadFlag,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            scheduler,
            config,
            load_config,
            reload,
            shutdown,
        }
    }

    /// Run until shutdown. Only a panel that cannot be brought up is an error.
    pub async fn run<S, F>(mut self, mut build_source: F) -> Result<()>
    where
        S: ContentSource,
        F: FnMut(&FrameConfig) -> S,
    {
        self.scheduler
            .start()
            .context("Panel initialization failed")?;
        self.scheduler.show_message("Starting up Photo Frame...", &[]);

        let mut source = build_source(&self.config);
        loop {
            match self.cycle(source).await {
                CycleEnd::Shutdown => break,
                CycleEnd::Reload => {
                    if !self.apply_reload().await {
                        break;
                    }
                }
                CycleEnd::Reauthenticate => {
                    // credentials may have been fixed in the settings file meanwhile
                    self.refresh_config();
                }
            }
            source = build_source(&self.config);
        }

        info!("Shutting down");
        self.scheduler.release();
        Ok(())
    }

    /// Authenticate, then refresh until something ends the cycle. Broken credentials show
    /// a notice and idle one poll interval before the cycle ends.
    async fn cycle<S: ContentSource>(&mut self, mut source: S) -> CycleEnd {
        let timeout = self.scheduler.config().fetch_timeout;
        let auth = match time::timeout(timeout, source.authenticate()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };

        let failure = match auth {
            Err(e) => {
                error!("Authentication with {} failed: {}", source.name(), e);
                e
            }
            Ok(()) => {
                info!("Authenticated with {}", source.name());
                let cfg = self.scheduler.config().clone();
                let mut cache = ContentCache::new(source, cfg.cache_ttl, cfg.fetch_timeout);
                match self
                    .scheduler
                    .run(&mut cache, &self.reload, &mut self.shutdown)
                    .await
                {
                    RunExit::Shutdown => return CycleEnd::Shutdown,
                    RunExit::Reload => return CycleEnd::Reload,
                    RunExit::AuthLost(e) => {
                        warn!("Lost authentication with {} ({}), going idle", cache.source_name(), e);
                        e
                    }
                }
            }
        };

        debug!("Idle after {}", failure);
        self.show_auth_failure();
        let retry_after = self.scheduler.config().poll_interval;
        match self.idle(retry_after).await {
            IdleExit::Elapsed => CycleEnd::Reauthenticate,
            IdleExit::Reload => CycleEnd::Reload,
            IdleExit::Shutdown => CycleEnd::Shutdown,
        }
    }

    /// Re-read configuration and let the panel settle. False when shutdown arrived meanwhile.
    async fn apply_reload(&mut self) -> bool {
        loop {
            self.reload.take();
            info!("Reloading configuration");
            self.refresh_config();
            self.scheduler
                .show_message("Configuration Updated", &["Loading new album..."]);

            match self.idle(RELOAD_SETTLE).await {
                IdleExit::Elapsed => return true,
                IdleExit::Reload => continue,
                IdleExit::Shutdown => return false,
            }
        }
    }

    fn refresh_config(&mut self) {
        match (self.load_config)() {
            Ok(config) => {
                self.scheduler.reconfigure(config.scheduler.clone());
                self.config = config;
            }
            Err(e) => warn!("Keeping previous configuration: {}", e),
        }
    }

    /// Static notice while credentials are broken, painted once per outage
    fn show_auth_failure(&mut self) {
        if self.scheduler.showing_message() != Some(AUTH_FAILED) {
            self.scheduler.show_message(AUTH_FAILED, &[AUTH_HINT]);
        }
    }

    async fn idle(&mut self, wait: Duration) -> IdleExit {
        self.scheduler
            .idle(wait, &self.reload, &mut self.shutdown)
            .await
    }
}
