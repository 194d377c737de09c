// src/application/mutations.rs
// Start/stop trading and settings updates

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::application::cache::{QueryCache, QueryKey};
use crate::application::notifications::{Notification, NotificationCenter};
use crate::domain::errors::{MutationError, MutationResult};
use crate::domain::models::{TradingSettings, TradingStatus};
use crate::domain::repository::TradingApi;

// Holds an action's busy flag for as long as the mutation runs
struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool, action: &'static str) -> MutationResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MutationError::InFlight(action))?;
        Ok(Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct TradingMutations {
    api: Arc<dyn TradingApi>,
    cache: Arc<QueryCache>,
    notifications: Arc<NotificationCenter>,
    starting: AtomicBool,
    stopping: AtomicBool,
    saving_settings: AtomicBool,
}

impl TradingMutations {
    pub fn new(
        api: Arc<dyn TradingApi>,
        cache: Arc<QueryCache>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            api,
            cache,
            notifications,
            starting: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            saving_settings: AtomicBool::new(false),
        }
    }

    pub fn is_starting(&self) -> bool {
        self.starting.load(Ordering::Acquire)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn is_saving_settings(&self) -> bool {
        self.saving_settings.load(Ordering::Acquire)
    }

    pub async fn start_trading(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> MutationResult<TradingStatus> {
        let _busy = InFlight::acquire(&self.starting, "Start trading")?;
        log::info!("Starting trading on {} {}", symbol, timeframe);

        match self.api.start_trading(symbol, timeframe).await {
            Ok(status) => {
                self.cache.invalidate(&QueryKey::TradingStatus);
                self.cache.invalidate(&QueryKey::Positions);
                self.notifications.push(Notification::success(
                    "Trading started",
                    &format!("Auto trading is running on {} ({})", symbol, timeframe),
                ));
                Ok(status)
            }
            Err(e) => {
                self.notifications
                    .push(Notification::from_api_error("Failed to start trading", &e));
                Err(e.into())
            }
        }
    }

    pub async fn stop_trading(&self) -> MutationResult<TradingStatus> {
        let _busy = InFlight::acquire(&self.stopping, "Stop trading")?;
        log::info!("Stopping trading");

        match self.api.stop_trading().await {
            Ok(status) => {
                self.cache.invalidate(&QueryKey::TradingStatus);
                self.cache.invalidate(&QueryKey::Positions);
                self.notifications.push(Notification::success(
                    "Trading stopped",
                    "Auto trading has been stopped",
                ));
                Ok(status)
            }
            Err(e) => {
                self.notifications
                    .push(Notification::from_api_error("Failed to stop trading", &e));
                Err(e.into())
            }
        }
    }

    pub async fn update_settings(
        &self,
        settings: &TradingSettings,
    ) -> MutationResult<TradingSettings> {
        let _busy = InFlight::acquire(&self.saving_settings, "Saving settings")?;

        match self.api.update_settings(settings).await {
            Ok(saved) => {
                self.cache.invalidate(&QueryKey::Settings);
                self.cache.invalidate(&QueryKey::TradingStatus);
                self.notifications
                    .push(Notification::success("Settings saved", "Trading settings updated"));
                Ok(saved)
            }
            Err(e) => {
                self.notifications
                    .push(Notification::from_api_error("Failed to save settings", &e));
                Err(e.into())
            }
        }
    }
}
