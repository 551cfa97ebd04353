//! The registries and runtime services every view and service is handed.

use std::rc::Rc;

use budget_types::config::SyncConfig;

use crate::cache_manager::CacheManager;
use crate::event_bus::EventBus;
use crate::ports::{PageEvents, Scheduler};
use crate::services::SyncNotifier;

/// Constructed once per process and cloned into each consumer.
#[derive(Clone)]
pub struct SyncContext {
    pub event_bus: EventBus,
    pub cache: CacheManager,
    pub scheduler: Rc<dyn Scheduler>,
    pub page: Rc<dyn PageEvents>,
    pub config: SyncConfig,
}

impl SyncContext {
    pub fn new(scheduler: Rc<dyn Scheduler>, page: Rc<dyn PageEvents>, config: SyncConfig) -> Self {
        Self {
            event_bus: EventBus::new(),
            cache: CacheManager::new(scheduler.clone()),
            scheduler,
            page,
            config,
        }
    }

    pub fn notifier(&self) -> SyncNotifier {
        SyncNotifier::new(self.event_bus.clone(), self.cache.clone())
    }
}
