//! Build an event manager from configuration.

use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use crate::config::EventManagerConfig;
use crate::core::{AppResult, EventManager, EventNotifier};
use crate::util::clock::Clock;
use crate::util::serde::SleepType;

/// Validate `cfg` and build a manager reading time from `clock`.
///
/// `minimum_sleep_ms` becomes the minimum of every sleep kind that has no
/// entry in `minimum_sleep_times`.
///
/// # Errors
///
/// The configuration failed validation.
pub fn build_event_manager(
    cfg: &EventManagerConfig,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn EventNotifier>>,
) -> AppResult<EventManager> {
    cfg.validate()
        .map_err(|e| anyhow!("event manager config invalid: {e}"))?;

    let mut manager = EventManager::new(clock).with_default_limit(cfg.default_limit);
    if let Some(notifier) = notifier {
        manager = manager.with_notifier(notifier);
    }
    manager.set_enabled(cfg.enabled);
    manager.set_no_notify(!cfg.notify);
    manager.set_default_sleep_time(cfg.default_sleep_ms);
    for (kind, ms) in &cfg.sleep_times {
        manager.set_sleep_time(*kind, Some(*ms));
    }
    for kind in SleepType::ALL {
        let minimum = cfg
            .minimum_sleep_times
            .get(&kind)
            .copied()
            .or(cfg.minimum_sleep_ms);
        if let Some(ms) = minimum {
            manager.set_minimum_sleep_time(kind, Some(ms));
        }
    }
    debug!(
        enabled = cfg.enabled,
        default_limit = cfg.default_limit,
        "event manager built from config"
    );
    Ok(manager)
}
