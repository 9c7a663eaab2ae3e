//! Entry point reload planning.
//!
//! Each protocol key is `absent` (no live listener), `running` or disabled in
//! the desired configuration. [`plan`] compares the live listeners with the
//! desired entry points and yields one [`Step`] per key; the engine applies
//! the steps in order.
use std::collections::HashMap;

use crate::config::{EntryPointConfig, Protocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// absent + enabled: construct and start a listener
    Start,
    /// absent + disabled: nothing to do
    Skip,
    /// running + unchanged: leave the listener serving
    Keep,
    /// running + disabled, or no longer configured: close it
    Stop,
    /// running + changed: construct the new one, close the old, start the new
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub protocol: Protocol,
    pub transition: Transition,
    /// Desired configuration; `None` when the protocol was removed.
    pub desired: Option<EntryPointConfig>,
}

/// Decide what happens to a single protocol key.
pub fn transition(current: Option<&EntryPointConfig>, desired: &EntryPointConfig) -> Transition {
    match (current, desired.is_enabled()) {
        (None, true) => Transition::Start,
        (None, false) => Transition::Skip,
        (Some(_), false) => Transition::Stop,
        (Some(running), true) if running.addr == desired.addr => Transition::Keep,
        (Some(_), true) => Transition::Replace,
    }
}

/// Plan every transition needed to move `live` to `desired`.
///
/// Desired entry points come first in configuration order, followed by stops
/// for live protocols that are no longer configured.
pub fn plan(live: &HashMap<Protocol, EntryPointConfig>, desired: &[EntryPointConfig]) -> Vec<Step> {
    let mut steps: Vec<Step> = desired
        .iter()
        .map(|entry_point| Step {
            protocol: entry_point.protocol.clone(),
            transition: transition(live.get(&entry_point.protocol), entry_point),
            desired: Some(entry_point.clone()),
        })
        .collect();

    let mut removed: Vec<&Protocol> = live
        .keys()
        .filter(|protocol| !desired.iter().any(|entry| &entry.protocol == *protocol))
        .collect();
    removed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    steps.extend(removed.into_iter().map(|protocol| Step {
        protocol: protocol.clone(),
        transition: Transition::Stop,
        desired: None,
    }));

    steps
}
