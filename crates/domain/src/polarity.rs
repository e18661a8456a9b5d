//! PolarityPolicy: per-device translation between logical intent and
//! electrical level.
//!
//! The policy is seeded from the registry and may be changed at runtime by
//! an operator (rewired relay board). It is never inferred from readback.

use std::collections::HashMap;

use crate::id::DeviceId;
use crate::registry::DeviceRegistry;
use crate::signal::{Level, Polarity};

/// Runtime polarity table. Lookups for unregistered ids return `None`.
#[derive(Debug, Clone)]
pub struct PolarityPolicy {
    table: HashMap<DeviceId, Polarity>,
}

impl PolarityPolicy {
    /// Seed the policy with each device's configured polarity.
    #[must_use]
    pub fn from_registry(registry: &DeviceRegistry) -> Self {
        Self {
            table: registry
                .devices()
                .map(|d| (d.id.clone(), d.polarity))
                .collect(),
        }
    }

    #[must_use]
    pub fn polarity(&self, id: &DeviceId) -> Option<Polarity> {
        self.table.get(id).copied()
    }

    #[must_use]
    pub fn logical_to_level(&self, id: &DeviceId, on: bool) -> Option<Level> {
        self.polarity(id).map(|p| p.level_for(on))
    }

    #[must_use]
    pub fn level_to_logical(&self, id: &DeviceId, level: Level) -> Option<bool> {
        self.polarity(id).map(|p| p.is_on_at(level))
    }

    /// Replace the polarity of `id`, returning the previous value.
    ///
    /// Returns `None` (and changes nothing) when `id` is not registered.
    pub fn set_polarity(&mut self, id: &DeviceId, polarity: Polarity) -> Option<Polarity> {
        self.table
            .get_mut(id)
            .map(|slot| std::mem::replace(slot, polarity))
    }

    /// Invert the polarity of `id`, returning the new value.
    pub fn toggle_polarity(&mut self, id: &DeviceId) -> Option<Polarity> {
        let next = self.polarity(id)?.inverted();
        self.set_polarity(id, next);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;

    fn policy() -> PolarityPolicy {
        let registry = DeviceRegistry::builder()
            .device(Device::builder().id("fan1").pin(5).active_low(true).build().unwrap())
            .device(Device::builder().id("light").pin(19).active_low(false).build().unwrap())
            .build()
            .unwrap();
        PolarityPolicy::from_registry(&registry)
    }

    #[test]
    fn should_map_on_to_low_for_active_low_device() {
        let policy = policy();
        let fan = DeviceId::new("fan1");
        assert_eq!(policy.logical_to_level(&fan, true), Some(Level::Low));
        assert_eq!(policy.logical_to_level(&fan, false), Some(Level::High));
    }

    #[test]
    fn should_map_on_to_high_for_active_high_device() {
        let policy = policy();
        let light = DeviceId::new("light");
        assert_eq!(policy.logical_to_level(&light, true), Some(Level::High));
        assert_eq!(policy.level_to_logical(&light, Level::Low), Some(false));
    }

    #[test]
    fn should_return_previous_polarity_when_set() {
        let mut policy = policy();
        let fan = DeviceId::new("fan1");
        let previous = policy.set_polarity(&fan, Polarity::ActiveHigh);
        assert_eq!(previous, Some(Polarity::ActiveLow));
        assert_eq!(policy.logical_to_level(&fan, true), Some(Level::High));
    }

    #[test]
    fn should_invert_polarity_when_toggled() {
        let mut policy = policy();
        let light = DeviceId::new("light");
        assert_eq!(policy.toggle_polarity(&light), Some(Polarity::ActiveLow));
        assert_eq!(policy.toggle_polarity(&light), Some(Polarity::ActiveHigh));
    }

    #[test]
    fn should_ignore_unknown_device() {
        let mut policy = policy();
        let heater = DeviceId::new("heater");
        assert_eq!(policy.set_polarity(&heater, Polarity::ActiveHigh), None);
        assert_eq!(policy.toggle_polarity(&heater), None);
        assert_eq!(policy.logical_to_level(&heater, true), None);
    }
}
