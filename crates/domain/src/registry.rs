//! DeviceRegistry: the fixed catalogue of devices and their aliases.
//!
//! The registry is built once at startup and never mutated afterwards.
//! Iteration order is registration order; bulk operations and snapshots
//! follow it.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::device::{Device, Pin};
use crate::error::ConfigurationError;
use crate::id::DeviceId;

/// Normalized alias key: trimmed and lowercased, interior whitespace kept.
pub(crate) fn alias_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// `key` with every whitespace character removed.
pub(crate) fn strip_whitespace(key: &str) -> String {
    key.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Immutable catalogue of devices, pins and aliases.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    index: HashMap<DeviceId, usize>,
    aliases: HashMap<String, DeviceId>,
}

impl DeviceRegistry {
    /// Create a builder for constructing a [`DeviceRegistry`].
    #[must_use]
    pub fn builder() -> DeviceRegistryBuilder {
        DeviceRegistryBuilder::default()
    }

    /// The catalogue wired in the greenhouse: two fans, a pump and a grow
    /// light on active-low relays, with numeric and Vietnamese short names.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature mirrors [`DeviceRegistryBuilder::build`].
    pub fn greenhouse_default() -> Result<Self, ConfigurationError> {
        Self::greenhouse_default_builder()?.build()
    }

    /// Builder preloaded with the [`greenhouse_default`](Self::greenhouse_default)
    /// catalogue, so that callers can register extra aliases.
    ///
    /// # Errors
    ///
    /// Never fails in practice; device construction is fallible in general.
    pub fn greenhouse_default_builder() -> Result<DeviceRegistryBuilder, ConfigurationError> {
        let mut builder = Self::builder();
        for (id, pin) in [("fan1", 5), ("fan2", 6), ("pump", 13), ("light", 19)] {
            builder = builder.device(Device::builder().id(id).pin(pin).active_low(true).build()?);
        }
        for (alias, target) in DEFAULT_ALIASES {
            builder = builder.alias(*alias, *target);
        }
        Ok(builder)
    }

    #[must_use]
    pub fn lookup(&self, id: &DeviceId) -> Option<&Device> {
        self.index.get(id).map(|&i| &self.devices[i])
    }

    #[must_use]
    pub fn contains(&self, id: &DeviceId) -> bool {
        self.index.contains_key(id)
    }

    /// Devices in registration order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    /// Canonical ids in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|d| d.id.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub(crate) fn alias_target(&self, key: &str) -> Option<&DeviceId> {
        self.aliases.get(key)
    }

    /// All registered aliases with their canonical targets.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &DeviceId)> {
        self.aliases.iter().map(|(k, v)| (k.as_str(), v))
    }
}

const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("1", "fan1"),
    ("fan 1", "fan1"),
    ("quat1", "fan1"),
    ("quạt1", "fan1"),
    ("q1", "fan1"),
    ("2", "fan2"),
    ("fan 2", "fan2"),
    ("quat2", "fan2"),
    ("quạt2", "fan2"),
    ("q2", "fan2"),
    ("3", "pump"),
    ("bom", "pump"),
    ("bơm", "pump"),
    ("4", "light"),
    ("den", "light"),
    ("đèn", "light"),
    ("lamp", "light"),
];

/// Step-by-step builder for [`DeviceRegistry`].
///
/// All invariants are checked in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct DeviceRegistryBuilder {
    devices: Vec<Device>,
    aliases: Vec<(String, String)>,
}

impl DeviceRegistryBuilder {
    #[must_use]
    pub fn device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.push((alias.into(), target.into()));
        self
    }

    /// Consume the builder and return the registry.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the catalogue is empty, when an id
    /// or a pin is used twice, or when an alias is empty, targets an unknown
    /// device, or conflicts with an existing alias or another device's id.
    pub fn build(self) -> Result<DeviceRegistry, ConfigurationError> {
        if self.devices.is_empty() {
            return Err(ConfigurationError::EmptyRegistry);
        }

        let mut index = HashMap::with_capacity(self.devices.len());
        let mut pins: HashMap<Pin, DeviceId> = HashMap::with_capacity(self.devices.len());
        for (position, device) in self.devices.iter().enumerate() {
            device.validate()?;
            if index.insert(device.id.clone(), position).is_some() {
                return Err(ConfigurationError::DuplicateDevice(device.id.clone()));
            }
            if let Some(first) = pins.insert(device.pin, device.id.clone()) {
                return Err(ConfigurationError::DuplicatePin {
                    pin: device.pin,
                    first,
                    second: device.id.clone(),
                });
            }
        }

        let mut aliases: HashMap<String, DeviceId> = HashMap::with_capacity(self.aliases.len());
        for (raw, target) in self.aliases {
            let key = alias_key(&raw);
            if key.is_empty() {
                return Err(ConfigurationError::EmptyAlias);
            }
            let target_id = DeviceId::new(&target);
            if !index.contains_key(&target_id) {
                return Err(ConfigurationError::UnknownAliasTarget { alias: raw, target });
            }
            // An alias that reads as another device's canonical id would be
            // shadowed by the canonical lookup and never reach its target.
            for form in [key.clone(), strip_whitespace(&key)] {
                let shadowing = DeviceId::new(&form);
                if index.contains_key(&shadowing) && shadowing != target_id {
                    return Err(ConfigurationError::AliasConflict {
                        alias: raw,
                        existing: shadowing,
                        requested: target_id,
                    });
                }
            }
            match aliases.entry(key) {
                Entry::Occupied(existing) if existing.get() != &target_id => {
                    return Err(ConfigurationError::AliasConflict {
                        alias: raw,
                        existing: existing.get().clone(),
                        requested: target_id,
                    });
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(target_id);
                }
            }
        }

        Ok(DeviceRegistry {
            devices: self.devices,
            index,
            aliases,
        })
    }
}
