//! NameResolver: maps free-form user input to a canonical device id.
//!
//! Resolution is table-driven: numeric shorthand (`"1"`) and localized short
//! names (`"bơm"`) are ordinary alias entries in the [`DeviceRegistry`].

use crate::error::ResolutionError;
use crate::id::DeviceId;
use crate::registry::{DeviceRegistry, alias_key, strip_whitespace};

/// Read-only resolver over a [`DeviceRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct NameResolver<'a> {
    registry: &'a DeviceRegistry,
}

impl<'a> NameResolver<'a> {
    #[must_use]
    pub fn new(registry: &'a DeviceRegistry) -> Self {
        Self { registry }
    }

    /// Resolve `input` to a canonical id, or `None` when nothing matches.
    ///
    /// Tries, in order: the trimmed lowercase input as a canonical id, the
    /// same with all whitespace removed, then the alias table with both forms.
    #[must_use]
    pub fn resolve(&self, input: &str) -> Option<DeviceId> {
        let key = alias_key(input);
        if key.is_empty() {
            return None;
        }
        let compact = strip_whitespace(&key);

        [&key, &compact]
            .into_iter()
            .map(DeviceId::new)
            .find(|id| self.registry.contains(id))
            .or_else(|| {
                [&key, &compact]
                    .into_iter()
                    .find_map(|form| self.registry.alias_target(form).cloned())
            })
    }

    /// Like [`resolve`](Self::resolve) but produces an error listing every
    /// valid canonical id.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] when `input` matches no device.
    pub fn resolve_or_err(&self, input: &str) -> Result<DeviceId, ResolutionError> {
        self.resolve(input).ok_or_else(|| ResolutionError {
            input: input.to_string(),
            valid: self.registry.ids(),
        })
    }
}

impl DeviceRegistry {
    /// Resolver borrowing this registry.
    #[must_use]
    pub fn resolver(&self) -> NameResolver<'_> {
        NameResolver::new(self)
    }
}
