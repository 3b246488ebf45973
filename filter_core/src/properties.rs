// filter_core/src/properties.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- PROPERTY REGISTRY TRAIT ---
// The contract for any object that can receive tunable scalars. The outlier
// chain registers its thresholds through this; a configuration layer
// implements it, as will a mock for testing.
pub trait PropertyRegistry {
    /// Registers one tunable scalar under `key`.
    ///
    /// The registry may immediately write a configured value back through the
    /// reference; it must not retain it. Later retuning goes through the
    /// owning component's accessors.
    fn register_scalar(&mut self, key: &str, value: &mut f64);
}

/// A flat key/value registry backed by a map, deserializable straight from a
/// config file.
///
/// Registration is two-way: a key present in the sheet overrides the
/// registered scalar, an unknown key captures the scalar's current value so
/// the sheet can be written back out as a complete set of defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertySheet {
    scalars: HashMap<String, f64>,
}

impl PropertySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.scalars.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.scalars.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.scalars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty()
    }
}

impl PropertyRegistry for PropertySheet {
    fn register_scalar(&mut self, key: &str, value: &mut f64) {
        match self.scalars.get(key) {
            Some(stored) => *value = *stored,
            None => {
                self.scalars.insert(key.to_owned(), *value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outlier::{chi_square_threshold, BlockDescriptor, OutlierDetection};
    use approx::assert_abs_diff_eq;

    #[test]
    fn known_key_overrides_registered_scalar() {
        let mut sheet = PropertySheet::new();
        sheet.set("gain", 12.5);
        let mut value = 1.0;
        sheet.register_scalar("gain", &mut value);
        assert_abs_diff_eq!(value, 12.5);
    }

    #[test]
    fn unknown_key_captures_current_value() {
        let mut sheet = PropertySheet::new();
        let mut value = 3.25;
        sheet.register_scalar("gain", &mut value);
        assert_abs_diff_eq!(value, 3.25);
        assert_eq!(sheet.get("gain"), Some(3.25));
    }

    #[test]
    fn chain_thresholds_register_with_indexed_keys() {
        let mut chain =
            OutlierDetection::new(&[BlockDescriptor::new(0, 2), BlockDescriptor::new(2, 3)])
                .unwrap();
        let mut sheet = PropertySheet::new();
        sheet.set("update_mahalanobisTh_0", 9.5);

        chain.register_properties(&mut sheet, "update_mahalanobisTh_");

        // Configured key overrode the first gate, second gate's default was
        // captured into the sheet.
        assert_abs_diff_eq!(chain.mahalanobis_th(0), 9.5);
        assert_eq!(
            sheet.get("update_mahalanobisTh_1"),
            Some(chi_square_threshold(3))
        );
    }

    #[test]
    fn sheet_parses_from_toml() {
        let sheet: PropertySheet = toml::from_str("update_mahalanobisTh_0 = 9.5\n").unwrap();
        assert_eq!(sheet.get("update_mahalanobisTh_0"), Some(9.5));
    }
}
