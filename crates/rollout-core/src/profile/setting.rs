//! Three-state configuration values.
//!
//! A field is either `Unset` (never configured) or `Value(T)`. An explicitly empty value
//! such as `Value(String::new())` is still a value and is never overwritten by a merge.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting<T> {
    Unset,
    Value(T),
}

impl<T> Default for Setting<T> {
    fn default() -> Self {
        Setting::Unset
    }
}

impl<T> Setting<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Setting::Value(_))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Setting::Unset)
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Setting::Value(value) => Some(value),
            Setting::Unset => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Setting::Value(value) => Some(value),
            Setting::Unset => None,
        }
    }

    pub fn unwrap_or(self, fallback: T) -> T {
        self.into_option().unwrap_or(fallback)
    }

    pub fn unwrap_or_else(self, fallback: impl FnOnce() -> T) -> T {
        self.into_option().unwrap_or_else(fallback)
    }
}

impl<T: Default> Setting<T> {
    pub fn unwrap_or_default(self) -> T {
        self.into_option().unwrap_or_default()
    }
}

impl<T: Clone> Setting<T> {
    /// Fill this setting from `other` when it is unset. Set values are kept as they are.
    pub fn fill_from(&mut self, other: &Setting<T>) {
        if self.is_unset() {
            *self = other.clone();
        }
    }
}

impl<T> From<T> for Setting<T> {
    fn from(value: T) -> Self {
        Setting::Value(value)
    }
}

impl<T: Serialize> Serialize for Setting<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Setting::Value(value) => value.serialize(serializer),
            Setting::Unset => serializer.serialize_none(),
        }
    }
}

// Absent keys are handled by `#[serde(default)]` on the containing struct, so anything
// that reaches the deserializer is an explicit value.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Setting<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Setting::Value)
    }
}
