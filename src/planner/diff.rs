//! Diff engine for comparing desired vs remote resources.
//!
//! This module computes the structural difference between the local write
//! form of a resource and the write form of its remote counterpart, and
//! merges the two under the additive governance mode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How dictionary-valued sub-resources (properties, indexes, constraints,
/// data model views) are reconciled with what already exists remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Additive governance: entries that exist only remotely are kept.
    #[default]
    #[serde(alias = "additive")]
    Merge,
    /// Rebuild governance: the local definition is the complete truth.
    #[serde(alias = "rebuild")]
    Overwrite,
}

/// A property that was added or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    /// Dot-path of the property (`properties.name`).
    pub location: String,
    /// JSON representation of the value.
    pub value_representation: String,
}

/// A property whose value changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Dot-path of the property.
    pub location: String,
    /// JSON representation of the new value.
    pub value_representation: String,
    /// JSON representation of the previous value.
    pub previous_representation: String,
}

/// Difference between a desired resource and its remote counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceDifference {
    /// Identity of the resource, as displayed.
    pub resource_id: String,
    /// Properties present only in the desired resource.
    pub added: Vec<PropertyValue>,
    /// Properties present only remotely.
    pub removed: Vec<PropertyValue>,
    /// Properties present on both sides with different values.
    pub changed: Vec<PropertyChange>,
}

/// Builders for the individual entries of a [`ResourceDifference`].
#[derive(Debug, Default)]
pub struct DifferenceFactory;

impl MergePolicy {
    /// Returns true for the additive mode.
    #[must_use]
    pub const fn is_merge(self) -> bool {
        matches!(self, Self::Merge)
    }
}

impl ResourceDifference {
    /// Creates an empty difference for the given resource.
    #[must_use]
    pub fn new(resource_id: impl fmt::Display) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            ..Self::default()
        }
    }

    /// Returns true if nothing differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Number of differing properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }

    /// Locations of every differing property.
    #[must_use]
    pub fn locations(&self) -> Vec<&str> {
        self.added
            .iter()
            .map(|p| p.location.as_str())
            .chain(self.removed.iter().map(|p| p.location.as_str()))
            .chain(self.changed.iter().map(|p| p.location.as_str()))
            .collect()
    }
}

impl DifferenceFactory {
    /// Compares a scalar field that may be absent on either side.
    pub fn nullable_primary<T: Serialize + PartialEq>(
        diff: &mut ResourceDifference,
        location: &str,
        new: Option<&T>,
        previous: Option<&T>,
    ) {
        match (new, previous) {
            (Some(new), Some(previous)) if new != previous => {
                diff.changed.push(PropertyChange {
                    location: location.to_string(),
                    value_representation: represent(new),
                    previous_representation: represent(previous),
                });
            }
            (Some(new), None) => diff.added.push(PropertyValue {
                location: location.to_string(),
                value_representation: represent(new),
            }),
            (None, Some(previous)) => diff.removed.push(PropertyValue {
                location: location.to_string(),
                value_representation: represent(previous),
            }),
            _ => {}
        }
    }

    /// Compares dictionary-valued sub-resources keyed by identifier.
    ///
    /// Keys only present remotely are reported as removed under
    /// [`MergePolicy::Overwrite`] and ignored under [`MergePolicy::Merge`].
    pub fn comparable_by_id<T: Serialize + PartialEq>(
        diff: &mut ResourceDifference,
        location: &str,
        new: &BTreeMap<String, T>,
        previous: &BTreeMap<String, T>,
        policy: MergePolicy,
    ) {
        for (key, new_value) in new {
            let path = format!("{location}.{key}");
            match previous.get(key) {
                Some(previous_value) if previous_value != new_value => {
                    diff.changed.push(PropertyChange {
                        location: path,
                        value_representation: represent(new_value),
                        previous_representation: represent(previous_value),
                    });
                }
                Some(_) => {}
                None => diff.added.push(PropertyValue {
                    location: path,
                    value_representation: represent(new_value),
                }),
            }
        }

        if policy == MergePolicy::Overwrite {
            for (key, previous_value) in previous {
                if !new.contains_key(key) {
                    diff.removed.push(PropertyValue {
                        location: format!("{location}.{key}"),
                        value_representation: represent(previous_value),
                    });
                }
            }
        }
    }

    /// Union of two dictionaries where `new` entries override `previous` ones.
    #[must_use]
    pub fn merge_by_id<T: Clone>(
        new: &BTreeMap<String, T>,
        previous: &BTreeMap<String, T>,
    ) -> BTreeMap<String, T> {
        let mut merged = previous.clone();
        merged.extend(new.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// JSON representation of a value for reporting.
fn represent<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Merge => "merge",
            Self::Overwrite => "overwrite",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MergePolicy {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge" | "additive" => Ok(Self::Merge),
            "overwrite" | "rebuild" => Ok(Self::Overwrite),
            _ => Err(crate::error::ConfigError::InvalidOption {
                option: String::from("governance"),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ResourceDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource_id)?;
        if self.is_empty() {
            return write!(f, ": no changes");
        }
        write!(f, " (")?;
        for (i, location) in self.locations().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{location}")?;
        }
        write!(f, ")")
    }
}
