//! Variant selection attached to a cart item.
//!
//! The backend serves two shapes for the same concept: older products carry a
//! flat `{size, color}` pair, newer ones an open map of option name to chosen
//! value. Modeled as a tagged union so callers never duck-type on field
//! presence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The options chosen for a product when it was added to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VariantSelection {
    /// Legacy flat shape: exactly a size and a color.
    ///
    /// Resolved by key set, not field presence: a map holding exactly
    /// `size` and `color` is legacy, anything richer stays [`Self::Dynamic`]
    /// with every key preserved.
    Legacy { size: String, color: String },
    /// Open option-name to value map.
    Dynamic(BTreeMap<String, String>),
}

impl<'de> Deserialize<'de> for VariantSelection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        BTreeMap::<String, String>::deserialize(deserializer).map(Self::from_options)
    }
}

impl VariantSelection {
    /// Classify a raw option map into the legacy or open shape.
    fn from_options(mut options: BTreeMap<String, String>) -> Self {
        if options.len() == 2 && options.contains_key("size") && options.contains_key("color") {
            let size = options.remove("size").unwrap_or_default();
            let color = options.remove("color").unwrap_or_default();
            return Self::Legacy { size, color };
        }
        Self::Dynamic(options)
    }

    /// Look up a chosen option value by name.
    ///
    /// For the legacy shape, `"size"` and `"color"` are the only names.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&str> {
        match self {
            Self::Legacy { size, color } => match name {
                "size" => Some(size.as_str()),
                "color" => Some(color.as_str()),
                _ => None,
            },
            Self::Dynamic(options) => options.get(name).map(String::as_str),
        }
    }

    /// Number of chosen options.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Legacy { .. } => 2,
            Self::Dynamic(options) => options.len(),
        }
    }

    /// Whether no option was chosen (only possible for the dynamic shape).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
