use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data_aquisition::normalize::NativeValue;

/// Attribute name to value, for one index of one MIB.
pub type Attributes = BTreeMap<String, NativeValue>;

/// Index (ifIndex, VLAN id, or `0` for singleton groups) to attributes.
///
/// Built column by column: each attribute walk is merged in under the same
/// index keys. Indexes stay in ascending numeric order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MibRecord {
    rows: BTreeMap<u64, Attributes>,
}

impl MibRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one attribute of one index, creating the index if needed.
    pub fn merge(&mut self, index: u64, attribute: &str, value: NativeValue) {
        self.rows
            .entry(index)
            .or_default()
            .insert(attribute.to_string(), value);
    }

    /// Merges a whole column (index → value) under one attribute name.
    pub fn merge_column(&mut self, attribute: &str, column: BTreeMap<u64, NativeValue>) {
        for (index, value) in column {
            self.merge(index, attribute, value);
        }
    }

    /// Folds another record in. Attributes of `other` win on conflict.
    pub fn absorb(&mut self, other: MibRecord) {
        for (index, attributes) in other.rows {
            self.rows.entry(index).or_default().extend(attributes);
        }
    }

    pub fn get(&self, index: u64) -> Option<&Attributes> {
        self.rows.get(&index)
    }

    pub fn indexes(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// MIB name to record, for one device in one run.
pub type DeviceSnapshot = BTreeMap<String, MibRecord>;
