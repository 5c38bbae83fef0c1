//! Comparison policies for sorting stacks.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use stowage_core::InventoryError;

use crate::container::Slot;
use crate::item::ItemStack;

/// A total order over present stacks.
pub trait StackOrder {
    fn compare(&self, a: &ItemStack, b: &ItemStack) -> Ordering;
}

impl<F> StackOrder for F
where
    F: Fn(&ItemStack, &ItemStack) -> Ordering,
{
    fn compare(&self, a: &ItemStack, b: &ItemStack) -> Ordering {
        self(a, b)
    }
}

/// Built-in sort presets.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Display name, then quantity descending.
    #[default]
    Name,
    /// Code path, then code domain, then quantity descending.
    Code,
    /// Item class, then display name, then quantity descending.
    Type,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Code => "code",
            SortKey::Type => "type",
        }
    }
}

impl StackOrder for SortKey {
    fn compare(&self, a: &ItemStack, b: &ItemStack) -> Ordering {
        let primary = match self {
            SortKey::Name => a.kind.name.cmp(&b.kind.name),
            SortKey::Code => a
                .kind
                .path()
                .cmp(b.kind.path())
                .then_with(|| a.kind.domain().cmp(b.kind.domain())),
            SortKey::Type => a
                .kind
                .class
                .cmp(&b.kind.class)
                .then_with(|| a.kind.name.cmp(&b.kind.name)),
        };
        primary.then_with(|| b.quantity.cmp(&a.quantity))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "code" => Ok(SortKey::Code),
            "type" => Ok(SortKey::Type),
            other => Err(InventoryError::invalid_input(format!("unknown sort key `{other}`"))),
        }
    }
}

/// Compare two slots: present stacks by `order`, absent slots after all present ones.
pub fn compare_slots(order: &dyn StackOrder, a: &Slot, b: &Slot) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => order.compare(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
