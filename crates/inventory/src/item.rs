use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stowage_core::ValueObject;

pub const DEFAULT_MAX_STACK: u32 = 64;

/// Coarse classification used by the `Type` sort preset.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemClass {
    Block,
    #[default]
    Item,
}

/// Item identity: what a stack *is*.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKind {
    /// Namespaced code, `domain:path` (e.g. `game:log-oak`).
    pub code: String,
    /// Display name.
    pub name: String,
    #[serde(default)]
    pub class: ItemClass,
    /// Largest quantity a single slot can hold.
    #[serde(default = "default_max_stack")]
    pub max_stack: u32,
}

fn default_max_stack() -> u32 {
    DEFAULT_MAX_STACK
}

impl ItemKind {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            class: ItemClass::Item,
            max_stack: DEFAULT_MAX_STACK,
        }
    }

    pub fn with_class(mut self, class: ItemClass) -> Self {
        self.class = class;
        self
    }

    /// Code domain; `game` when the code carries none.
    pub fn domain(&self) -> &str {
        match self.code.split_once(':') {
            Some((domain, _)) => domain,
            None => "game",
        }
    }

    /// Code path (the part after the domain).
    pub fn path(&self) -> &str {
        match self.code.split_once(':') {
            Some((_, path)) => path,
            None => &self.code,
        }
    }
}

impl ValueObject for ItemKind {}

/// Opaque key-value bag carried by a stack (enchantments, freshness, ...).
pub type Attributes = BTreeMap<String, String>;

/// The payload occupying a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub kind: ItemKind,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl ItemStack {
    pub fn new(kind: ItemKind, quantity: u32) -> Self {
        Self {
            kind,
            quantity,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Same stack with a different quantity.
    pub fn with_quantity(&self, quantity: u32) -> Self {
        Self {
            kind: self.kind.clone(),
            quantity,
            attributes: self.attributes.clone(),
        }
    }

    pub fn max_stack(&self) -> u32 {
        self.kind.max_stack
    }

    pub fn is_full(&self) -> bool {
        self.quantity >= self.kind.max_stack
    }

    /// Same kind and attributes, regardless of quantity.
    pub fn stacks_with(&self, other: &ItemStack) -> bool {
        self.kind == other.kind && self.attributes == other.attributes
    }

    /// Whether the two stacks combine into one without loss.
    pub fn is_mergeable(&self, other: &ItemStack) -> bool {
        self.stacks_with(other)
            && self.quantity.saturating_add(other.quantity) <= self.kind.max_stack
    }

    /// How much of `source` this stack can still absorb.
    pub fn room_for(&self, source: &ItemStack) -> u32 {
        if self.stacks_with(source) {
            self.kind.max_stack.saturating_sub(self.quantity)
        } else {
            0
        }
    }

    /// Whether at least one item of `source` can move onto this stack.
    pub fn can_take_from(&self, source: &ItemStack) -> bool {
        source.quantity > 0 && self.room_for(source) > 0
    }
}

impl ValueObject for ItemStack {}
