/// Index-addressed accumulation of in-progress tool invocations.
///
/// Vendors deliver a tool call in pieces across many frames: the id and
/// name usually arrive whole on the first fragment, while the arguments
/// arrive as JSON-string shards that only form a valid document once
/// concatenated in arrival order. Slots are keyed by a stable integer
/// index for the life of the stream; a slot's `args` buffer only ever
/// grows.
use serde::Serialize;
use std::collections::BTreeMap;

/// One accumulated tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    /// Concatenated argument shards; parses as JSON once the stream has
    /// delivered every fragment.
    pub args: String,
}

/// Sparse map from tool-call index to its accumulating record.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: BTreeMap<usize, ToolCallRecord>,
}

impl ToolCallAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment into the slot at `index`, creating it on first
    /// touch. Non-empty `id`/`name` fragments overwrite (they arrive
    /// whole); `args` is always appended, never replaced.
    pub fn merge(&mut self, index: usize, id: Option<&str>, name: Option<&str>, args: &str) {
        let slot = self.slots.entry(index).or_default();
        if let Some(id) = id {
            if !id.is_empty() {
                slot.id = id.to_string();
            }
        }
        if let Some(name) = name {
            if !name.is_empty() {
                slot.name = name.to_string();
            }
        }
        slot.args.push_str(args);
    }

    /// Current slots in ascending index order, for attachment to a chunk.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ToolCallRecord> {
        self.slots.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
