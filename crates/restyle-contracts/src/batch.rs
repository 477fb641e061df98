use serde::Serialize;

use crate::catalog::{DesignStyle, RoomType};

pub const BATCH_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Success,
    Failed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    /// Display label, e.g. `Kitchen - Modern (Variant 2)`.
    pub id: String,
    /// Style prompt the item was generated from.
    pub base: String,
    pub room_key: String,
    pub style_key: String,
    pub status: ItemStatus,
    #[serde(skip_serializing)]
    pub image: Option<String>,
}

impl GeneratedImage {
    pub fn placeholder(room: &RoomType, style: &DesignStyle, ordinal: usize) -> Self {
        Self {
            id: format!("{} - {} (Variant {})", room.name, style.name, ordinal),
            base: style.base.to_string(),
            room_key: room.key.to_string(),
            style_key: style.key.to_string(),
            status: ItemStatus::Pending,
            image: None,
        }
    }

    pub fn has_keys(&self) -> bool {
        !self.room_key.trim().is_empty() && !self.style_key.trim().is_empty()
    }
}

/// Outcome of one generation call as applied to a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Generated(String),
    Failed(String),
}

/// The three slots created by one generate action.
///
/// Slots are addressed by index, so display order never depends on the order
/// in which concurrent calls resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    generation: u64,
    items: [GeneratedImage; BATCH_SIZE],
}

impl Batch {
    pub fn placeholders(room: &RoomType, style: &DesignStyle, generation: u64) -> Self {
        Self {
            generation,
            items: std::array::from_fn(|idx| GeneratedImage::placeholder(room, style, idx + 1)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn items(&self) -> &[GeneratedImage] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&GeneratedImage> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Applies a terminal outcome to a pending slot. Returns `false` when the
    /// slot does not exist or has already settled.
    pub fn settle(&mut self, index: usize, outcome: ItemOutcome) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        if item.status != ItemStatus::Pending {
            return false;
        }
        match outcome {
            ItemOutcome::Generated(image) => {
                item.status = ItemStatus::Success;
                item.image = Some(image);
            }
            ItemOutcome::Failed(_) => {
                item.status = ItemStatus::Failed;
                item.image = None;
            }
        }
        true
    }

    /// Puts one settled slot back to pending for regeneration. The previous
    /// image is kept until the new outcome replaces it.
    pub fn reopen(&mut self, index: usize) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        if item.status == ItemStatus::Pending {
            return false;
        }
        item.status = ItemStatus::Pending;
        true
    }

    pub fn pending_count(&self) -> usize {
        self.count(ItemStatus::Pending)
    }

    pub fn success_count(&self) -> usize {
        self.count(ItemStatus::Success)
    }

    pub fn failed_count(&self) -> usize {
        self.count(ItemStatus::Failed)
    }

    pub fn is_running(&self) -> bool {
        self.pending_count() > 0
    }

    pub fn is_settled(&self) -> bool {
        !self.is_running()
    }

    /// Percentage of settled slots, 0.0..=100.0.
    pub fn progress(&self) -> f64 {
        let settled = self.len() - self.pending_count();
        settled as f64 / self.len() as f64 * 100.0
    }

    fn count(&self, status: ItemStatus) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == status)
            .count()
    }
}
