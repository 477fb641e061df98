use indexmap::IndexMap;
use serde::Serialize;

use super::tables::{DESIGN_STYLES, ROOM_TYPES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoomType {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub bg_color: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DesignStyle {
    pub key: &'static str,
    pub name: &'static str,
    /// Prompt fragment handed to the image model.
    pub base: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub bg_color: &'static str,
}

/// Read-only room and style tables, keyed and ordered as displayed.
#[derive(Debug, Clone)]
pub struct Catalog {
    rooms: IndexMap<&'static str, RoomType>,
    styles: IndexMap<&'static str, DesignStyle>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(ROOM_TYPES, DESIGN_STYLES)
    }
}

impl Catalog {
    pub fn new(rooms: &[RoomType], styles: &[DesignStyle]) -> Self {
        Self {
            rooms: rooms.iter().map(|room| (room.key, *room)).collect(),
            styles: styles.iter().map(|style| (style.key, *style)).collect(),
        }
    }

    pub fn room(&self, key: &str) -> Option<&RoomType> {
        self.rooms.get(normalize_key(key).as_str())
    }

    pub fn style(&self, key: &str) -> Option<&DesignStyle> {
        self.styles.get(normalize_key(key).as_str())
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomType> {
        self.rooms.values()
    }

    pub fn styles(&self) -> impl Iterator<Item = &DesignStyle> {
        self.styles.values()
    }

    pub fn room_keys(&self) -> Vec<&'static str> {
        self.rooms.keys().copied().collect()
    }

    pub fn style_keys(&self) -> Vec<&'static str> {
        self.styles.keys().copied().collect()
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}
