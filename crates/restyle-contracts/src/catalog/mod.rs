mod registry;
mod tables;

pub use registry::{Catalog, DesignStyle, RoomType};
pub use tables::{DESIGN_STYLES, ROOM_TYPES};
