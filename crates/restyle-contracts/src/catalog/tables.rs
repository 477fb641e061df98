use super::registry::{DesignStyle, RoomType};

pub const ROOM_TYPES: &[RoomType] = &[
    RoomType {
        key: "living_room",
        name: "Living Room",
        description: "Sofa, lounge and TV area",
        icon: "sofa",
        color: "#6366F1",
        bg_color: "#EEF2FF",
    },
    RoomType {
        key: "bedroom",
        name: "Bedroom",
        description: "Bed, wardrobe and night stands",
        icon: "bed",
        color: "#EC4899",
        bg_color: "#FDF2F8",
    },
    RoomType {
        key: "kitchen",
        name: "Kitchen",
        description: "Cabinets, counters and appliances",
        icon: "chef-hat",
        color: "#F59E0B",
        bg_color: "#FFFBEB",
    },
    RoomType {
        key: "bathroom",
        name: "Bathroom",
        description: "Vanity, shower and tiling",
        icon: "bath",
        color: "#06B6D4",
        bg_color: "#ECFEFF",
    },
    RoomType {
        key: "dining_room",
        name: "Dining Room",
        description: "Table, chairs and lighting",
        icon: "utensils",
        color: "#10B981",
        bg_color: "#ECFDF5",
    },
    RoomType {
        key: "office",
        name: "Home Office",
        description: "Desk, shelving and task lighting",
        icon: "briefcase",
        color: "#8B5CF6",
        bg_color: "#F5F3FF",
    },
    RoomType {
        key: "kids_room",
        name: "Kids Room",
        description: "Play space, storage and bunk beds",
        icon: "baby",
        color: "#F97316",
        bg_color: "#FFF7ED",
    },
    RoomType {
        key: "hallway",
        name: "Hallway",
        description: "Entry, coat storage and mirrors",
        icon: "door-open",
        color: "#64748B",
        bg_color: "#F8FAFC",
    },
];

pub const DESIGN_STYLES: &[DesignStyle] = &[
    DesignStyle {
        key: "modern",
        name: "Modern",
        base: "modern interior with clean lines, neutral palette with bold accents, sleek furniture, glass and metal details, integrated lighting",
        description: "Clean lines and bold accents",
        icon: "sparkles",
        color: "#3B82F6",
        bg_color: "#EFF6FF",
    },
    DesignStyle {
        key: "scandinavian",
        name: "Scandinavian",
        base: "Scandinavian interior with light oak wood, white walls, soft wool textiles, simple functional furniture, lots of natural light and green plants",
        description: "Light wood and cozy textiles",
        icon: "trees",
        color: "#14B8A6",
        bg_color: "#F0FDFA",
    },
    DesignStyle {
        key: "industrial",
        name: "Industrial",
        base: "industrial loft interior with exposed brick, black steel, reclaimed wood, concrete surfaces, Edison bulb pendant lights and leather furniture",
        description: "Brick, steel and concrete",
        icon: "factory",
        color: "#78716C",
        bg_color: "#FAFAF9",
    },
    DesignStyle {
        key: "boho",
        name: "Boho",
        base: "bohemian interior with layered rugs, rattan and macrame, warm earthy colors, patterned cushions, hanging plants and eclectic decor",
        description: "Rattan, plants and warm layers",
        icon: "flower",
        color: "#D97706",
        bg_color: "#FEF3C7",
    },
    DesignStyle {
        key: "minimalist",
        name: "Minimalist",
        base: "minimalist interior with a monochrome palette, hidden storage, very few carefully chosen furniture pieces, uncluttered surfaces and soft diffuse light",
        description: "Less is more",
        icon: "square",
        color: "#6B7280",
        bg_color: "#F9FAFB",
    },
    DesignStyle {
        key: "classic",
        name: "Classic",
        base: "classic elegant interior with wall moldings, rich fabrics, symmetrical layout, tufted upholstery, crystal chandelier and warm brass accents",
        description: "Moldings, brass and symmetry",
        icon: "crown",
        color: "#B45309",
        bg_color: "#FFFBEB",
    },
    DesignStyle {
        key: "japandi",
        name: "Japandi",
        base: "japandi interior blending Japanese and Scandinavian design, low wooden furniture, muted earthy tones, linen, paper lamps and calm balanced composition",
        description: "Calm, low and natural",
        icon: "leaf",
        color: "#65A30D",
        bg_color: "#F7FEE7",
    },
    DesignStyle {
        key: "glamour",
        name: "Glamour",
        base: "glamorous interior with velvet upholstery, gold and mirrored finishes, marble surfaces, statement lighting and a deep jewel-tone palette",
        description: "Velvet, gold and marble",
        icon: "gem",
        color: "#DB2777",
        bg_color: "#FDF2F8",
    },
];
