#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "load",
        action: "load_image",
    },
    CommandSpec {
        command: "upload",
        action: "load_image",
    },
];

pub(crate) const KEY_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "room",
        action: "select_room",
    },
    CommandSpec {
        command: "style",
        action: "select_style",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "usage",
        action: "usage",
    },
    CommandSpec {
        command: "catalog",
        action: "catalog",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "start_over",
        action: "reset",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const REGENERATE_COMMAND: CommandSpec = CommandSpec {
    command: "regen",
    action: "regenerate",
};

pub(crate) const SAVE_COMMAND: CommandSpec = CommandSpec {
    command: "save",
    action: "save",
};

pub const STUDIO_HELP_COMMANDS: &[&str] = &[
    "/load",
    "/room",
    "/style",
    "/generate",
    "/regen",
    "/save",
    "/status",
    "/usage",
    "/catalog",
    "/reset",
    "/quit",
];
