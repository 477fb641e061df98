use super::registry::{
    CommandSpec, KEY_ARG_COMMANDS, NO_ARG_COMMANDS, REGENERATE_COMMAND, SAVE_COMMAND,
    SINGLE_PATH_COMMANDS,
};

/// One line of studio input. Variant numbers are 1-based as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioCommand {
    Noop,
    Help,
    LoadImage { path: String },
    SelectRoom { key: String },
    SelectStyle { key: String },
    Generate,
    Regenerate { variant: Option<usize> },
    Save { variant: Option<usize>, ratio: Option<String> },
    Status,
    Usage,
    Catalog,
    Reset,
    Quit,
    Unknown { command: String, arg: String },
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    parse_path_args(arg).join(" ")
}

fn parse_variant(raw: Option<&str>) -> Option<usize> {
    raw?.trim().trim_start_matches('#').parse::<usize>().ok()
}

fn no_arg_command(action: &str) -> StudioCommand {
    match action {
        "generate" => StudioCommand::Generate,
        "status" => StudioCommand::Status,
        "usage" => StudioCommand::Usage,
        "catalog" => StudioCommand::Catalog,
        "reset" => StudioCommand::Reset,
        "quit" => StudioCommand::Quit,
        _ => StudioCommand::Help,
    }
}

pub fn parse_command(text: &str) -> StudioCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return StudioCommand::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return StudioCommand::Unknown {
            command: String::new(),
            arg: raw_trimmed.to_string(),
        };
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return StudioCommand::Unknown {
            command: String::new(),
            arg: raw_trimmed.to_string(),
        };
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if find_action(&command, SINGLE_PATH_COMMANDS).is_some() {
        return StudioCommand::LoadImage {
            path: parse_single_path_arg(arg),
        };
    }

    if let Some(action) = find_action(&command, KEY_ARG_COMMANDS) {
        let key = arg.to_string();
        return if action == "select_room" {
            StudioCommand::SelectRoom { key }
        } else {
            StudioCommand::SelectStyle { key }
        };
    }

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return no_arg_command(action);
    }

    if command == REGENERATE_COMMAND.command {
        return StudioCommand::Regenerate {
            variant: parse_variant(arg.split_whitespace().next()),
        };
    }

    if command == SAVE_COMMAND.command {
        let mut parts = arg.split_whitespace();
        let variant = parse_variant(parts.next());
        let ratio = parts.next().map(str::to_string);
        return StudioCommand::Save { variant, ratio };
    }

    StudioCommand::Unknown {
        command,
        arg: arg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_command, StudioCommand};

    #[test]
    fn parse_load_quoted_path() {
        assert_eq!(
            parse_command("/load \"/tmp/my room.jpg\""),
            StudioCommand::LoadImage {
                path: "/tmp/my room.jpg".to_string()
            }
        );
        assert_eq!(
            parse_command("/upload a.png"),
            StudioCommand::LoadImage {
                path: "a.png".to_string()
            }
        );
    }

    #[test]
    fn parse_room_and_style_keys() {
        assert_eq!(
            parse_command("/room kitchen"),
            StudioCommand::SelectRoom {
                key: "kitchen".to_string()
            }
        );
        assert_eq!(
            parse_command("  /STYLE   modern "),
            StudioCommand::SelectStyle {
                key: "modern".to_string()
            }
        );
    }

    #[test]
    fn parse_regen_and_save_variants() {
        assert_eq!(
            parse_command("/regen 2"),
            StudioCommand::Regenerate { variant: Some(2) }
        );
        assert_eq!(
            parse_command("/regen x"),
            StudioCommand::Regenerate { variant: None }
        );
        assert_eq!(
            parse_command("/save #3 4:3"),
            StudioCommand::Save {
                variant: Some(3),
                ratio: Some("4:3".to_string())
            }
        );
        assert_eq!(
            parse_command("/save 1"),
            StudioCommand::Save {
                variant: Some(1),
                ratio: None
            }
        );
    }

    #[test]
    fn parse_no_arg_aliases() {
        assert_eq!(parse_command("/generate"), StudioCommand::Generate);
        assert_eq!(parse_command("/start_over"), StudioCommand::Reset);
        assert_eq!(parse_command("/exit"), StudioCommand::Quit);
        assert_eq!(parse_command("   "), StudioCommand::Noop);
    }

    #[test]
    fn parse_unknown_command_and_plain_text() {
        assert_eq!(
            parse_command("/magic foo bar"),
            StudioCommand::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string()
            }
        );
        assert_eq!(
            parse_command("make it pink"),
            StudioCommand::Unknown {
                command: String::new(),
                arg: "make it pink".to_string()
            }
        );
    }
}
