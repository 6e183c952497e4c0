use crate::prompt::FieldKey;
use crate::scenes::UserMode;

use super::command_registry::{
    find_command, resolve_alias, COMPILE_COMMAND, FIELD_VALUE_COMMANDS, HISTORY_COMMAND,
    NO_ARG_COMMANDS, SINGLE_ARG_COMMANDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileView {
    Base,
    Optimized,
}

/// One parsed line of studio input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioCommand {
    Noop,
    Scene(String),
    Mode(UserMode),
    Set { key: FieldKey, value: String },
    Weight { key: FieldKey, percent: u32 },
    Preset(String),
    Revert(FieldKey),
    Reset,
    Fields,
    Compile(CompileView),
    Optimize,
    Render,
    History,
    ClearHistory,
    Restore(String),
    Log,
    Help,
    Quit,
    Invalid { command: String, reason: String },
    Unknown { command: String, arg: String },
}

fn split_args(arg: &str) -> Vec<String> {
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

fn single_arg(arg: &str) -> String {
    split_args(arg).join(" ")
}

fn invalid(command: &str, reason: impl Into<String>) -> StudioCommand {
    StudioCommand::Invalid {
        command: command.to_string(),
        reason: reason.into(),
    }
}

fn parse_field_value(command: &str, arg: &str) -> StudioCommand {
    let mut parts = split_args(arg).into_iter();
    let Some(raw_key) = parts.next() else {
        return invalid(command, "missing field name");
    };
    let key = match raw_key.parse::<FieldKey>() {
        Ok(key) => key,
        Err(reason) => return invalid(command, reason),
    };
    let rest = parts.collect::<Vec<_>>().join(" ");

    if command == "weight" {
        let trimmed = rest.trim().trim_end_matches('%');
        return match trimmed.parse::<u32>() {
            Ok(percent) => StudioCommand::Weight { key, percent },
            Err(_) => invalid(command, format!("'{}' is not a whole percentage", rest.trim())),
        };
    }
    StudioCommand::Set { key, value: rest }
}

fn parse_single(command: &str, arg: &str) -> StudioCommand {
    let value = single_arg(arg);
    if value.is_empty() {
        return invalid(command, "missing argument");
    }
    match command {
        "scene" => StudioCommand::Scene(value),
        "preset" => StudioCommand::Preset(value),
        "restore" => StudioCommand::Restore(value),
        "mode" => match value.parse::<UserMode>() {
            Ok(mode) => StudioCommand::Mode(mode),
            Err(reason) => invalid(command, reason),
        },
        "revert" => match value.parse::<FieldKey>() {
            Ok(key) => StudioCommand::Revert(key),
            Err(reason) => invalid(command, reason),
        },
        _ => StudioCommand::Unknown {
            command: command.to_string(),
            arg: arg.to_string(),
        },
    }
}

/// Parses a line of studio input. Slash commands map to their typed
/// variant; bare text sets the subject.
pub fn parse_command(text: &str) -> StudioCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return StudioCommand::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return StudioCommand::Set {
            key: FieldKey::Subject,
            value: raw_trimmed.to_string(),
        };
    };

    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '?')
        .count();
    if command_len == 0 {
        return StudioCommand::Unknown {
            command: String::new(),
            arg: slash_tail.to_string(),
        };
    }
    let lowered = slash_tail[..command_len].to_ascii_lowercase();
    let command = resolve_alias(&lowered);
    let arg = slash_tail[command_len..].trim();

    if find_command(command, FIELD_VALUE_COMMANDS).is_some() {
        return parse_field_value(command, arg);
    }
    if find_command(command, SINGLE_ARG_COMMANDS).is_some() {
        return parse_single(command, arg);
    }
    if command == COMPILE_COMMAND.command {
        return match arg.to_ascii_lowercase().as_str() {
            "" | "base" => StudioCommand::Compile(CompileView::Base),
            "optimized" | "opt" => StudioCommand::Compile(CompileView::Optimized),
            other => invalid(command, format!("unknown view '{other}'")),
        };
    }
    if command == HISTORY_COMMAND.command {
        return match arg.to_ascii_lowercase().as_str() {
            "" => StudioCommand::History,
            "clear" => StudioCommand::ClearHistory,
            other => invalid(command, format!("unknown history action '{other}'")),
        };
    }
    if find_command(command, NO_ARG_COMMANDS).is_some() {
        return match command {
            "reset" => StudioCommand::Reset,
            "fields" => StudioCommand::Fields,
            "optimize" => StudioCommand::Optimize,
            "render" => StudioCommand::Render,
            "log" => StudioCommand::Log,
            "help" => StudioCommand::Help,
            _ => StudioCommand::Quit,
        };
    }

    StudioCommand::Unknown {
        command: command.to_string(),
        arg: arg.to_string(),
    }
}
