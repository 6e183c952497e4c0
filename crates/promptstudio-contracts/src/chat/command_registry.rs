#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
}

/// Commands that take no argument.
pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "reset",
        usage: "/reset",
        summary: "clear entered fields, preset and optimized result",
    },
    CommandSpec {
        command: "fields",
        usage: "/fields",
        summary: "show the fields visible at the current mode",
    },
    CommandSpec {
        command: "optimize",
        usage: "/optimize",
        summary: "refine the compiled prompt through the text model",
    },
    CommandSpec {
        command: "render",
        usage: "/render",
        summary: "render the current prompt",
    },
    CommandSpec {
        command: "log",
        usage: "/log",
        summary: "show the gateway debug log",
    },
    CommandSpec {
        command: "help",
        usage: "/help",
        summary: "list commands",
    },
    CommandSpec {
        command: "quit",
        usage: "/quit",
        summary: "leave the studio",
    },
];

/// Commands whose whole remainder is a single argument.
pub(crate) const SINGLE_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "scene",
        usage: "/scene <id>",
        summary: "switch scene (clears entered fields)",
    },
    CommandSpec {
        command: "mode",
        usage: "/mode <beginner|advanced|expert>",
        summary: "change user mode",
    },
    CommandSpec {
        command: "preset",
        usage: "/preset <id>",
        summary: "apply a preset",
    },
    CommandSpec {
        command: "revert",
        usage: "/revert <field>",
        summary: "restore a field to the active preset's value",
    },
    CommandSpec {
        command: "restore",
        usage: "/restore <history id>",
        summary: "load a past render's fields",
    },
];

/// Commands taking a field key followed by a value.
pub(crate) const FIELD_VALUE_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "set",
        usage: "/set <field> <value>",
        summary: "set a field value",
    },
    CommandSpec {
        command: "weight",
        usage: "/weight <field> <percent>",
        summary: "override a field weight (expert)",
    },
];

pub(crate) const COMPILE_COMMAND: CommandSpec = CommandSpec {
    command: "compile",
    usage: "/compile [base|optimized]",
    summary: "print the compiled prompt",
};

pub(crate) const HISTORY_COMMAND: CommandSpec = CommandSpec {
    command: "history",
    usage: "/history [clear]",
    summary: "list or clear recent renders",
};

pub(crate) const COMMAND_ALIASES: &[(&str, &str)] = &[("exit", "quit"), ("q", "quit"), ("?", "help")];

pub(crate) fn all_commands() -> impl Iterator<Item = &'static CommandSpec> {
    NO_ARG_COMMANDS
        .iter()
        .chain(SINGLE_ARG_COMMANDS.iter())
        .chain(FIELD_VALUE_COMMANDS.iter())
        .chain([&COMPILE_COMMAND, &HISTORY_COMMAND])
}

pub(crate) fn find_command<'a>(command: &str, specs: &'a [CommandSpec]) -> Option<&'a CommandSpec> {
    specs.iter().find(|spec| spec.command == command)
}

pub(crate) fn resolve_alias(command: &str) -> &str {
    COMMAND_ALIASES
        .iter()
        .find(|(alias, _)| *alias == command)
        .map(|(_, target)| *target)
        .unwrap_or(command)
}

/// `(usage, summary)` rows for help output, sorted by command name.
pub fn help_rows() -> Vec<(&'static str, &'static str)> {
    let mut specs = all_commands().collect::<Vec<_>>();
    specs.sort_by_key(|spec| spec.command);
    specs
        .into_iter()
        .map(|spec| (spec.usage, spec.summary))
        .collect()
}
