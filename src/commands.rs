//! Slash commands.
//!
//! Platform-neutral description of the two commands the bot exposes, parsing
//! of their raw option values, and the text of every reply the bot sends.
//! Adapters convert their platform's option payloads into [`OptionValue`]s
//! and render replies with the functions below.

use std::sync::OnceLock;
use regex::Regex;
use crate::controller::ControllerConfig;
use crate::error::{CommandError, ControllerError};
use crate::types::{RunEvent, RunExit, StopResult};

/// Command that starts a run.
pub const START_COMMAND: &str = "spam";

/// Command that stops runs.
pub const STOP_COMMAND: &str = "spam-stop";

/// A raw option value as received from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

/// Kind of a declared option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String,
    Integer,
    Boolean,
}

/// Declaration of one command option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub description: String,
    pub kind: OptionKind,
    pub required: bool,
    /// Inclusive bounds for integers, length bounds for strings
    pub min: Option<u32>,
    pub max: Option<u32>,
}

/// Where a command can be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    /// Installed to a server
    Guild,
    /// Installed to a user account, usable wherever the user is
    User,
}

/// Where a command can be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationContext {
    Guild,
    /// Direct messages with the bot
    BotDm,
    /// Group DMs and DMs other than the bot's
    PrivateChannel,
}

/// Declaration of one command, ready to be registered with a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: String,
    pub options: Vec<OptionSpec>,
    pub installs: Vec<InstallKind>,
    pub contexts: Vec<InvocationContext>,
}

const EVERY_INSTALL: [InstallKind; 2] = [InstallKind::Guild, InstallKind::User];

const EVERY_CONTEXT: [InvocationContext; 3] = [
    InvocationContext::Guild,
    InvocationContext::BotDm,
    InvocationContext::PrivateChannel,
];

/// Commands to register, with limits taken from the controller settings.
pub fn definitions(config: &ControllerConfig) -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: START_COMMAND,
            description: format!("Repeat a message in this channel (up to {} times)", config.max_count),
            options: vec![
                OptionSpec {
                    name: "message",
                    description: "Message to send".to_string(),
                    kind: OptionKind::String,
                    required: true,
                    min: Some(1),
                    max: Some(config.max_message_len as u32),
                },
                OptionSpec {
                    name: "count",
                    description: format!("How many times (1-{})", config.max_count),
                    kind: OptionKind::Integer,
                    required: true,
                    min: Some(1),
                    max: Some(config.max_count),
                },
            ],
            installs: EVERY_INSTALL.to_vec(),
            contexts: EVERY_CONTEXT.to_vec(),
        },
        CommandSpec {
            name: STOP_COMMAND,
            description: "Stop repeating messages".to_string(),
            options: vec![OptionSpec {
                name: "here",
                description: "Only stop the run in this channel".to_string(),
                kind: OptionKind::Boolean,
                required: false,
                min: None,
                max: None,
            }],
            installs: EVERY_INSTALL.to_vec(),
            contexts: EVERY_CONTEXT.to_vec(),
        },
    ]
}

/// A parsed command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Start { message: String, count: u32 },
    /// Stop the run in the invoking channel only, or every run of the user.
    Stop { here: bool },
}

impl SlashCommand {
    /// Parse a command from its name and raw options.
    pub fn parse(name: &str, options: &[(String, OptionValue)]) -> Result<Self, CommandError> {
        match name {
            START_COMMAND => {
                let message = match find(options, "message") {
                    Some(OptionValue::String(s)) => s.trim().to_string(),
                    Some(other) => return Err(invalid("message", format!("expected text, got {:?}", other))),
                    None => return Err(CommandError::MissingOption("message".to_string())),
                };
                let count = match find(options, "count") {
                    Some(value) => parse_count(value)?,
                    None => return Err(CommandError::MissingOption("count".to_string())),
                };
                Ok(SlashCommand::Start { message, count })
            }
            STOP_COMMAND => {
                let here = match find(options, "here") {
                    Some(OptionValue::Boolean(b)) => *b,
                    Some(other) => return Err(invalid("here", format!("expected a boolean, got {:?}", other))),
                    None => false,
                };
                Ok(SlashCommand::Stop { here })
            }
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}

fn find<'a>(options: &'a [(String, OptionValue)], name: &str) -> Option<&'a OptionValue> {
    options.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

fn invalid(name: &str, reason: String) -> CommandError {
    CommandError::InvalidOption {
        name: name.to_string(),
        reason,
    }
}

fn digits() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"^\d+$").expect("static regex"))
}

/// Parse a count from an integer option or from digits-only text.
///
/// Range checks belong to the controller; this only rejects values that are
/// not whole non-negative numbers.
pub fn parse_count(value: &OptionValue) -> Result<u32, CommandError> {
    match value {
        OptionValue::Integer(n) => {
            u32::try_from(*n).map_err(|_| invalid("count", format!("{} is not a valid count", n)))
        }
        OptionValue::String(s) => {
            let s = s.trim();
            if !digits().is_match(s) {
                return Err(invalid("count", "numbers only".to_string()));
            }
            s.parse()
                .map_err(|_| invalid("count", format!("{} is too large", s)))
        }
        OptionValue::Boolean(_) => Err(invalid("count", "numbers only".to_string())),
    }
}

/// Reply text for a run event.
pub fn render_event(event: &RunEvent) -> String {
    match event {
        RunEvent::Started { target, estimated } => format!(
            "Starting: {} message(s), about {} second(s).",
            target,
            estimated.as_secs()
        ),
        RunEvent::PermissionDenied { reason } => format!(
            "I don't have permission to send messages here ({}). Check the bot's permissions.",
            reason
        ),
        RunEvent::DeliveryFailed { reason } => {
            format!("Something went wrong while sending messages ({}).", reason)
        }
        RunEvent::Finished(report) => match &report.exit {
            RunExit::Completed => format!("Done! Sent {} message(s).", report.sent),
            RunExit::Cancelled => format!(
                "Stopped after {} of {} message(s).",
                report.sent, report.target
            ),
            _ => format!(
                "Stopped after {} of {} message(s) because of an error.",
                report.sent, report.target
            ),
        },
    }
}

/// Reply text for a rejected start request.
pub fn render_rejection(error: &ControllerError) -> String {
    match error {
        ControllerError::AlreadyRunning(_) => format!(
            "Already running in this channel. Use /{} to stop it first.",
            STOP_COMMAND
        ),
        ControllerError::InvalidInput(reason) => format!("Invalid input: {}.", reason),
        ControllerError::TaskFailed(_) => "Could not start. Please try again.".to_string(),
    }
}

/// Reply text for a malformed command.
pub fn render_command_error(error: &CommandError) -> String {
    match error {
        CommandError::InvalidOption { name, reason } if name == "count" => {
            format!("Invalid count: {}.", reason)
        }
        other => other.to_string(),
    }
}

/// Reply text for a stop request.
pub fn render_stop(result: &StopResult) -> String {
    match result {
        StopResult::NothingToStop => "Nothing is running.".to_string(),
        StopResult::Stopped(keys) => format!("Stopped {} run(s).", keys.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunKey, RunReport};
    use std::time::Duration;

    fn opts(pairs: &[(&str, OptionValue)]) -> Vec<(String, OptionValue)> {
        pairs.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_parse_start_trims_message() {
        let options = opts(&[
            ("message", OptionValue::String("  hello  ".into())),
            ("count", OptionValue::Integer(3)),
        ]);
        let cmd = SlashCommand::parse(START_COMMAND, &options).unwrap();
        assert_eq!(cmd, SlashCommand::Start { message: "hello".into(), count: 3 });
    }

    #[test]
    fn test_parse_count_from_text() {
        assert_eq!(parse_count(&OptionValue::String(" 12 ".into())), Ok(12));
        assert!(parse_count(&OptionValue::String("12a".into())).is_err());
        assert!(parse_count(&OptionValue::String("-3".into())).is_err());
        assert!(parse_count(&OptionValue::String("".into())).is_err());
        assert!(parse_count(&OptionValue::String("99999999999".into())).is_err());
        assert!(parse_count(&OptionValue::Integer(-1)).is_err());
        assert_eq!(parse_count(&OptionValue::Integer(0)), Ok(0));
    }

    #[test]
    fn test_parse_missing_options() {
        let options = opts(&[("count", OptionValue::Integer(3))]);
        assert_eq!(
            SlashCommand::parse(START_COMMAND, &options),
            Err(CommandError::MissingOption("message".into()))
        );
        assert!(matches!(
            SlashCommand::parse("dance", &[]),
            Err(CommandError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_parse_stop() {
        assert_eq!(
            SlashCommand::parse(STOP_COMMAND, &[]),
            Ok(SlashCommand::Stop { here: false })
        );
        let options = opts(&[("here", OptionValue::Boolean(true))]);
        assert_eq!(
            SlashCommand::parse(STOP_COMMAND, &options),
            Ok(SlashCommand::Stop { here: true })
        );
    }

    #[test]
    fn test_definitions_follow_config() {
        let config = ControllerConfig::default().with_limits(200, 20);
        let defs = definitions(&config);
        assert_eq!(defs.len(), 2);

        let count = defs[0].options.iter().find(|o| o.name == "count").unwrap();
        assert_eq!(count.max, Some(20));
        let message = defs[0].options.iter().find(|o| o.name == "message").unwrap();
        assert_eq!(message.max, Some(200));
        assert!(!defs[1].options[0].required);

        for def in &defs {
            assert_eq!(def.installs, vec![InstallKind::Guild, InstallKind::User]);
            assert_eq!(
                def.contexts,
                vec![
                    InvocationContext::Guild,
                    InvocationContext::BotDm,
                    InvocationContext::PrivateChannel
                ]
            );
        }
    }

    #[test]
    fn test_render_replies() {
        let started = RunEvent::Started { target: 3, estimated: Duration::from_secs(4) };
        assert_eq!(render_event(&started), "Starting: 3 message(s), about 4 second(s).");

        let finished = RunEvent::Finished(RunReport {
            key: RunKey::new("u1", "c1"),
            sent: 3,
            target: 3,
            exit: RunExit::Completed,
            rate_limit_retries: 0,
        });
        assert_eq!(render_event(&finished), "Done! Sent 3 message(s).");

        assert_eq!(render_stop(&StopResult::NothingToStop), "Nothing is running.");
        assert!(render_rejection(&ControllerError::AlreadyRunning(RunKey::new("u", "c")))
            .contains(STOP_COMMAND));
    }
}
