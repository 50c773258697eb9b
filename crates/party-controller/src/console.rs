//! Line commands for the developer console.
//!
//! Parsing is separate from execution so the grammar can be tested without
//! an actor.

use crate::actors::PartyHandle;
use crate::errors::PartyError;
use crate::session::{MemberId, Privacy, SessionId};
use thiserror::Error;

/// Text printed by `help`.
pub const HELP: &str = "\
commands:
  info [json]                show the current party
  host                       create a new party
  join <id>                  join a listed party
  join_random                join a random public party
  leave                      leave the party (re-hosts)
  kick <member>              kick a member (owner)
  promote <member>           hand ownership to a member (owner)
  privacy [0|1|2]            set or cycle privacy (owner)
  joinable [true|false]      set or flip joinability (owner)
  start                      start the transport and wait for members (owner)
  shutdown                   stop the transport (owner)
  override <true|false>      skip the minimum member check on start
  say <text>                 send a chat message
  command <name> [args..]    send a custom control command
  refresh                    re-publish the party snapshot
  quit                       exit";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("Unknown command: {0} (try 'help')")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid value for {what}: {value}")]
    InvalidValue { what: &'static str, value: String },
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    /// Show the current party, optionally as JSON.
    Info { json: bool },
    Host,
    Join(SessionId),
    JoinRandom,
    Leave,
    Kick(MemberId),
    Promote(MemberId),
    Privacy(Option<Privacy>),
    Joinable(Option<bool>),
    Start,
    Shutdown,
    Override(bool),
    Say(String),
    Command { name: String, args: Vec<String> },
    Refresh,
    Quit,
}

impl ConsoleCommand {
    /// Parse a line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, ConsoleError> {
        let line = line.trim();
        let Some((verb, rest)) = split_verb(line) else {
            return Ok(None);
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match verb {
            "help" | "?" => ConsoleCommand::Help,
            "info" => match args.as_slice() {
                [] => ConsoleCommand::Info { json: false },
                ["json"] => ConsoleCommand::Info { json: true },
                _ => return Err(ConsoleError::Usage("info [json]")),
            },
            "host" => ConsoleCommand::Host,
            "join" => ConsoleCommand::Join(single(&args, "join <id>", "party id")?),
            "join_random" => ConsoleCommand::JoinRandom,
            "leave" => ConsoleCommand::Leave,
            "kick" => ConsoleCommand::Kick(single(&args, "kick <member>", "member id")?),
            "promote" => {
                ConsoleCommand::Promote(single(&args, "promote <member>", "member id")?)
            }
            "privacy" => ConsoleCommand::Privacy(optional_privacy(&args)?),
            "joinable" => ConsoleCommand::Joinable(optional(
                &args,
                "joinable [true|false]",
                "joinable",
            )?),
            "start" => ConsoleCommand::Start,
            "shutdown" => ConsoleCommand::Shutdown,
            "override" => ConsoleCommand::Override(single(
                &args,
                "override <true|false>",
                "override",
            )?),
            "say" => {
                if rest.trim().is_empty() {
                    return Err(ConsoleError::Usage("say <text>"));
                }
                ConsoleCommand::Say(rest.trim().to_string())
            }
            "command" => {
                let Some((name, tail)) = args.split_first() else {
                    return Err(ConsoleError::Usage("command <name> [args..]"));
                };
                ConsoleCommand::Command {
                    name: (*name).to_string(),
                    args: tail.iter().map(|a| (*a).to_string()).collect(),
                }
            }
            "refresh" => ConsoleCommand::Refresh,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(ConsoleError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }

    /// Run the command against an actor and describe the outcome.
    ///
    /// `Quit` is handled by the caller and yields an empty string here.
    pub async fn execute(self, handle: &PartyHandle) -> Result<String, PartyError> {
        Ok(match self {
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Info { json: false } => handle.info().await?.to_string(),
            ConsoleCommand::Info { json: true } => {
                let info = handle.info().await?;
                serde_json::to_string_pretty(&info)
                    .map_err(|e| PartyError::Internal(format!("info serialization failed: {e}")))?
            }
            ConsoleCommand::Host => format!("hosting party {}", handle.host().await?),
            ConsoleCommand::Join(id) => format!("joined party {}", handle.join(id).await?),
            ConsoleCommand::JoinRandom => {
                format!("joined party {}", handle.join_random().await?)
            }
            ConsoleCommand::Leave => {
                handle.leave(false).await?;
                "left the party".to_string()
            }
            ConsoleCommand::Kick(member) => {
                handle.kick(member).await?;
                format!("kick sent for {member}")
            }
            ConsoleCommand::Promote(member) => {
                handle.promote(member).await?;
                format!("promoted {member}")
            }
            ConsoleCommand::Privacy(privacy) => {
                let privacy = handle.toggle_privacy(privacy).await?;
                format!("privacy set to {}", privacy.label())
            }
            ConsoleCommand::Joinable(joinable) => {
                format!("joinable set to {}", handle.toggle_joinable(joinable).await?)
            }
            ConsoleCommand::Start => {
                let report = handle.start_transport().await?;
                format!(
                    "all {} of {} players connected in {:.1}s",
                    report.connected,
                    report.expected,
                    report.elapsed.as_secs_f32()
                )
            }
            ConsoleCommand::Shutdown => {
                handle.shutdown_transport().await?;
                "transport stopped".to_string()
            }
            ConsoleCommand::Override(enabled) => {
                handle.set_start_override(enabled).await?;
                format!("start override {}", if enabled { "on" } else { "off" })
            }
            ConsoleCommand::Say(text) => {
                handle.send_chat(text).await?;
                String::new()
            }
            ConsoleCommand::Command { name, args } => {
                handle.send_command(name.clone(), args).await?;
                format!("sent {name}")
            }
            ConsoleCommand::Refresh => {
                handle.refresh().await?;
                String::new()
            }
            ConsoleCommand::Quit => String::new(),
        })
    }
}

fn split_verb(line: &str) -> Option<(&str, &str)> {
    if line.is_empty() {
        return None;
    }
    Some(match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest),
        None => (line, ""),
    })
}

fn single<T: std::str::FromStr>(
    args: &[&str],
    usage: &'static str,
    what: &'static str,
) -> Result<T, ConsoleError> {
    match args {
        [value] => value.parse().map_err(|_| ConsoleError::InvalidValue {
            what,
            value: (*value).to_string(),
        }),
        _ => Err(ConsoleError::Usage(usage)),
    }
}

fn optional<T: std::str::FromStr>(
    args: &[&str],
    usage: &'static str,
    what: &'static str,
) -> Result<Option<T>, ConsoleError> {
    if args.is_empty() {
        Ok(None)
    } else {
        single(args, usage, what).map(Some)
    }
}

fn optional_privacy(args: &[&str]) -> Result<Option<Privacy>, ConsoleError> {
    let Some(raw) = optional::<u8>(args, "privacy [0|1|2]", "privacy")? else {
        return Ok(None);
    };
    Privacy::from_u8(raw)
        .map(Some)
        .ok_or_else(|| ConsoleError::InvalidValue {
            what: "privacy",
            value: raw.to_string(),
        })
}
