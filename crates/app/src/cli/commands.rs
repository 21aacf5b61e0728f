//! Interactive prompt commands, parsed with clap one line at a time

use clap::{CommandFactory, Parser, Subcommand};
use eqtrain_core::domain::audio::FileHandle;
use eqtrain_core::domain::{BuiltinSource, Command};

/// One parsed prompt line
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Forwarded to the session
    Session(Command),
    Status { json: bool },
    Grid,
    Help,
    Quit,
}

#[derive(Parser, Debug)]
#[command(multicall = true, disable_help_subcommand = true)]
#[command(help_template = "Commands:\n{subcommands}")]
struct PromptLine {
    #[command(subcommand)]
    command: PromptCommand,
}

#[derive(Subcommand, Debug)]
enum PromptCommand {
    /// Toggle playback
    #[command(visible_alias = "p")]
    Play,

    /// Toggle the equalizer bypass
    #[command(visible_alias = "b")]
    Bypass,

    /// Set output volume, 0.0 to 1.0
    #[command(visible_alias = "vol")]
    Volume {
        #[arg(value_parser = finite, allow_negative_numbers = true)]
        volume: f32,
    },

    /// Switch to a built-in noise source
    Source {
        /// white, pink or brown
        source: BuiltinSource,
    },

    /// Play an audio file
    Load {
        #[arg(required = true, trailing_var_arg = true)]
        path: Vec<String>,
    },

    /// Guess the hidden band, e.g. `guess 1000 -6`
    #[command(visible_alias = "g")]
    Guess {
        #[arg(value_parser = finite)]
        frequency: f32,

        #[arg(value_parser = finite, allow_negative_numbers = true)]
        gain_db: f32,
    },

    /// Zero the score and start a new round
    Reset,

    /// Show the current state
    #[command(visible_alias = "s")]
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the guess grid with feedback
    Grid,

    /// Show this help
    #[command(visible_alias = "?")]
    Help,

    /// Exit
    #[command(visible_aliases = ["exit", "q"])]
    Quit,
}

impl From<PromptCommand> for Input {
    fn from(command: PromptCommand) -> Self {
        match command {
            PromptCommand::Play => Input::Session(Command::TogglePlayback),
            PromptCommand::Bypass => Input::Session(Command::ToggleBypass),
            PromptCommand::Volume { volume } => Input::Session(Command::SetVolume { volume }),
            PromptCommand::Source { source } => Input::Session(Command::SetSource {
                kind: source.kind(),
            }),
            // Split on whitespace by the prompt, rejoined here
            PromptCommand::Load { path } => Input::Session(Command::LoadFile {
                handle: FileHandle::from_path(path.join(" ")),
            }),
            PromptCommand::Guess { frequency, gain_db } => {
                Input::Session(Command::SubmitGuess { frequency, gain_db })
            }
            PromptCommand::Reset => Input::Session(Command::ResetGame),
            PromptCommand::Status { json } => Input::Status { json },
            PromptCommand::Grid => Input::Grid,
            PromptCommand::Help => Input::Help,
            PromptCommand::Quit => Input::Quit,
        }
    }
}

fn finite(raw: &str) -> Result<f32, String> {
    match raw.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("'{}' is not a number", raw)),
    }
}

/// Command overview for the prompt
pub fn help() -> String {
    PromptLine::command().render_help().to_string()
}

/// Parse a prompt line; blank lines yield `None`
///
/// Errors carry clap's rendered message, ready to print.
pub fn parse(line: &str) -> Result<Option<Input>, String> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    PromptLine::try_parse_from(line.split_whitespace())
        .map(|prompt| Some(prompt.command.into()))
        .map_err(|e| e.to_string())
}
