//! Command line interface.

use std::io::Write;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use quill_core::{KEY_API_KEY, paths};
use serde_json::Value;

use crate::settings::{SettingsController, SettingsForm};

const LOG_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "quill", version)]
#[command(about = "Rewrite highlighted text with a global hotkey and a chat completion model")]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Defaults file to merge settings over (defaults to the built-in defaults)
    #[arg(long, global = true)]
    pub defaults: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The subcommand to run, `run` when none was given.
    pub fn command_or_run(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Run)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run in the tray and listen for hotkeys (the default)
    Run,

    /// View or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum SettingsCommand {
    /// Print the current settings
    Show {
        /// Only print the values that differ from the defaults
        #[arg(long)]
        overrides: bool,
    },

    /// Print one setting
    Get { key: String },

    /// Change one setting. VALUE is read as JSON, falling back to a string
    Set { key: String, value: String },

    /// Change the main settings together, validating them like the settings
    /// dialog does
    Save {
        #[arg(long)]
        api_key: Option<String>,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        max_tokens: Option<String>,

        #[arg(long)]
        stream: Option<bool>,
    },

    /// List the models that can be selected
    Models {
        /// Fetch the list again instead of using the cache
        #[arg(long)]
        refresh: bool,
    },

    /// Switch the completion model
    Select { model: String },

    /// Replace the settings with those from a file
    Import { path: PathBuf },

    /// Drop every change and return to the defaults
    Reset,

    /// Print the application log
    Log {
        /// Number of trailing lines to print
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,

        /// Keep printing new lines as they are written
        #[arg(short, long)]
        follow: bool,
    },

    /// Print the files quill uses
    Paths,
}

/// Reads a command line value as JSON, or as a plain string if it is not JSON.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Hides all but the ends of an API key.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n <= 8 => "*".repeat(n),
        n => format!(
            "{}...{}",
            chars[..3].iter().collect::<String>(),
            chars[n - 4..].iter().collect::<String>()
        ),
    }
}

fn masked(mut value: Value) -> Value {
    if let Some(Value::String(key)) = value.get_mut(KEY_API_KEY) {
        *key = mask_api_key(key);
    }
    value
}

/// Runs a `quill settings` subcommand, writing results to `out`.
pub fn run_settings(
    controller: &SettingsController,
    command: &SettingsCommand,
    out: &mut impl Write,
) -> Result<()> {
    let context = controller.context();
    match command {
        SettingsCommand::Show { overrides } => {
            let value = if *overrides {
                Value::Object(context.settings().read().overrides().clone())
            } else {
                serde_json::to_value(context.snapshot())?
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&masked(value))?)?;
        }
        SettingsCommand::Get { key } => {
            let Some(value) = context.settings().read().get(key).cloned() else {
                bail!("Unknown setting {key:?}");
            };
            let value = match value {
                Value::String(s) if key == KEY_API_KEY => Value::String(mask_api_key(&s)),
                value => value,
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        }
        SettingsCommand::Set { key, value } => {
            context.settings().write().set(key, parse_value(value))?;
            writeln!(out, "Updated {key}")?;
        }
        SettingsCommand::Save {
            api_key,
            model,
            max_tokens,
            stream,
        } => {
            let settings = context.snapshot();
            let form = SettingsForm {
                api_key: api_key.clone().unwrap_or(settings.api_key),
                models: Vec::new(),
                model: model.clone(),
                max_tokens: max_tokens
                    .clone()
                    .unwrap_or_else(|| settings.max_tokens.to_string()),
                stream: stream.unwrap_or(settings.stream),
            };
            controller.save_form(&form)?;
            writeln!(out, "Settings saved")?;
        }
        SettingsCommand::Models { refresh } => {
            let selected = context.snapshot().model;
            let models = controller.available_models(*refresh)?;
            if models.is_empty() {
                writeln!(out, "No models available. Is the API key set?")?;
            }
            for model in models {
                let marker = if model == selected { "*" } else { " " };
                writeln!(out, "{marker} {model}")?;
            }
        }
        SettingsCommand::Select { model } => {
            controller.select_model(model)?;
            writeln!(out, "Selected {model}")?;
        }
        SettingsCommand::Import { path } => {
            controller.import(path)?;
            writeln!(out, "Imported settings from {}", path.display())?;
        }
        SettingsCommand::Reset => {
            controller.reset()?;
            writeln!(out, "Settings reset to defaults")?;
        }
        SettingsCommand::Log { lines, follow } => {
            for line in controller.log_tail(*lines)? {
                writeln!(out, "{line}")?;
            }
            if *follow {
                let (_, mut offset) = controller.log_since(0)?;
                loop {
                    out.flush()?;
                    sleep(LOG_POLL_INTERVAL);
                    let (text, next) = controller.log_since(offset)?;
                    write!(out, "{text}")?;
                    offset = next;
                }
            }
        }
        SettingsCommand::Paths => {
            let paths = context.paths();
            writeln!(out, "config:      {}", paths.config.display())?;
            match &paths.defaults {
                Some(defaults) => writeln!(out, "defaults:    {}", defaults.display())?,
                None => writeln!(out, "defaults:    (built in)")?,
            }
            writeln!(out, "model cache: {}", paths.model_cache.display())?;
            writeln!(out, "log:         {}", paths.log.display())?;
            writeln!(
                out,
                "data dir:    {}",
                paths::default_data_dir()
                    .context("Failed to locate data directory")?
                    .display()
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::CommandFactory;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::context::testing::context_in;

    fn run(controller: &SettingsController, command: SettingsCommand) -> Result<String> {
        let mut out = Vec::new();
        run_settings(controller, &command, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["quill"]).unwrap();
        assert_eq!(cli.command_or_run(), &Command::Run);
        assert_eq!(cli.config, None);
    }

    #[test]
    fn test_parse_settings_commands() {
        let cli = Cli::try_parse_from([
            "quill",
            "settings",
            "save",
            "--api-key",
            "sk-test",
            "--stream",
            "true",
            "--config",
            "/tmp/quill.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/quill.json")));
        assert_eq!(
            cli.command_or_run(),
            &Command::Settings(SettingsCommand::Save {
                api_key: Some("sk-test".to_string()),
                model: None,
                max_tokens: None,
                stream: Some(true),
            })
        );

        let cli = Cli::try_parse_from(["quill", "settings", "log", "-n", "5", "--follow"]).unwrap();
        assert_eq!(
            cli.command_or_run(),
            &Command::Settings(SettingsCommand::Log {
                lines: 5,
                follow: true
            })
        );

        assert!(Cli::try_parse_from(["quill", "settings", "set", "model"]).is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("512"), json!(512));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("[1, 2048]"), json!([1, 2048]));
        assert_eq!(parse_value("gpt-4o"), json!("gpt-4o"));
        assert_eq!(parse_value("\"42\""), json!("42"));
    }

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key(""), "");
        assert_eq!(mask_api_key("short"), "*****");
        assert_eq!(mask_api_key("sk-1234567890abcd"), "sk-...abcd");
    }

    #[test]
    fn test_set_get_show() {
        let temp = tempdir().unwrap();
        let controller = SettingsController::new(context_in(temp.path()));

        let out = run(
            &controller,
            SettingsCommand::Set {
                key: "max_tokens".to_string(),
                value: "1000".to_string(),
            },
        )
        .unwrap();
        assert_eq!(out, "Updated max_tokens\n");

        let out = run(
            &controller,
            SettingsCommand::Get {
                key: "max_tokens".to_string(),
            },
        )
        .unwrap();
        assert_eq!(out.trim(), "1000");

        let out = run(&controller, SettingsCommand::Show { overrides: true }).unwrap();
        let shown: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(shown, json!({ "max_tokens": 1000 }));

        assert!(
            run(
                &controller,
                SettingsCommand::Set {
                    key: "max_tokens".to_string(),
                    value: "0".to_string(),
                },
            )
            .is_err()
        );
        assert!(
            run(
                &controller,
                SettingsCommand::Get {
                    key: "nope".to_string()
                }
            )
            .is_err()
        );
    }

    #[test]
    fn test_show_masks_api_key() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("config.json"),
            r#"{ "api_key": "sk-1234567890abcd" }"#,
        )
        .unwrap();
        let controller = SettingsController::new(context_in(temp.path()));

        let out = run(&controller, SettingsCommand::Show { overrides: false }).unwrap();
        assert!(out.contains("sk-...abcd"));
        assert!(!out.contains("sk-1234567890abcd"));
    }

    #[test]
    fn test_save_and_models() {
        let temp = tempdir().unwrap();
        let controller = SettingsController::new(context_in(temp.path()));

        let out = run(&controller, SettingsCommand::Models { refresh: false }).unwrap();
        assert!(out.starts_with("No models available"));

        run(
            &controller,
            SettingsCommand::Save {
                api_key: Some("sk-test".to_string()),
                model: None,
                max_tokens: Some("128".to_string()),
                stream: None,
            },
        )
        .unwrap();
        assert_eq!(controller.context().snapshot().max_tokens, 128);

        let out = run(&controller, SettingsCommand::Models { refresh: true }).unwrap();
        assert!(out.contains("* gpt-4-1106-preview"));
        assert!(out.contains("  gpt-4o-mini"));
        assert!(!out.contains("text-embedding"));
    }

    #[test]
    fn test_save_new_key_without_model_flag() {
        let temp = tempdir().unwrap();
        let controller = SettingsController::new(context_in(temp.path()));

        let save = |api_key: &str, model: Option<&str>| {
            run(
                &controller,
                SettingsCommand::Save {
                    api_key: Some(api_key.to_string()),
                    model: model.map(str::to_string),
                    max_tokens: None,
                    stream: None,
                },
            )
        };

        assert_eq!(save("sk-mini", None).unwrap(), "Settings saved\n");
        let settings = controller.context().snapshot();
        assert_eq!(settings.api_key, "sk-mini");
        assert_eq!(settings.model, "gpt-4o");

        assert!(save("sk-test", Some("davinci")).is_err());
        assert_eq!(controller.context().snapshot().api_key, "sk-mini");
    }
}
