//! Interactive line console over the session manager

use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use runbox_core::{LifecycleState, SessionManager};
use runbox_provider::CliRunner;
use std::path::PathBuf;

use super::{print_report, progress_channel};

const HELP: &str = "\
Commands:
  pull [image]     pull an image (default from config)
  create           create the container from the pulled image
  run              open a probe session and mark the container running
  code <file>      execute a source file in the container
  term <command>   run a shell command in the container
  teardown         remove the container and reset
  status           show the lifecycle state
  help             show this help
  quit             leave the console";

#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    Pull(Option<String>),
    Create,
    Run,
    Code(PathBuf),
    Term(String),
    Teardown,
    Status,
    Help,
    Quit,
}

/// Parse one console line; `Ok(None)` for a blank line
fn parse_line(line: &str) -> std::result::Result<Option<ConsoleCommand>, String> {
    // `term` hands the rest of the line to the shell untouched, quoting included
    let line = line.trim();
    let (first, rest) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));
    if first == "term" {
        let rest = rest.trim();
        if rest.is_empty() {
            return Err("Wrong arguments for 'term'; type 'help'".to_string());
        }
        return Ok(Some(ConsoleCommand::Term(rest.to_string())));
    }

    let words = shell_words::split(line).map_err(|e| format!("Parse error: {}", e))?;
    let Some((cmd, rest)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (cmd.as_str(), rest) {
        ("pull", []) => ConsoleCommand::Pull(None),
        ("pull", [image]) => ConsoleCommand::Pull(Some(image.clone())),
        ("create", []) => ConsoleCommand::Create,
        ("run", []) => ConsoleCommand::Run,
        ("code", [file]) => ConsoleCommand::Code(PathBuf::from(file)),
        ("teardown", []) => ConsoleCommand::Teardown,
        ("status", []) => ConsoleCommand::Status,
        ("help" | "?", _) => ConsoleCommand::Help,
        ("quit" | "exit" | "q", _) => ConsoleCommand::Quit,
        ("pull" | "create" | "run" | "code" | "teardown" | "status", _) => {
            return Err(format!("Wrong arguments for '{}'; type 'help'", cmd));
        }
        _ => return Err(format!("Unknown command '{}'; type 'help'", cmd)),
    };
    Ok(Some(command))
}

/// Read commands until `quit`, dispatching each to the manager
pub async fn console(manager: &SessionManager, json: bool) -> Result<()> {
    let engine = &manager.config().engine;
    if let Err(e) = CliRunner::from_config(engine)?.ping().await {
        eprintln!("Warning: {} is not usable: {}", engine.program, e);
    }

    println!("runbox console ({}); type 'help' for commands", engine.program);
    let (progress, _printer) = progress_channel(json);

    loop {
        let line: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("runbox [{}]", manager.state().await))
            .allow_empty(true)
            .interact_text()?;

        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("{}", msg);
                continue;
            }
        };

        let report = match command {
            ConsoleCommand::Pull(image) => {
                let image = image.unwrap_or_else(|| engine.default_image.clone());
                manager.pull_with_progress(&image, progress.clone()).await
            }
            ConsoleCommand::Create => manager.create_with_progress(progress.clone()).await,
            ConsoleCommand::Run => manager.run_with_progress(progress.clone()).await,
            ConsoleCommand::Code(path) => {
                let source = match std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))
                {
                    Ok(source) => source,
                    Err(e) => {
                        eprintln!("{:#}", e);
                        continue;
                    }
                };
                manager
                    .execute_code_with_progress(&source, progress.clone())
                    .await
            }
            ConsoleCommand::Term(text) => {
                manager
                    .execute_terminal_with_progress(&text, progress.clone())
                    .await
            }
            ConsoleCommand::Teardown => manager.teardown_with_progress(progress.clone()).await,
            ConsoleCommand::Status => manager.status().await,
            ConsoleCommand::Help => {
                println!("{}", HELP);
                continue;
            }
            ConsoleCommand::Quit => break,
        };
        print_report(&report, json)?;
    }

    if manager.state().await >= LifecycleState::Created {
        let remove = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Remove container {}?", engine.container_name))
            .default(true)
            .interact()?;
        if remove {
            print_report(&manager.teardown().await, json)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lifecycle_commands() {
        assert_eq!(parse_line("pull").unwrap(), Some(ConsoleCommand::Pull(None)));
        assert_eq!(
            parse_line("pull alpine:3").unwrap(),
            Some(ConsoleCommand::Pull(Some("alpine:3".to_string())))
        );
        assert_eq!(parse_line("create").unwrap(), Some(ConsoleCommand::Create));
        assert_eq!(parse_line("  run ").unwrap(), Some(ConsoleCommand::Run));
        assert_eq!(parse_line("teardown").unwrap(), Some(ConsoleCommand::Teardown));
        assert_eq!(parse_line("status").unwrap(), Some(ConsoleCommand::Status));
        assert_eq!(parse_line("q").unwrap(), Some(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_code_path_with_spaces() {
        assert_eq!(
            parse_line("code 'my script.py'").unwrap(),
            Some(ConsoleCommand::Code(PathBuf::from("my script.py")))
        );
    }

    #[test]
    fn test_parse_term_joins_words() {
        assert_eq!(
            parse_line("term ls -la /workspace").unwrap(),
            Some(ConsoleCommand::Term("ls -la /workspace".to_string()))
        );
        assert_eq!(
            parse_line("term echo a | wc -c").unwrap(),
            Some(ConsoleCommand::Term("echo a | wc -c".to_string()))
        );
    }

    #[test]
    fn test_parse_term_keeps_quoting() {
        assert_eq!(
            parse_line(r#"term grep "a b" f"#).unwrap(),
            Some(ConsoleCommand::Term(r#"grep "a b" f"#.to_string()))
        );
        assert_eq!(
            parse_line("term echo it's").unwrap(),
            Some(ConsoleCommand::Term("echo it's".to_string()))
        );
        assert_eq!(
            parse_line("term\tprintf '%s\\n'  x").unwrap(),
            Some(ConsoleCommand::Term("printf '%s\\n'  x".to_string()))
        );
    }

    #[test]
    fn test_parse_blank_and_errors() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(parse_line("term").unwrap_err().contains("Wrong arguments"));
        assert!(parse_line("create now").is_err());
        assert!(parse_line("frobnicate").unwrap_err().contains("Unknown command"));
        assert!(parse_line("code 'unterminated").unwrap_err().contains("Parse error"));
    }
}
