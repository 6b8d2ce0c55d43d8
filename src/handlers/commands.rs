use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_LOG_TAIL_LINES: usize = 20;
const MAX_LOG_TAIL_LINES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// 1-based position in the gallery, newest first.
    Index(usize),
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Reset,
    ChangeKey,
    Logs(usize),
    Quit,
    Description(String),
    Trigger(String),
    Next,
    Add(Vec<PathBuf>),
    Remove(String),
    List,
    Prompt(String),
    Options(Option<String>),
    Set { field: String, option: String },
    Generate(Option<String>),
    Gallery,
    Download {
        target: DownloadTarget,
        dir: Option<PathBuf>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Reset => "reset",
            Command::ChangeKey => "key",
            Command::Logs(_) => "logs",
            Command::Quit => "quit",
            Command::Description(_) => "description",
            Command::Trigger(_) => "trigger",
            Command::Next => "next",
            Command::Add(_) => "add",
            Command::Remove(_) => "remove",
            Command::List => "list",
            Command::Prompt(_) => "prompt",
            Command::Options(_) => "options",
            Command::Set { .. } => "set",
            Command::Generate(_) => "generate",
            Command::Gallery => "gallery",
            Command::Download { .. } => "download",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Type a command, or `help` to list them.")]
    Empty,
    #[error("Unknown command '{0}'. Type `help` to list commands.")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unterminated quote in arguments.")]
    UnterminatedQuote,
}

/// Splits arguments on whitespace, keeping double-quoted runs together so
/// paths with spaces survive.
pub fn split_arguments(text: &str) -> Result<Vec<String>, ParseError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            ch if ch.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            ch => {
                current.push(ch);
                has_token = true;
            }
        }
    }

    if in_quotes {
        return Err(ParseError::UnterminatedQuote);
    }
    if has_token {
        args.push(current);
    }
    Ok(args)
}

fn required_text(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    if rest.is_empty() {
        Err(ParseError::Usage(usage))
    } else {
        Ok(rest.to_string())
    }
}

fn optional_text(rest: &str) -> Option<String> {
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "help" | "?" => Ok(Command::Help),
        "reset" | "new" => Ok(Command::Reset),
        "key" => Ok(Command::ChangeKey),
        "quit" | "exit" => Ok(Command::Quit),
        "logs" => {
            if rest.is_empty() {
                return Ok(Command::Logs(DEFAULT_LOG_TAIL_LINES));
            }
            let count = rest
                .parse::<usize>()
                .map_err(|_| ParseError::Usage("logs [n]"))?;
            Ok(Command::Logs(count.clamp(1, MAX_LOG_TAIL_LINES)))
        }
        "description" | "desc" => Ok(Command::Description(required_text(
            rest,
            "description <text>",
        )?)),
        "trigger" => {
            let args = split_arguments(rest)?;
            match args.as_slice() {
                [trigger] => Ok(Command::Trigger(trigger.clone())),
                _ => Err(ParseError::Usage("trigger <word>")),
            }
        }
        "next" => Ok(Command::Next),
        "add" => {
            let args = split_arguments(rest)?;
            if args.is_empty() {
                return Err(ParseError::Usage("add <path> [path...]"));
            }
            Ok(Command::Add(args.into_iter().map(PathBuf::from).collect()))
        }
        "remove" | "rm" => Ok(Command::Remove(required_text(rest, "remove <id>")?)),
        "list" | "ls" => Ok(Command::List),
        "prompt" => Ok(Command::Prompt(required_text(rest, "prompt <text>")?)),
        "options" => Ok(Command::Options(optional_text(rest))),
        "set" => {
            let args = split_arguments(rest)?;
            match args.as_slice() {
                [field, option] => Ok(Command::Set {
                    field: field.clone(),
                    option: option.clone(),
                }),
                _ => Err(ParseError::Usage("set <field> <option id>")),
            }
        }
        "generate" | "gen" => Ok(Command::Generate(optional_text(rest))),
        "gallery" => Ok(Command::Gallery),
        "download" | "save" => {
            const USAGE: &str = "download <n|id> [dir]";
            let args = split_arguments(rest)?;
            let (target, dir) = match args.as_slice() {
                [target] => (target, None),
                [target, dir] => (target, Some(PathBuf::from(dir))),
                _ => return Err(ParseError::Usage(USAGE)),
            };
            let target = match target.parse::<usize>() {
                Ok(0) => return Err(ParseError::Usage(USAGE)),
                Ok(index) => DownloadTarget::Index(index),
                Err(_) => DownloadTarget::Id(target.clone()),
            };
            Ok(Command::Download { target, dir })
        }
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_word_is_case_insensitive() {
        assert_eq!(parse_command("HELP"), Ok(Command::Help));
        assert_eq!(parse_command("  Next  "), Ok(Command::Next));
        assert_eq!(parse_command("New"), Ok(Command::Reset));
        assert_eq!(parse_command("EXIT"), Ok(Command::Quit));
    }

    #[test]
    fn free_text_arguments_keep_their_spacing() {
        assert_eq!(
            parse_command("description A tall warrior,  silver hair"),
            Ok(Command::Description("A tall warrior,  silver hair".to_string()))
        );
        assert_eq!(
            parse_command("generate A photo of kael92 in the rain"),
            Ok(Command::Generate(Some(
                "A photo of kael92 in the rain".to_string()
            )))
        );
        assert_eq!(parse_command("generate"), Ok(Command::Generate(None)));
    }

    #[test]
    fn missing_arguments_report_usage() {
        assert_eq!(
            parse_command("description"),
            Err(ParseError::Usage("description <text>"))
        );
        assert_eq!(
            parse_command("trigger two words"),
            Err(ParseError::Usage("trigger <word>"))
        );
        assert_eq!(
            parse_command("set lens"),
            Err(ParseError::Usage("set <field> <option id>"))
        );
        assert_eq!(parse_command("add"), Err(ParseError::Usage("add <path> [path...]")));
    }

    #[test]
    fn add_accepts_quoted_paths() {
        assert_eq!(
            parse_command(r#"add one.png "my photos/two.jpg" three.webp"#),
            Ok(Command::Add(vec![
                PathBuf::from("one.png"),
                PathBuf::from("my photos/two.jpg"),
                PathBuf::from("three.webp"),
            ]))
        );
        assert_eq!(
            parse_command(r#"add "broken.png"#),
            Err(ParseError::UnterminatedQuote)
        );
    }

    #[test]
    fn download_targets_index_or_id() {
        assert_eq!(
            parse_command("download 2"),
            Ok(Command::Download {
                target: DownloadTarget::Index(2),
                dir: None,
            })
        );
        assert_eq!(
            parse_command("download test-1700000000000 out"),
            Ok(Command::Download {
                target: DownloadTarget::Id("test-1700000000000".to_string()),
                dir: Some(PathBuf::from("out")),
            })
        );
        assert!(parse_command("download 0").is_err());
    }

    #[test]
    fn logs_defaults_and_clamps() {
        assert_eq!(parse_command("logs"), Ok(Command::Logs(DEFAULT_LOG_TAIL_LINES)));
        assert_eq!(parse_command("logs 100000"), Ok(Command::Logs(MAX_LOG_TAIL_LINES)));
        assert_eq!(parse_command("logs many"), Err(ParseError::Usage("logs [n]")));
    }

    #[test]
    fn unknown_and_empty_lines_are_errors() {
        assert_eq!(parse_command("   "), Err(ParseError::Empty));
        assert_eq!(
            parse_command("Dance now"),
            Err(ParseError::Unknown("dance".to_string()))
        );
    }
}
