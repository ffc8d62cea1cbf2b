use std::path::PathBuf;

pub const HELP: &str = "\
commands:
  /new <name>        create a session and switch to it
  /switch <name>     switch to an existing session
  /delete [name]     delete a session (default: the current one)
  /sessions          list sessions
  /add <path>...     add documents (files or folders) to the current session
  /remove <n>        remove document number <n> from the current session
  /docs              list documents of the current session
  /history           print the current transcript
  /help              show this help
  /quit              exit
anything else is sent as a question to the current session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New(String),
    Switch(String),
    Delete(Option<String>),
    Sessions,
    Add(Vec<PathBuf>),
    /// Zero-based document position.
    Remove(usize),
    Docs,
    History,
    Help,
    Quit,
    Ask(String),
    Empty,
}

pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Ask(line.to_string()));
    };

    let (verb, argument) = match rest.split_once(char::is_whitespace) {
        Some((verb, argument)) => (verb, argument.trim()),
        None => (rest, ""),
    };

    match verb {
        "new" => required(argument, "/new <name>").map(Command::New),
        "switch" => required(argument, "/switch <name>").map(Command::Switch),
        "delete" => Ok(Command::Delete(
            (!argument.is_empty()).then(|| argument.to_string()),
        )),
        "sessions" => Ok(Command::Sessions),
        "add" => {
            let paths = argument
                .split_whitespace()
                .map(PathBuf::from)
                .collect::<Vec<_>>();
            if paths.is_empty() {
                return Err("usage: /add <path>...".to_string());
            }
            Ok(Command::Add(paths))
        }
        "remove" => match argument.parse::<usize>() {
            Ok(number) if number >= 1 => Ok(Command::Remove(number - 1)),
            _ => Err("usage: /remove <n> (n starts at 1)".to_string()),
        },
        "docs" => Ok(Command::Docs),
        "history" => Ok(Command::History),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command: /{other} (try /help)")),
    }
}

fn required(argument: &str, usage: &str) -> Result<String, String> {
    if argument.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(argument.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_questions() {
        assert_eq!(
            parse("  What animal is mentioned?  "),
            Ok(Command::Ask("What animal is mentioned?".to_string()))
        );
        assert_eq!(parse("   "), Ok(Command::Empty));
    }

    #[test]
    fn session_commands_take_the_rest_of_the_line_as_name() {
        assert_eq!(parse("/new Tax 2024"), Ok(Command::New("Tax 2024".to_string())));
        assert_eq!(parse("/switch A"), Ok(Command::Switch("A".to_string())));
        assert_eq!(parse("/delete"), Ok(Command::Delete(None)));
        assert_eq!(parse("/delete B"), Ok(Command::Delete(Some("B".to_string()))));
        assert!(parse("/new").is_err());
    }

    #[test]
    fn add_collects_paths() {
        assert_eq!(
            parse("/add doc1.txt papers/"),
            Ok(Command::Add(vec![PathBuf::from("doc1.txt"), PathBuf::from("papers/")]))
        );
        assert!(parse("/add").is_err());
    }

    #[test]
    fn remove_is_one_based() {
        assert_eq!(parse("/remove 1"), Ok(Command::Remove(0)));
        assert!(parse("/remove 0").is_err());
        assert!(parse("/remove two").is_err());
    }

    #[test]
    fn unknown_commands_are_rejected() {
        let error = parse("/frobnicate").unwrap_err();
        assert!(error.contains("/frobnicate"));
        assert_eq!(parse("/exit"), Ok(Command::Quit));
    }
}
