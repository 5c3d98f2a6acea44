//! Splits one protocol line into an argv. Arguments are separated by
//! spaces and may be wrapped in double quotes; inside quotes a backslash
//! escapes the next character.

use tracing::debug;

use crate::mpd_protocol::{COMMAND_ARGV_MAX, CommandError};

pub fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    let mut argv = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if argv.len() >= COMMAND_ARGV_MAX {
            debug!("argument list over {COMMAND_ARGV_MAX} entries, dropping the rest");
            break;
        }

        match c {
            ' ' => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut arg = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => arg.push(escaped),
                            None => {
                                return Err(CommandError::arg(
                                    "Error missing closing double quote in argument",
                                ));
                            }
                        },
                        Some(other) => arg.push(other),
                        None => {
                            return Err(CommandError::arg(
                                "Error missing closing double quote in argument",
                            ));
                        }
                    }
                }
                argv.push(arg);
            }
            _ => {
                let mut arg = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ' ' {
                        break;
                    }
                    arg.push(c);
                    chars.next();
                }
                argv.push(arg);
            }
        }
    }

    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquoted() {
        assert_eq!(
            tokenize("search artist Bach").unwrap(),
            vec!["search", "artist", "Bach"]
        );
    }

    #[test]
    fn quoted_with_spaces() {
        assert_eq!(
            tokenize(r#"add "Daft Punk/Discovery/02 Aerodynamic.mp3""#).unwrap(),
            vec!["add", "Daft Punk/Discovery/02 Aerodynamic.mp3"]
        );
    }

    #[test]
    fn non_ascii_paths() {
        assert_eq!(
            tokenize("add Non-Album/Necry-Talkie/北上のススメ").unwrap(),
            vec!["add", "Non-Album/Necry-Talkie/北上のススメ"]
        );
    }

    #[test]
    fn backslash_escapes() {
        assert_eq!(tokenize(r#"find "asdf\"asdf""#).unwrap(), vec![
            "find",
            "asdf\"asdf"
        ]);
        assert_eq!(tokenize(r#"find "asdf\\asdf""#).unwrap(), vec![
            "find",
            "asdf\\asdf"
        ]);
        // the filter expression survives as one argument
        assert_eq!(
            tokenize(r#"find "((Artist == \"Bach\"))" window 0:10"#).unwrap(),
            vec!["find", r#"((Artist == "Bach"))"#, "window", "0:10"]
        );
    }

    #[test]
    fn missing_closing_quote_is_an_error() {
        assert!(tokenize(r#"add "unterminated"#).is_err());
        assert!(tokenize(r#"add "trailing escape \"#).is_err());
    }

    #[test]
    fn argv_is_capped() {
        let line = (0..50).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let argv = tokenize(&line).unwrap();
        assert_eq!(argv.len(), COMMAND_ARGV_MAX);
        assert_eq!(argv.last().unwrap(), "36");
    }

    #[test]
    fn repeated_spaces_are_skipped() {
        assert_eq!(tokenize("  status   ").unwrap(), vec!["status"]);
        assert!(tokenize("").unwrap().is_empty());
    }
}
