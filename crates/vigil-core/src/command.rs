//! POSIX-shell-style splitting of configured command lines.
//!
//! Check commands are written as a single string in `vigil.toml`
//! (`command = "./check_http.sh 'my host' 80"`) and executed directly,
//! without a shell. Splitting honours whitespace, single quotes, double
//! quotes and backslash escapes; nothing is expanded.

use crate::error::{ConfigError, ConfigResult};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Split a command line into argv words.
pub fn split_command(line: &str) -> ConfigResult<Vec<String>> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    word.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    // Inside double quotes a backslash only escapes these.
                    Some(next @ ('"' | '\\' | '$' | '`')) => word.push(next),
                    Some('\n') => {}
                    Some(next) => {
                        word.push('\\');
                        word.push(next);
                    }
                    None => return Err(unterminated(line, "trailing backslash")),
                },
                _ => word.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => match chars.next() {
                    Some('\n') => {}
                    Some(next) => {
                        word.push(next);
                        in_word = true;
                    }
                    None => return Err(unterminated(line, "trailing backslash")),
                },
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut word));
                        in_word = false;
                    }
                }
                _ => {
                    word.push(c);
                    in_word = true;
                }
            },
        }
    }

    match quote {
        Quote::Single => return Err(unterminated(line, "unclosed single quote")),
        Quote::Double => return Err(unterminated(line, "unclosed double quote")),
        Quote::None => {}
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

fn unterminated(line: &str, what: &str) -> ConfigError {
    ConfigError::Command(format!("{what} in {line:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(line: &str) -> Vec<String> {
        split_command(line).unwrap()
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(split("  ./check.sh   localhost\t80 "), ["./check.sh", "localhost", "80"]);
    }

    #[test]
    fn empty_line_has_no_words() {
        assert!(split("").is_empty());
        assert!(split("   ").is_empty());
    }

    #[test]
    fn single_quotes_are_literal() {
        assert_eq!(split(r#"echo 'a "b" \c'"#), ["echo", r#"a "b" \c"#]);
    }

    #[test]
    fn double_quotes_allow_escapes() {
        assert_eq!(split(r#"echo "say \"hi\" \n""#), ["echo", r#"say "hi" \n"#]);
    }

    #[test]
    fn adjacent_segments_join() {
        assert_eq!(split(r#"--name='my host'"x""#), ["--name=my hostx"]);
    }

    #[test]
    fn empty_quotes_produce_empty_word() {
        assert_eq!(split("cmd '' \"\""), ["cmd", "", ""]);
    }

    #[test]
    fn backslash_escapes_space() {
        assert_eq!(split(r"ls my\ dir"), ["ls", "my dir"]);
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        assert!(matches!(split_command("echo 'oops"), Err(ConfigError::Command(_))));
        assert!(matches!(split_command("echo \"oops"), Err(ConfigError::Command(_))));
        assert!(matches!(split_command("echo oops\\"), Err(ConfigError::Command(_))));
    }
}
