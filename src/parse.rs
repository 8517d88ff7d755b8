//! The lexer/parser (C1): turns one logical input line into a [`Pipeline`].
//!
//! A single left-to-right scan over the line's characters, carrying two
//! quoting states (single and double) and a one-character escape lookahead.
//! Grounded on `examples/original_source/myshell/src/parser.cpp`, which this
//! module reproduces the exact behavior of rather than the teacher's
//! marker-based, command-substitution-aware tokenizer.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub args: Vec<String>,
    pub in_path: Option<String>,
    pub out_path: Option<String>,
    pub append_out: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    pub background: bool,
}

impl Pipeline {
    /// The printable form used in job listings: commands joined by `" | "`,
    /// arguments within a command joined by `" "`.
    pub fn display(&self) -> String {
        self.commands
            .iter()
            .map(|cmd| cmd.args.join(" "))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

fn finalize_token(current: &mut Command, token: &mut String, token_active: &mut bool) {
    if *token_active {
        current.args.push(std::mem::take(token));
        *token_active = false;
    }
}

fn finalize_command(pipeline: &mut Pipeline, current: &mut Command) {
    if !current.args.is_empty() {
        pipeline.commands.push(std::mem::take(current));
    } else {
        *current = Command::default();
    }
}

fn read_redirect_target(bytes: &[char], mut i: usize) -> (String, usize) {
    while i < bytes.len() && bytes[i].is_whitespace() {
        i += 1;
    }
    let start = i;
    while i < bytes.len() && !bytes[i].is_whitespace() && bytes[i] != '|' && bytes[i] != '&' {
        i += 1;
    }
    (bytes[start..i].iter().collect(), i)
}

/// Parse a single logical line into a [`Pipeline`]. Total: every input,
/// including malformed quoting, produces a (possibly empty) Pipeline.
pub fn parse_line(line: &str) -> Pipeline {
    let bytes: Vec<char> = line.chars().collect();
    let n = bytes.len();
    let mut i = 0usize;

    let mut pipeline = Pipeline::default();
    let mut current = Command::default();
    let mut token = String::new();
    let mut token_active = false;
    let mut in_squote = false;
    let mut in_dquote = false;

    while i < n {
        let ch = bytes[i];

        if ch == '\\' && !in_squote {
            if i + 1 < n {
                token.push(bytes[i + 1]);
                token_active = true;
                i += 2;
            } else {
                token.push('\\');
                token_active = true;
                i += 1;
            }
            continue;
        }

        if in_squote {
            if ch == '\'' {
                in_squote = false;
            } else {
                token.push(ch);
                token_active = true;
            }
            i += 1;
            continue;
        }

        if in_dquote {
            if ch == '"' {
                in_dquote = false;
            } else {
                token.push(ch);
                token_active = true;
            }
            i += 1;
            continue;
        }

        match ch {
            '\'' => {
                in_squote = true;
                token_active = true;
                i += 1;
            }
            '"' => {
                in_dquote = true;
                token_active = true;
                i += 1;
            }
            c if c.is_whitespace() => {
                finalize_token(&mut current, &mut token, &mut token_active);
                i += 1;
            }
            '|' => {
                finalize_token(&mut current, &mut token, &mut token_active);
                finalize_command(&mut pipeline, &mut current);
                i += 1;
            }
            '<' => {
                finalize_token(&mut current, &mut token, &mut token_active);
                let (path, next) = read_redirect_target(&bytes, i + 1);
                current.in_path = Some(path);
                i = next;
            }
            '>' => {
                finalize_token(&mut current, &mut token, &mut token_active);
                let mut j = i + 1;
                let mut append = false;
                if j < n && bytes[j] == '>' {
                    append = true;
                    j += 1;
                }
                let (path, next) = read_redirect_target(&bytes, j);
                current.out_path = Some(path);
                current.append_out = append;
                i = next;
            }
            '&' => {
                finalize_token(&mut current, &mut token, &mut token_active);
                pipeline.background = true;
                i += 1;
            }
            _ => {
                token.push(ch);
                token_active = true;
                i += 1;
            }
        }
    }

    finalize_token(&mut current, &mut token, &mut token_active);
    finalize_command(&mut pipeline, &mut current);
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_command() {
        let p = parse_line("echo hello world");
        assert_eq!(p.commands.len(), 1);
        assert_eq!(p.commands[0].args, vec!["echo", "hello", "world"]);
        assert!(!p.background);
    }

    #[test]
    fn empty_line_yields_empty_pipeline() {
        let p = parse_line("   ");
        assert!(p.commands.is_empty());
    }

    #[test]
    fn quoting_round_trip() {
        let p = parse_line("echo 'hello world'");
        assert_eq!(p.commands[0].args, vec!["echo", "hello world"]);
    }

    #[test]
    fn double_quotes_preserve_whitespace() {
        let p = parse_line("echo \"a  b\"");
        assert_eq!(p.commands[0].args, vec!["echo", "a  b"]);
    }

    #[test]
    fn backslash_escape() {
        let p = parse_line("echo a\\ b");
        assert_eq!(p.commands[0].args, vec!["echo", "a b"]);
    }

    #[test]
    fn trailing_backslash_is_literal() {
        let p = parse_line("echo a\\");
        assert_eq!(p.commands[0].args, vec!["echo", "a\\"]);
    }

    #[test]
    fn pipeline_arity() {
        let p = parse_line("a | b | c");
        assert_eq!(p.commands.len(), 3);
        for cmd in &p.commands {
            assert_eq!(cmd.args.len(), 1);
        }
    }

    #[test]
    fn redirections_in_and_out() {
        let p = parse_line("a < in > out");
        assert_eq!(p.commands[0].in_path.as_deref(), Some("in"));
        assert_eq!(p.commands[0].out_path.as_deref(), Some("out"));
        assert!(!p.commands[0].append_out);
    }

    #[test]
    fn append_redirection() {
        let p = parse_line("a >> out");
        assert_eq!(p.commands[0].out_path.as_deref(), Some("out"));
        assert!(p.commands[0].append_out);
    }

    #[test]
    fn redirection_before_pipe_is_empty_filename() {
        let p = parse_line("a >|b");
        assert_eq!(p.commands[0].out_path.as_deref(), Some(""));
        assert_eq!(p.commands.len(), 2);
    }

    #[test]
    fn background_flag() {
        let p = parse_line("sleep 1 &");
        assert!(p.background);
        assert_eq!(p.commands[0].args, vec!["sleep", "1"]);
    }

    #[test]
    fn background_does_not_terminate_command() {
        let p = parse_line("sleep 1 & echo done");
        assert!(p.background);
        // `&` never terminates the current Command per spec; the scan just
        // keeps accumulating into the same command after the flag is set.
        assert_eq!(p.commands.len(), 1);
        assert_eq!(p.commands[0].args, vec!["sleep", "1", "echo", "done"]);
    }

    #[test]
    fn multiple_redirections_overwrite() {
        let p = parse_line("a < one < two");
        assert_eq!(p.commands[0].in_path.as_deref(), Some("two"));
    }

    #[test]
    fn display_joins_pipeline() {
        let p = parse_line("a b | c d");
        assert_eq!(p.display(), "a b | c d");
    }

    proptest::proptest! {
        #[test]
        fn parsing_never_panics(s in ".*") {
            let _ = parse_line(&s);
        }

        #[test]
        fn quote_round_trip_law(a in "[^']*") {
            let line = format!("echo '{a}'");
            let p = parse_line(&line);
            proptest::prop_assert_eq!(p.commands[0].args.clone(), vec!["echo".to_string(), a]);
        }
    }
}
