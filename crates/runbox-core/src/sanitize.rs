//! Output sanitizing for captured terminal transcripts
//!
//! Turns what the PTY delivered between two sync points into the text the
//! command actually produced: control bytes and escape sequences go, and so
//! do the echoed command line, re-echoed prompts and the sync marker.

use runbox_config::SessionConfig;

/// Cleans raw transcripts for one prompt/marker pair
#[derive(Debug, Clone)]
pub struct Sanitizer {
    prompt: String,
    marker: String,
    marker_echo: String,
}

impl Sanitizer {
    pub fn new(prompt: impl Into<String>, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        Self {
            prompt: prompt.into().trim().to_string(),
            marker_echo: marker_echo_command(&marker),
            marker,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.prompt.clone(), config.marker.clone())
    }

    /// Reduce `raw` to the semantic output of `command`.
    ///
    /// Idempotent: every filter compares trimmed lines, so the final trim
    /// never exposes a line a second pass would remove.
    pub fn clean(&self, command: &str, raw: &str) -> String {
        let text = strip_control(raw);
        let command = command.trim();

        text.lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .filter(|line| !self.is_protocol_line(line.trim()))
            .skip_while(|line| !command.is_empty() && line.trim() == command)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    fn is_protocol_line(&self, line: &str) -> bool {
        line == self.marker
            || line == self.marker_echo
            || (!self.prompt.is_empty() && line.starts_with(&self.prompt))
    }
}

/// The disposable command whose output delimits the previous command's output
pub fn marker_echo_command(marker: &str) -> String {
    format!("echo {}", marker)
}

/// Remove control characters and ANSI escape sequences, keeping `\n` and `\t`
pub fn strip_control(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\u{1b}' => match chars.peek() {
                // CSI: parameters up to a final byte in '@'..='~'
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('@'..='~').contains(&c) {
                            break;
                        }
                    }
                }
                // OSC: terminated by BEL or ESC \
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\u{7}' {
                            break;
                        }
                        if c == '\u{1b}' {
                            if chars.peek() == Some(&'\\') {
                                chars.next();
                            }
                            break;
                        }
                    }
                }
                Some(_) => {
                    chars.next();
                }
                None => {}
            },
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out
}
