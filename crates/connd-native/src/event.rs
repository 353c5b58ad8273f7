use std::fmt;

use crate::EventParseError;

/// Response class derived from the leading code digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// `1xx`: more responses follow.
    Continue,
    /// `2xx`: command completed.
    Ok,
    /// `4xx`: the daemon failed to run the command.
    ServerError,
    /// `5xx`: the command or its arguments were invalid.
    ClientError,
    /// `6xx`: broadcast not tied to any command.
    Unsolicited,
    /// Anything else.
    Unknown,
}

impl ResponseClass {
    /// Classifies a response code.
    #[must_use]
    pub const fn of(code: u16) -> Self {
        match code {
            100..=199 => Self::Continue,
            200..=299 => Self::Ok,
            400..=499 => Self::ServerError,
            500..=599 => Self::ClientError,
            600..=699 => Self::Unsolicited,
            _ => Self::Unknown,
        }
    }
}

/// One parsed line received from the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonEvent {
    cmd_number: Option<u32>,
    code: u16,
    message: String,
    raw: String,
}

impl DaemonEvent {
    /// Parses `<code> <seq> <message>` or, for `6xx`, `<code> <message>`.
    /// The message of a solicited line may be empty.
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError`] when tokens are missing or not numeric.
    pub fn parse(raw: &str) -> Result<Self, EventParseError> {
        let (code_token, rest) = raw
            .split_once(' ')
            .ok_or_else(|| EventParseError::Insufficient(raw.to_owned()))?;
        let code: u16 = code_token
            .parse()
            .map_err(|_| EventParseError::InvalidCode(raw.to_owned()))?;

        if ResponseClass::of(code) == ResponseClass::Unsolicited {
            return Ok(Self {
                cmd_number: None,
                code,
                message: rest.to_owned(),
                raw: raw.to_owned(),
            });
        }

        let (seq_token, message) = rest.split_once(' ').unwrap_or((rest, ""));
        let cmd_number = seq_token
            .parse()
            .map_err(|_| EventParseError::InvalidSequence(raw.to_owned()))?;
        Ok(Self {
            cmd_number: Some(cmd_number),
            code,
            message: message.to_owned(),
            raw: raw.to_owned(),
        })
    }

    /// Sequence number this line answers; `None` for unsolicited lines.
    #[must_use]
    pub const fn cmd_number(&self) -> Option<u32> {
        self.cmd_number
    }

    /// Three digit response code.
    #[must_use]
    pub const fn code(&self) -> u16 {
        self.code
    }

    /// Text after the code and sequence number.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The full line as received.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Class of the response code.
    #[must_use]
    pub const fn class(&self) -> ResponseClass {
        ResponseClass::of(self.code)
    }

    /// Whether more responses follow for the same command.
    #[must_use]
    pub fn is_continue(&self) -> bool {
        self.class() == ResponseClass::Continue
    }

    /// Whether this is an unsolicited broadcast.
    #[must_use]
    pub fn is_unsolicited(&self) -> bool {
        self.class() == ResponseClass::Unsolicited
    }

    /// The raw line split into unescaped words, code included.
    #[must_use]
    pub fn cooked(&self) -> Vec<String> {
        unescape_args(&self.raw)
    }
}

impl fmt::Display for DaemonEvent {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.raw)
    }
}

/// Splits a line into words, honouring double quotes and the `\"` and `\\`
/// escapes produced by [`crate::append_escaped`]. Other backslash
/// sequences pass through untouched.
#[must_use]
pub fn unescape_args(raw: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut quoted = false;
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                started = true;
                match chars.peek() {
                    Some(&next @ ('\\' | '"')) => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                }
            }
            '"' => {
                started = true;
                quoted = !quoted;
            }
            ' ' if !quoted => {
                if started {
                    words.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            other => {
                started = true;
                current.push(other);
            }
        }
    }
    if started {
        words.push(current);
    }
    words
}
