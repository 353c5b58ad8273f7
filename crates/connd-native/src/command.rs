use std::fmt;

use crate::ConnectorError;

/// A daemon command and its arguments, before framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<String>,
}

impl Command {
    /// Starts a command such as `mdnssd`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument, formatted with `Display`.
    #[must_use]
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Command word.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments in order.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Frames the command for `sequence` without the trailing NUL.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidArgument`] when the command word or
    /// any argument contains a NUL byte.
    pub fn frame(&self, sequence: u32) -> Result<String, ConnectorError> {
        reject_nul(&self.name)?;
        let mut line = format!("{sequence} {}", self.name);
        for arg in &self.args {
            reject_nul(arg)?;
            line.push(' ');
            append_escaped(&mut line, arg);
        }
        Ok(line)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.name)?;
        for arg in &self.args {
            let mut escaped = String::with_capacity(arg.len());
            append_escaped(&mut escaped, arg);
            write!(formatter, " {escaped}")?;
        }
        Ok(())
    }
}

fn reject_nul(value: &str) -> Result<(), ConnectorError> {
    if value.contains('\0') {
        return Err(ConnectorError::InvalidArgument {
            argument: value.escape_default().to_string(),
        });
    }
    Ok(())
}

/// Appends `arg` escaped for the wire.
///
/// Quotes and backslashes gain a backslash. Arguments containing a space, and
/// empty arguments, are wrapped in double quotes.
pub fn append_escaped(builder: &mut String, arg: &str) {
    let quoted = arg.is_empty() || arg.contains(' ');
    if quoted {
        builder.push('"');
    }
    for ch in arg.chars() {
        match ch {
            '"' => builder.push_str("\\\""),
            '\\' => builder.push_str("\\\\"),
            other => builder.push(other),
        }
    }
    if quoted {
        builder.push('"');
    }
}
