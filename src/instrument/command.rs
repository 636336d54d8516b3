//! Formatted instrument instructions.

use std::fmt;

/// One fully formatted ASCII instruction, without line terminator.
///
/// Built by [`crate::instrument::b1500::CommandBuilder`]; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    text: String,
}

impl Command {
    pub(crate) fn from_text(text: String) -> Self {
        Self { text }
    }

    /// The instruction as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Leading mnemonic (`"WDCV"` for `"WDCV 1,1,0.0,1.0,11"`).
    pub fn mnemonic(&self) -> &str {
        self.text.split(' ').next().unwrap_or_default()
    }

    /// Whether the instrument answers this instruction with a reply line.
    pub fn is_query(&self) -> bool {
        self.mnemonic().ends_with('?')
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonic_and_query() {
        let cmd = Command::from_text("*LRN? 56".to_string());
        assert_eq!(cmd.mnemonic(), "*LRN?");
        assert!(cmd.is_query());

        let cmd = Command::from_text("XE".to_string());
        assert_eq!(cmd.mnemonic(), "XE");
        assert!(!cmd.is_query());
        assert_eq!(cmd.to_string(), "XE");
    }
}
