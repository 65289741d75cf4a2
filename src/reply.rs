//! Shutter acknowledgment parser
//!
//! The shutter command prints a single acknowledgment such as
//!
//! ```text
//! Apogeefpi says "message:shutters:high1:ok"
//! ```
//!
//! The match is anchored at the first byte of the raw output and performed on
//! the text exactly as received. Trimming and quote stripping
//! ([`clean_reply`]) exist only for log output.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

#[allow(clippy::expect_used)]
static ACK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^Apogeefpi says "message:shutters:(high1|low1):ok""#)
        .expect("acknowledgment pattern is valid")
});

/// End-stop token reported by the shutter hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionToken {
    /// Upper end-stop, the affirmative reply to "open".
    High1,
    /// Lower end-stop, the affirmative reply to "close".
    Low1,
}

impl PositionToken {
    /// Token as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High1 => "high1",
            Self::Low1 => "low1",
        }
    }

    fn from_wire(token: &str) -> Option<Self> {
        match token {
            "high1" => Some(Self::High1),
            "low1" => Some(Self::Low1),
            _ => None,
        }
    }
}

impl fmt::Display for PositionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpretation of one acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedAck {
    /// The reply matched and carried a known token.
    Recognized(PositionToken),
    /// Anything else.
    Unrecognized,
}

/// Parse the raw stdout of a shutter command.
pub fn parse_ack(raw: &str) -> ParsedAck {
    ACK_PATTERN
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|token| PositionToken::from_wire(token.as_str()))
        .map_or(ParsedAck::Unrecognized, ParsedAck::Recognized)
}

/// Human-readable form of a reply: surrounding whitespace and double quotes removed.
pub fn clean_reply(raw: &str) -> String {
    raw.trim().replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN_ACK: &str = r#"Apogeefpi says "message:shutters:high1:ok""#;
    const CLOSE_ACK: &str = r#"Apogeefpi says "message:shutters:low1:ok""#;

    #[test]
    fn test_recognizes_both_tokens() {
        assert_eq!(parse_ack(OPEN_ACK), ParsedAck::Recognized(PositionToken::High1));
        assert_eq!(parse_ack(CLOSE_ACK), ParsedAck::Recognized(PositionToken::Low1));
    }

    #[test]
    fn test_trailing_text_is_accepted() {
        let raw = format!("{CLOSE_ACK}\n");
        assert_eq!(parse_ack(&raw), ParsedAck::Recognized(PositionToken::Low1));
    }

    #[test]
    fn test_rejects_malformed_replies() {
        let cases = [
            "",
            "Apogeefpi says \"message:shutters:high1",
            "Apogeefpi says \"message:shutters:high2:ok\"",
            "Apogeefpi says \"message:shutters:mid:ok\"",
            "Apogee says \"message:shutters:high1:ok\"",
            "Apogeefpi says message:shutters:high1:ok",
            "Apogeefpi says \"message:shutters:high1:error\"",
        ];
        for raw in cases {
            assert_eq!(parse_ack(raw), ParsedAck::Unrecognized, "input: {raw:?}");
        }
    }

    #[test]
    fn test_match_is_anchored_and_untrimmed() {
        assert_eq!(parse_ack(&format!(" {OPEN_ACK}")), ParsedAck::Unrecognized);
        assert_eq!(parse_ack(&format!("\n{OPEN_ACK}")), ParsedAck::Unrecognized);
        assert_eq!(parse_ack(&format!("noise {OPEN_ACK}")), ParsedAck::Unrecognized);
    }

    #[test]
    fn test_clean_reply_strips_quotes_and_whitespace() {
        assert_eq!(
            clean_reply(&format!("  {OPEN_ACK}\n")),
            "Apogeefpi says message:shutters:high1:ok"
        );
    }
}
