//! Classification of inbound notification text.
//!
//! Every notification from the peripheral is one frame.  Configuration frames
//! start with `:CFG:`; anything else is free text (firmware debug output, or
//! a continuation fragment of a config stream that lost its prefix).
//!
//! ```text
//! :CFG:LIST LEN=<n>     start of a config stream, n = expected characters
//! :CFG:DATA <fragment>  one piece of the JSON document
//! :CFG:DONE             explicit end of the stream
//! :CFG:OK               last command succeeded
//! :CFG:ERR<message>     last command failed
//! ```

use crate::protocol::command::CFG_PREFIX;

/// One classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// `LIST LEN=<n>`; `None` when the length is missing or unparsable.
    ListLen(Option<usize>),
    /// `DATA <fragment>`; the fragment is kept verbatim.
    Data(String),
    /// `DONE`.
    Done,
    /// `OK`.
    Ok,
    /// `ERR...`; the message with the `ERR` keyword and separators removed.
    Err(String),
    /// Any other text, including unknown `:CFG:` keywords.
    Other(String),
}

impl InboundFrame {
    /// Classifies one notification.
    ///
    /// A single trailing `\n` or `\r\n` is stripped first; the firmware
    /// terminates its frames with a newline but the terminator is not part
    /// of the payload.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use typist_core::protocol::frame::InboundFrame;
    ///
    /// assert_eq!(InboundFrame::parse(":CFG:LIST LEN=42\n"), InboundFrame::ListLen(Some(42)));
    /// assert_eq!(InboundFrame::parse(":CFG:DATA {\"a\""), InboundFrame::Data("{\"a\"".into()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let text = strip_terminator(raw);

        let Some(body) = text.strip_prefix(CFG_PREFIX) else {
            return InboundFrame::Other(text.to_string());
        };

        if let Some(rest) = body.strip_prefix("LIST") {
            return InboundFrame::ListLen(parse_announced_len(rest));
        }
        if let Some(fragment) = body.strip_prefix("DATA") {
            // Exactly one separator space belongs to the frame; anything
            // after it is payload, including further spaces.
            let fragment = fragment.strip_prefix(' ').unwrap_or(fragment);
            return InboundFrame::Data(fragment.to_string());
        }
        if body.trim_end() == "DONE" {
            return InboundFrame::Done;
        }
        if body.trim_end() == "OK" {
            return InboundFrame::Ok;
        }
        if let Some(message) = body.strip_prefix("ERR") {
            let message = message.trim_start_matches([' ', ':']).trim_end();
            return InboundFrame::Err(message.to_string());
        }

        InboundFrame::Other(text.to_string())
    }

    /// Returns `true` for the three frame kinds that belong to a config stream.
    pub fn is_stream_frame(&self) -> bool {
        matches!(
            self,
            InboundFrame::ListLen(_) | InboundFrame::Data(_) | InboundFrame::Done
        )
    }
}

/// Removes one trailing `\n` or `\r\n`.
pub(crate) fn strip_terminator(raw: &str) -> &str {
    raw.strip_suffix("\r\n")
        .or_else(|| raw.strip_suffix('\n'))
        .unwrap_or(raw)
}

fn parse_announced_len(rest: &str) -> Option<usize> {
    rest.trim()
        .strip_prefix("LEN=")
        .and_then(|n| n.trim().parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_len_parses_number() {
        assert_eq!(InboundFrame::parse(":CFG:LIST LEN=120"), InboundFrame::ListLen(Some(120)));
    }

    #[test]
    fn test_list_len_unparsable_is_none() {
        assert_eq!(InboundFrame::parse(":CFG:LIST LEN=abc"), InboundFrame::ListLen(None));
        assert_eq!(InboundFrame::parse(":CFG:LIST"), InboundFrame::ListLen(None));
        assert_eq!(InboundFrame::parse(":CFG:LIST LEN=-5"), InboundFrame::ListLen(None));
    }

    #[test]
    fn test_data_keeps_inner_spaces() {
        // Arrange: the JSON fragment itself starts with a space
        let frame = InboundFrame::parse(":CFG:DATA  \"x\": 1");

        // Assert: only the single separator is removed
        assert_eq!(frame, InboundFrame::Data(" \"x\": 1".into()));
    }

    #[test]
    fn test_trailing_newline_is_stripped_once() {
        assert_eq!(InboundFrame::parse(":CFG:DATA ab\r\n"), InboundFrame::Data("ab".into()));
        assert_eq!(InboundFrame::parse(":CFG:DATA ab\n\n"), InboundFrame::Data("ab\n".into()));
    }

    #[test]
    fn test_done_and_ok() {
        assert_eq!(InboundFrame::parse(":CFG:DONE\n"), InboundFrame::Done);
        assert_eq!(InboundFrame::parse(":CFG:OK"), InboundFrame::Ok);
    }

    #[test]
    fn test_err_variants_strip_separator() {
        assert_eq!(InboundFrame::parse(":CFG:ERR no space"), InboundFrame::Err("no space".into()));
        assert_eq!(InboundFrame::parse(":CFG:ERR:bad id"), InboundFrame::Err("bad id".into()));
        assert_eq!(InboundFrame::parse(":CFG:ERR"), InboundFrame::Err(String::new()));
    }

    #[test]
    fn test_plain_text_is_other() {
        assert_eq!(InboundFrame::parse("\"title\":\"x\"}"), InboundFrame::Other("\"title\":\"x\"}".into()));
    }

    #[test]
    fn test_unknown_cfg_keyword_is_other() {
        assert_eq!(InboundFrame::parse(":CFG:HELLO"), InboundFrame::Other(":CFG:HELLO".into()));
    }

    #[test]
    fn test_is_stream_frame() {
        assert!(InboundFrame::ListLen(Some(1)).is_stream_frame());
        assert!(InboundFrame::Data(String::new()).is_stream_frame());
        assert!(InboundFrame::Done.is_stream_frame());
        assert!(!InboundFrame::Ok.is_stream_frame());
        assert!(!InboundFrame::Err(String::new()).is_stream_frame());
        assert!(!InboundFrame::Other(String::new()).is_stream_frame());
    }
}
