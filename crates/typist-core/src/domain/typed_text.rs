//! Plain-text payloads and "replace last input".
//!
//! The peripheral types whatever bytes it receives.  To replace what was
//! typed last, the client sends one backspace (`0x08`) per character of the
//! previous payload, followed by the new text.  The peripheral needs no undo
//! buffer of its own.
//!
//! The count is taken per logical text field, so two independent inputs in
//! a front-end do not erase each other's text.
//!
//! # Characters, not bytes
//!
//! The host OS erases one user-perceived character per backspace, so `"é"`
//! (two UTF-8 bytes) needs exactly one.  Counting uses extended grapheme
//! clusters: `"e\u{301}"` (e + combining acute) and a ZWJ emoji sequence are
//! one character each.

use std::collections::HashMap;

use unicode_segmentation::UnicodeSegmentation;

/// ASCII backspace, one per character to erase.
pub const BACKSPACE: u8 = 0x08;

/// Remembers how many characters were last sent for each text field.
#[derive(Debug, Default, Clone)]
pub struct TypedTextTracker {
    sent: HashMap<String, usize>,
}

impl TypedTextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a plain send payload and records its length for `field`.
    ///
    /// The trailing newline (when `with_enter` is set) is not counted: a
    /// later replace erases the typed text, not the line break.
    pub fn send(&mut self, field: &str, text: &str, with_enter: bool) -> Vec<u8> {
        self.sent.insert(field.to_string(), char_units(text));
        text_payload(text, with_enter)
    }

    /// Builds a replace payload: backspaces for the previous send on
    /// `field`, then `text`.  Records the new length.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use typist_core::domain::typed_text::TypedTextTracker;
    ///
    /// let mut tracker = TypedTextTracker::new();
    /// tracker.send("main", "hi", false);
    /// let payload = tracker.replace("main", "héllo", false);
    /// assert_eq!(&payload[..2], &[0x08, 0x08]);
    /// assert_eq!(&payload[2..], "héllo".as_bytes());
    /// ```
    pub fn replace(&mut self, field: &str, text: &str, with_enter: bool) -> Vec<u8> {
        let erase = self.previous_len(field);
        let mut payload = vec![BACKSPACE; erase];
        payload.extend_from_slice(&text_payload(text, with_enter));
        self.sent.insert(field.to_string(), char_units(text));
        payload
    }

    /// Characters sent last for `field`, `0` if nothing was sent yet.
    pub fn previous_len(&self, field: &str) -> usize {
        self.sent.get(field).copied().unwrap_or(0)
    }

    /// Forgets every field, e.g. after the peripheral was swapped.
    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

/// Number of user-perceived characters (extended grapheme clusters) in `text`.
pub fn char_units(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Encodes `text` as a plain frame, optionally terminated by a line feed.
pub fn text_payload(text: &str, with_enter: bool) -> Vec<u8> {
    let mut payload = Vec::with_capacity(text.len() + 1);
    payload.extend_from_slice(text.as_bytes());
    if with_enter {
        payload.push(b'\n');
    }
    payload
}
