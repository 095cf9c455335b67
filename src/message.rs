//! Message payloads and wire envelope.

use chrono::{DateTime, SecondsFormat, TimeZone};
use serde_json::Value;

/// Content type attached to every published message.
pub const TEXT_PLAIN: &str = "text/plain";

/// Width of the zero-padded counter prefix.
pub const COUNTER_WIDTH: usize = 8;

/// Publish counter.
///
/// Starts at zero and is advanced before each publish, so the first message
/// carries 1 and 0 is never sent.
#[derive(Debug, Default, Clone)]
pub struct Sequence {
    last: u64,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the new value.
    pub fn advance(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Last value handed out, 0 if none yet.
    pub fn last(&self) -> u64 {
        self.last
    }
}

/// Format `"{counter:08} {timestamp}"` with an RFC3339 timestamp at seconds
/// precision (`Z` for a zero offset).
pub fn format_payload<Tz>(counter: u64, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{:0width$} {}",
        counter,
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        width = COUNTER_WIDTH
    )
}

/// Content-type tagged message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Envelope {
    /// Wrap a text payload as a JSON string literal tagged `text/plain`.
    pub fn text(payload: &str) -> Self {
        Self {
            content_type: TEXT_PLAIN.to_string(),
            body: Value::String(payload.to_owned()).to_string().into_bytes(),
        }
    }

    /// Recover the text payload from a body produced by [`Envelope::text`].
    pub fn decode_text(body: &[u8]) -> Option<String> {
        serde_json::from_slice::<String>(body).ok()
    }
}
