//! `text/event-stream` wire framing.
//!
//! Every function here is pure: the same input always yields the same bytes,
//! which is what lets history entries be stored pre-formatted and replayed
//! verbatim.

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

use crate::Message;

/// Comment frame sent on every keep-alive beat.
pub const KEEP_ALIVE: &[u8] = b":\n";

/// First bytes written to every new stream.
pub const PREAMBLE: &[u8] = b":ok\n\n";

/// Size of the comment padding some polyfills need before they start
/// dispatching events.
pub const PADDING_LEN: usize = 2048;

/// Format a message into one complete event.
///
/// # Examples
/// ```
/// use relay_common::{frame, Message};
/// let bytes = frame::format(&Message::new("hi").with_id(1).with_event("greet"), false);
/// assert_eq!(&bytes[..], b"event: greet\nid: 1\ndata: hi\n\n");
/// ```
pub fn format(message: &Message, json_encode: bool) -> Bytes {
    let mut buf = BytesMut::new();

    if let Some(event) = message.event.as_deref().filter(|e| !e.is_empty()) {
        put_field(&mut buf, "event", event);
    }
    if let Some(retry) = message.retry.filter(|r| *r > 0) {
        put_field(&mut buf, "retry", &retry.to_string());
    }
    if let Some(id) = message.replay_id() {
        put_field(&mut buf, "id", &id.to_string());
    }

    let text = payload_text(&message.data, json_encode);
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines = normalized.split('\n').peekable();
    while let Some(line) = lines.next() {
        buf.put_slice(b"data: ");
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
        if lines.peek().is_none() {
            buf.put_u8(b'\n');
        }
    }

    buf.freeze()
}

/// Textual form of a payload.
///
/// Strings are always used verbatim. With `json_encode` every other value is
/// serialized as JSON. Without it, scalars use their plain text form (`null`
/// becomes empty), arrays join their elements with `,`, and objects fall
/// back to JSON since they have no other text form.
pub fn payload_text(data: &Value, json_encode: bool) -> Cow<'_, str> {
    match data {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other if json_encode => Cow::Owned(other.to_string()),
        Value::Null => Cow::Borrowed(""),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Array(items) => Cow::Owned(
            items
                .iter()
                .map(|item| payload_text(item, false))
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Cow::Owned(data.to_string()),
    }
}

pub fn keep_alive() -> Bytes {
    Bytes::from_static(KEEP_ALIVE)
}

/// Bare reconnect-delay directive, not part of any event.
pub fn retry_directive(retry_ms: u64) -> Bytes {
    Bytes::from(format!("retry: {retry_ms}\n"))
}

/// Everything written to a stream before it is registered: the `:ok`
/// comment, an optional reconnect hint, and optional padding.
pub fn handshake(retry_ms: Option<u64>, padding: bool) -> Bytes {
    let padding_len = if padding { PADDING_LEN + 2 } else { 0 };
    let mut buf = BytesMut::with_capacity(PREAMBLE.len() + padding_len);
    buf.put_slice(PREAMBLE);
    if let Some(retry) = retry_ms {
        put_field(&mut buf, "retry", &retry.to_string());
    }
    if padding {
        buf.put_u8(b':');
        buf.put_bytes(b' ', PADDING_LEN);
        buf.put_u8(b'\n');
    }
    buf.freeze()
}

fn put_field(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_u8(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(bytes: Bytes) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn plain_string_is_data_only() {
        assert_eq!(text(format(&Message::from("hello"), false)), "data: hello\n\n");
    }

    #[test]
    fn fields_in_fixed_order() {
        let msg = Message::new("x").with_id(9).with_retry(1500).with_event("update");
        assert_eq!(
            text(format(&msg, false)),
            "event: update\nretry: 1500\nid: 9\ndata: x\n\n"
        );
    }

    #[test]
    fn falsy_fields_are_omitted() {
        let msg = Message::new("x").with_id(0).with_retry(0).with_event("");
        assert_eq!(text(format(&msg, false)), "data: x\n\n");
    }

    #[test]
    fn token_ids_are_written_verbatim() {
        let msg = Message::new("x").with_id("evt-1");
        assert_eq!(text(format(&msg, false)), "id: evt-1\ndata: x\n\n");
    }

    #[test]
    fn multiline_payload_normalizes_line_endings() {
        let out = text(format(&Message::from("a\nb\r\nc"), false));
        assert_eq!(out, "data: a\ndata: b\ndata: c\n\n");
        assert_eq!(out.matches("data:").count(), 3);

        let cr = text(format(&Message::from("a\rb\rc"), false));
        assert_eq!(cr, out);
    }

    #[test]
    fn trailing_newline_yields_empty_data_line() {
        assert_eq!(text(format(&Message::from("a\n"), false)), "data: a\ndata: \n\n");
    }

    #[test]
    fn empty_payload_still_produces_block() {
        assert_eq!(text(format(&Message::from(""), false)), "data: \n\n");
        assert_eq!(text(format(&Message::default(), false)), "data: \n\n");
    }

    #[test]
    fn json_encode_serializes_non_strings() {
        let msg = Message::new(json!({"a": [1, 2]}));
        assert_eq!(text(format(&msg, true)), "data: {\"a\":[1,2]}\n\n");

        let msg = Message::new(json!(["x", 2, true]));
        assert_eq!(text(format(&msg, true)), "data: [\"x\",2,true]\n\n");
        assert_eq!(text(format(&msg, false)), "data: x,2,true\n\n");
    }

    #[test]
    fn json_encode_leaves_strings_alone() {
        let msg = Message::new("already \"text\"");
        assert_eq!(text(format(&msg, true)), "data: already \"text\"\n\n");
    }

    #[test]
    fn formatting_is_deterministic() {
        let msg = Message::new(json!({"k": "v"})).with_id(4).with_event("e");
        assert_eq!(format(&msg, true), format(&msg, true));
    }

    #[test]
    fn handshake_variants() {
        assert_eq!(text(handshake(None, false)), ":ok\n\n");
        assert_eq!(text(handshake(Some(3000), false)), ":ok\n\nretry: 3000\n");

        let padded = handshake(None, true);
        assert_eq!(padded.len(), PREAMBLE.len() + PADDING_LEN + 2);
        assert!(padded.ends_with(b" \n"));
    }

    #[test]
    fn control_frames() {
        assert_eq!(&keep_alive()[..], b":\n");
        assert_eq!(&retry_directive(250)[..], b"retry: 250\n");
    }
}
