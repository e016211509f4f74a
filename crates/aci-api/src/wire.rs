// Request body encoding
//
// Certificate-signed POSTs are verified byte-for-byte, so bodies are
// rendered in the layout the controller's reference tooling produces:
// `", "` and `": "` separators and non-ASCII escaped as `\uXXXX`.
// Key order is either the caller's insertion order or fully sorted.

use std::io;

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::Formatter;

/// Key ordering for a serialized body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrder {
    /// Keys as the caller inserted them.
    AsGiven,
    /// Keys sorted at every nesting level.
    Sorted,
}

/// Render `value` as a request body.
pub fn encode(value: &Value, order: KeyOrder) -> String {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, ApicFormatter);
    let res = match order {
        KeyOrder::AsGiven => value.serialize(&mut ser),
        KeyOrder::Sorted => {
            let mut sorted = value.clone();
            sorted.sort_all_objects();
            sorted.serialize(&mut ser)
        }
    };
    res.expect("serializing a JSON value into memory cannot fail");
    // Every non-ASCII char was escaped above.
    String::from_utf8(out).expect("encoded body is ASCII")
}

struct ApicFormatter;

impl Formatter for ApicFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if fragment.bytes().all(is_plain) {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() && c != '\u{7f}' {
                let mut buf = [0u8; 1];
                writer.write_all(c.encode_utf8(&mut buf).as_bytes())?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// ASCII other than DEL, which is escaped like non-ASCII.
fn is_plain(b: u8) -> bool {
    b.is_ascii() && b != 0x7f
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn tenant() -> Value {
        json!({"fvTenant": {"attributes": {
            "status": "modified,created",
            "dn": "uni/tn-test",
            "descr": ""
        }}})
    }

    #[test]
    fn as_given_keeps_insertion_order() {
        assert_eq!(
            encode(&tenant(), KeyOrder::AsGiven),
            r#"{"fvTenant": {"attributes": {"status": "modified,created", "dn": "uni/tn-test", "descr": ""}}}"#
        );
    }

    #[test]
    fn sorted_orders_every_level() {
        let value = json!({"b": [{"z": 1, "a": 2}], "a": {"y": true, "x": null}});
        assert_eq!(
            encode(&value, KeyOrder::Sorted),
            r#"{"a": {"x": null, "y": true}, "b": [{"a": 2, "z": 1}]}"#
        );
    }

    #[test]
    fn non_ascii_is_escaped() {
        let value = json!({"descr": "Zürich 🚀"});
        assert_eq!(
            encode(&value, KeyOrder::AsGiven),
            r#"{"descr": "Z\u00fcrich \ud83d\ude80"}"#
        );

        let value = json!({"descr": "tab\u{7f}end"});
        assert_eq!(encode(&value, KeyOrder::AsGiven), r#"{"descr": "tab\u007fend"}"#);
    }

    #[test]
    fn control_characters_keep_short_escapes() {
        let value = json!({"descr": "line\nbreak \"quoted\""});
        assert_eq!(
            encode(&value, KeyOrder::AsGiven),
            r#"{"descr": "line\nbreak \"quoted\""}"#
        );
    }
}
