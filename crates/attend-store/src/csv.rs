//! Minimal RFC 4180 writer for the log export.

use std::io::{self, Write};

pub const HEADER: [&str; 4] = ["timestamp", "identity_key", "name", "kind"];

/// Write one CSV row, quoting fields that need it.
pub fn write_row<W: Write>(out: &mut W, fields: &[&str]) -> io::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        if field.contains([',', '"', '\n', '\r']) {
            write!(out, "\"{}\"", field.replace('"', "\"\""))?;
        } else {
            out.write_all(field.as_bytes())?;
        }
    }
    out.write_all(b"\r\n")
}
