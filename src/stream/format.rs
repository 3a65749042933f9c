use serde_json::json;

use super::record::LogRecord;

/// Turns a [`LogRecord`] into exactly one newline-terminated JSON line.
///
/// Field order follows the record's declaration order. `serde_json` escapes
/// control characters inside strings, so the only raw newline in the output
/// is the terminator.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn format(&self, record: &LogRecord) -> String {
        let encoded = match record {
            LogRecord::Access(r) => serde_json::to_string(r),
            LogRecord::Application(r) => serde_json::to_string(r),
            LogRecord::Message(m) => serde_json::to_string(&json!({ "message": m })),
        };

        // Records only hold strings, numbers and string lists, so encoding
        // cannot fail; keep the line well-formed regardless.
        let mut line = encoded
            .unwrap_or_else(|e| json!({ "message": format!("unencodable record: {e}") }).to_string());
        line.push('\n');
        line
    }
}
