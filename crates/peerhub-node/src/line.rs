//! Line framing shared by the line-oriented nodes

use bytes::Bytes;

/// Callback for one complete line, terminator removed
pub type LineHandler = std::sync::Arc<dyn Fn(Bytes) + Send + Sync>;

/// Strip one trailing `\n` and then one trailing `\r`
pub fn trim_line(mut line: Vec<u8>) -> Bytes {
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Bytes::from(line)
}
