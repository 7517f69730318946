//! Inline injection of the bootstrap script into the report's entry page.

use crate::error::{SasError, SasResult};

/// Attribute marking the injected script tag.
pub const BOOTSTRAP_MARKER: &str = "data-sas-bootstrap";

const SCRIPT_CLOSE: &str = "</script>";

fn script_open() -> String {
    format!("<script type=\"text/javascript\" {BOOTSTRAP_MARKER}>")
}

/// The exact block inserted after the opening body tag.
pub fn script_block(script: &str) -> String {
    format!("\n{}\n{script}\n{SCRIPT_CLOSE}", script_open())
}

/// Inserts `script` right after the first opening `<body>` tag.
///
/// Every byte of `html` is preserved; the output is the input with
/// [`script_block`] spliced in. Patching the same page twice inserts the
/// block twice, so callers check [`is_patched`] first.
pub fn patch_entry_page(html: &[u8], script: &str) -> SasResult<Vec<u8>> {
    let insert_at = body_insert_position(html).ok_or(SasError::MalformedEntryPage)?;
    let block = script_block(script);

    let mut patched = Vec::with_capacity(html.len() + block.len());
    patched.extend_from_slice(&html[..insert_at]);
    patched.extend_from_slice(block.as_bytes());
    patched.extend_from_slice(&html[insert_at..]);
    Ok(patched)
}

/// Returns true if the page already carries an injected bootstrap script.
pub fn is_patched(html: &[u8]) -> bool {
    find(html, script_open().as_bytes(), 0).is_some()
}

/// Offset just past the `>` of the first `<body` tag. Matching is
/// case-sensitive; `<body` must be followed by `>` or whitespace.
fn body_insert_position(html: &[u8]) -> Option<usize> {
    const TAG: &[u8] = b"<body";
    let mut from = 0;
    while let Some(start) = find(html, TAG, from) {
        let after = start + TAG.len();
        match html.get(after) {
            Some(b'>') => return Some(after + 1),
            Some(byte) if byte.is_ascii_whitespace() => {
                return html[after..]
                    .iter()
                    .position(|b| *b == b'>')
                    .map(|offset| after + offset + 1);
            }
            Some(_) => from = after,
            None => return None,
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}
