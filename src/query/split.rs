//! Splitting multi-statement scripts for backends that take one statement per call.

/// Splits a script on `;` into trimmed statements.
///
/// Semicolons inside single-quoted strings (with `''` or `\` escapes),
/// double-quoted identifiers, `--` and `/* */` comments, and `$$` bodies do
/// not end a statement. Fragments holding only whitespace or comments are
/// dropped.
pub fn split_statements(script: &str) -> Vec<&str> {
    let bytes = script.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_code = false;
    let mut i = 0;

    // Every delimiter is ASCII, so byte offsets always land on char boundaries.
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                has_code = true;
                i = skip_quoted(bytes, i + 1, quote);
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_line_comment(bytes, i + 2);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i + 2);
            }
            b'$' if bytes.get(i + 1) == Some(&b'$') => {
                has_code = true;
                i = skip_dollar_body(bytes, i + 2);
            }
            b';' => {
                push_fragment(&mut statements, &script[start..i], has_code);
                start = i + 1;
                has_code = false;
                i += 1;
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                has_code = true;
                i += 1;
            }
        }
    }

    push_fragment(&mut statements, &script[start..], has_code);
    statements
}

fn push_fragment<'a>(statements: &mut Vec<&'a str>, fragment: &'a str, has_code: bool) {
    let trimmed = fragment.trim();
    if has_code && !trimmed.is_empty() {
        statements.push(trimmed);
    }
}

/// Returns the index just past the closing quote, or the end of input.
fn skip_quoted(bytes: &[u8], mut i: usize, quote: u8) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quote == b'\'' => i += 2,
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], i: usize) -> usize {
    bytes[i..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| i + p + 1)
}

fn skip_block_comment(bytes: &[u8], i: usize) -> usize {
    find_pair(bytes, i, b'*', b'/')
}

fn skip_dollar_body(bytes: &[u8], i: usize) -> usize {
    find_pair(bytes, i, b'$', b'$')
}

/// Returns the index just past the first `first second` pair at or after `i`.
fn find_pair(bytes: &[u8], i: usize, first: u8, second: u8) -> usize {
    bytes
        .get(i..)
        .and_then(|rest| rest.windows(2).position(|w| w[0] == first && w[1] == second))
        .map_or(bytes.len(), |p| i + p + 2)
}
