//! Line preprocessing ahead of lowering.

use patchlang_common::StaticTable;
use std::fmt::Write;

/// Replace raw string literals that would confuse whitespace splitting or
/// case folding with `'N` static markers.
///
/// A literal is lifted when its content holds a space, a bracket, a brace,
/// a comma or an uppercase letter. Other literals stay inline. An
/// unterminated quote is left as written.
pub(crate) fn extract_strings(line: &str, statics: &mut StaticTable) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('"') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('"') {
            Some(close) => {
                let content = &after[..close];
                if needs_static(content) {
                    let _ = write!(out, "'{}", statics.intern(content));
                } else {
                    out.push('"');
                    out.push_str(content);
                    out.push('"');
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn needs_static(content: &str) -> bool {
    content
        .chars()
        .any(|c| c == ' ' || "()[]{},".contains(c) || c.is_uppercase())
}

/// Remove spaces whose innermost enclosure is an array literal, so
/// `[1, 2, 3]` survives splitting on whitespace as one word.
pub(crate) fn strip_array_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut enclosures: Vec<char> = Vec::new();
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            '(' | '[' | '{' if !quoted => enclosures.push(c),
            ')' | ']' | '}' if !quoted => {
                enclosures.pop();
            }
            ' ' if !quoted && enclosures.last() == Some(&'[') => continue,
            _ => {}
        }
        out.push(c);
    }
    out
}

/// Words after the head word, with surrounding whitespace removed.
pub(crate) fn remainder(line: &str) -> &str {
    line.trim()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}
