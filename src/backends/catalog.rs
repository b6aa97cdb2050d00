//! Parses the voice catalog printed by `say -v ?`.
//!
//! Each voice is one line shaped like
//! `Albert              en_US    # Hello! My name is Albert.`
//! Anything else (headers, blanks, odd layouts) is skipped without error.

use super::Voice;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VOICE_LINE: Regex =
        Regex::new(r"^(.+?)\s+(\S+)\s+#\s*(.*)$").expect("voice line pattern is valid");
}

/// Parses a single catalog line, `None` if it does not have the voice shape.
pub fn parse_line(line: &str) -> Option<Voice> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let caps = VOICE_LINE.captures(line)?;
    Some(Voice {
        name: caps[1].trim().to_string(),
        locale: caps[2].trim().to_string(),
        description: caps[3].trim().to_string(),
    })
}

/// Returns the voices in `output` in order of appearance.
pub fn parse_voices(output: &str) -> Vec<Voice> {
    output.lines().filter_map(parse_line).collect()
}
