//! Caption payload parsing shared by the caption sources.
//!
//! Accepts the two shapes the caption surface serves: JSON timed events
//! (`{"events":[{"segs":[{"utf8":"..."}]}]}`) and XML/TTML documents whose
//! `text` or `p` elements carry the cue text. Segment text is kept in document
//! order and space-joined.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

#[derive(Debug, Deserialize)]
struct TimedTextJson {
    #[serde(default)]
    events: Vec<TimedEvent>,
}

#[derive(Debug, Deserialize)]
struct TimedEvent {
    #[serde(default)]
    segs: Vec<TimedSegment>,
}

#[derive(Debug, Deserialize)]
struct TimedSegment {
    #[serde(default)]
    utf8: String,
}

fn cue_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<(?:text|p)(?:\s[^>]*)?>(.*?)</(?:text|p)>").expect("cue pattern is valid")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"))
}

/// Parse whichever caption payload shape `body` is.
///
/// Returns `None` when the payload is neither shape or carries no text.
pub fn parse_caption_payload(body: &str) -> Option<String> {
    let trimmed = body.trim_start_matches('\u{feff}').trim();

    let text = if trimmed.starts_with('{') {
        parse_json_events(trimmed)?
    } else if trimmed.starts_with('<') {
        parse_xml_cues(trimmed)?
    } else {
        return None;
    };

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// JSON timed events: segments of one event are concatenated, events space-joined
pub fn parse_json_events(body: &str) -> Option<String> {
    let parsed: TimedTextJson = serde_json::from_str(body).ok()?;

    let lines: Vec<String> = parsed
        .events
        .iter()
        .map(|event| {
            event
                .segs
                .iter()
                .map(|seg| seg.utf8.as_str())
                .collect::<String>()
        })
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    Some(lines.join(" "))
}

/// XML/TTML cues: `text` (srv1) or `p` (srv3, TTML) elements in document order
pub fn parse_xml_cues(body: &str) -> Option<String> {
    let mut found_any = false;
    let mut lines = Vec::new();

    for captures in cue_pattern().captures_iter(body) {
        found_any = true;
        let inner = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let stripped = tag_pattern().replace_all(inner, " ");
        let decoded = decode_entities(&stripped);
        let line = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }

    found_any.then(|| lines.join(" "))
}

/// Decode the XML/HTML entities caption documents use
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        let Some(end) = after.find(';').filter(|&end| end <= 10) else {
            out.push('&');
            rest = &after[1..];
            continue;
        };

        let entity = &after[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
