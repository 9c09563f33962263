use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::sync::OnceLock;

use super::types::{HeaderParse, ParseDiagnostic};
use crate::monitoring::{hop_delay, HopRecord};

/// One `Received` entry up to the semicolon: optional from-clause, by-clause
/// and with-clause. Any single separator may follow the keyword
/// (`Received:`, `Received=` as some APIs render headers).
const TRACE_PATTERN: &str =
    r"(?is)\bReceived\W?\s*(?:from\s+(?P<from>.*?)\s*)?\bby\s+(?P<by>.*?)\s+with\s+(?P<with>.*?)\s*;";

const BY_MARKER: &str = "by ";

fn trace_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(TRACE_PATTERN).ok()).as_ref()
}

/// Trace header parser
///
/// Best effort: text it cannot read yields fewer hops or unknown fields,
/// reported through [`ParseDiagnostic`], never an error.
pub struct TraceHeaderParser;

#[derive(Debug, Clone)]
struct TraceEntry {
    submitting_host: String,
    receiving_host: String,
    transport_type: String,
    raw_timestamp: String,
    received_at: Option<DateTime<Utc>>,
}

impl TraceHeaderParser {
    /// Parse the concatenated trace headers of a message, newest entry first
    pub fn parse(blob: &str) -> HeaderParse {
        let mut result = HeaderParse::default();

        let matches: Vec<Captures<'_>> = match trace_pattern() {
            Some(pattern) => pattern.captures_iter(blob).collect(),
            None => Vec::new(),
        };

        // The date clause runs until the next entry starts
        let mut entries: Vec<TraceEntry> = matches
            .iter()
            .enumerate()
            .map(|(i, caps)| {
                let date_start = caps.get(0).map_or(blob.len(), |m| m.end());
                let date_end = matches
                    .get(i + 1)
                    .and_then(|next| next.get(0))
                    .map_or(blob.len(), |m| m.start());
                Self::read_entry(caps, header_value(&blob[date_start..date_end]))
            })
            .collect();

        if entries.is_empty() {
            result.diagnostics.push(ParseDiagnostic::NoTraceEntries);
            return result;
        }

        if Self::is_oldest_first(&entries) {
            result.diagnostics.push(ParseDiagnostic::OldestFirstInput);
        } else {
            // Header stacking puts the newest entry first
            entries.reverse();
        }

        let mut previous = None;
        for (position, entry) in entries.into_iter().enumerate() {
            let hop_index = u32::try_from(position + 1).unwrap_or(u32::MAX);

            if entry.received_at.is_none() {
                result.diagnostics.push(ParseDiagnostic::UnparseableTimestamp {
                    hop_index,
                    raw: entry.raw_timestamp.clone(),
                });
            }
            if entry.submitting_host.is_empty() {
                result
                    .diagnostics
                    .push(ParseDiagnostic::MissingSubmittingHost { hop_index });
            }

            let delay = hop_delay(previous, entry.received_at);
            previous = entry.received_at;

            result.hops.push(HopRecord {
                hop_index,
                submitting_host: entry.submitting_host,
                receiving_host: entry.receiving_host,
                transport_type: entry.transport_type,
                received_at: entry.received_at,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            });
        }

        result
    }

    fn read_entry(caps: &Captures<'_>, date: &str) -> TraceEntry {
        let by_clause = clause(caps, "by");

        let mut submitting_host = clean_field(clause(caps, "from"));
        if submitting_host.is_empty() {
            submitting_host = text_before_by(by_clause).map(clean_field).unwrap_or_default();
        }

        // A by-clause that still contains "by " swallowed a neighbouring entry
        let receiving_host = clean_field(text_after_last_by(by_clause).unwrap_or(by_clause));

        let raw_timestamp = clean_timestamp(date);
        let received_at = parse_timestamp(&raw_timestamp);

        TraceEntry {
            submitting_host,
            receiving_host,
            transport_type: normalize_transport(&clean_field(clause(caps, "with"))),
            raw_timestamp,
            received_at,
        }
    }

    /// Whether the entries are already in chronological order
    ///
    /// The chain is only ever taken as a whole, never permuted. Host links
    /// decide first: newest-first stacking hands over from an entry's
    /// submitting host to the next entry's receiving host. When the links
    /// are inconclusive, timestamps strictly ascending in blob order mark
    /// oldest-first input.
    fn is_oldest_first(entries: &[TraceEntry]) -> bool {
        let linked = |from: &str, to: &str| !from.is_empty() && from.eq_ignore_ascii_case(to);

        let newest_first_links = entries
            .windows(2)
            .filter(|pair| linked(&pair[0].submitting_host, &pair[1].receiving_host))
            .count();
        let oldest_first_links = entries
            .windows(2)
            .filter(|pair| linked(&pair[0].receiving_host, &pair[1].submitting_host))
            .count();

        if newest_first_links != oldest_first_links {
            return oldest_first_links > newest_first_links;
        }

        let dated: Vec<DateTime<Utc>> = entries.iter().filter_map(|entry| entry.received_at).collect();
        dated.len() > 1 && dated.windows(2).all(|pair| pair[0] < pair[1])
    }
}

/// Parse trace headers and keep only the hops
pub fn parse_trace_headers(blob: &str) -> Vec<HopRecord> {
    TraceHeaderParser::parse(blob).hops
}

fn clause<'h>(caps: &Captures<'h>, name: &str) -> &'h str {
    caps.name(name).map_or("", |m| m.as_str())
}

fn text_before_by(clause: &str) -> Option<&str> {
    clause
        .to_ascii_lowercase()
        .find(BY_MARKER)
        .map(|pos| &clause[..pos])
}

fn text_after_last_by(clause: &str) -> Option<&str> {
    clause
        .to_ascii_lowercase()
        .rfind(BY_MARKER)
        .map(|pos| &clause[pos + BY_MARKER.len()..])
}

/// `SMTP…` becomes `SMTP`, `ESMTP…` becomes `ESMTP`, anything else is kept
fn normalize_transport(clause: &str) -> String {
    let upper = clause.to_ascii_uppercase();

    if upper.starts_with("ESMTP") {
        "ESMTP".to_string()
    } else if upper.starts_with("SMTP") {
        "SMTP".to_string()
    } else {
        clause.to_string()
    }
}

/// Text up to the first line break that is not folded onto the next line
fn header_value(text: &str) -> &str {
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' && !matches!(bytes.get(i + 1), Some(b' ') | Some(b'\t')) {
            return &text[..i];
        }
    }
    text
}

fn clean_field(raw: &str) -> String {
    collapse_whitespace(&strip_parentheticals(raw))
}

fn clean_timestamp(raw: &str) -> String {
    let unfolded: String = raw.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    // Glue a detached sign to its offset, keeping the space before the zone
    let unfolded = unfolded.replace(" + ", " +");

    collapse_whitespace(&strip_parentheticals(&unfolded))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Drop `(...)` comments, nested ones included. An unclosed comment runs
/// to the end of the text.
fn strip_parentheticals(raw: &str) -> String {
    let mut depth = 0usize;
    let mut kept = String::with_capacity(raw.len());

    for c in raw.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => kept.push(c),
            _ => {}
        }
    }

    kept
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
