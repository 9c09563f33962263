use crate::monitoring::HopRecord;
use std::fmt;

/// Hops extracted from a trace header blob, plus what could not be read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderParse {
    /// Relays, oldest first
    pub hops: Vec<HopRecord>,
    /// Non-fatal problems met while parsing
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl HeaderParse {
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Sum of all per-hop delays in milliseconds
    pub fn total_delay_ms(&self) -> u64 {
        self.hops.iter().map(|hop| hop.delay_ms).sum()
    }
}

/// A problem the parser worked around
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseDiagnostic {
    /// The blob holds no recognizable trace entry
    NoTraceEntries,
    /// A hop's date clause could not be read; the hop keeps zero delay
    UnparseableTimestamp { hop_index: u32, raw: String },
    /// Neither the from-clause nor the by-clause named the submitting host
    MissingSubmittingHost { hop_index: u32 },
    /// Entries were stacked oldest first and kept in blob order
    OldestFirstInput,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseDiagnostic::NoTraceEntries => write!(f, "no trace entries found"),
            ParseDiagnostic::UnparseableTimestamp { hop_index, raw } => {
                write!(f, "hop {}: unparseable timestamp <{}>", hop_index, raw)
            }
            ParseDiagnostic::MissingSubmittingHost { hop_index } => {
                write!(f, "hop {}: submitting host unknown", hop_index)
            }
            ParseDiagnostic::OldestFirstInput => {
                write!(f, "trace entries stacked oldest first")
            }
        }
    }
}
