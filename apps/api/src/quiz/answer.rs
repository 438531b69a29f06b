use serde::{Deserialize, Serialize};

/// A user's response to a single quiz question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    Yes,
    NotSure,
    No,
}

impl Answer {
    /// Parses free-text input, case- and whitespace-insensitive.
    ///
    /// Unrecognised text is read as `No`. The UI only ever sends the three
    /// known tokens, so anything else is treated as a decline rather than
    /// surfaced as an error.
    pub fn parse_lenient(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "yes" => Answer::Yes,
            "not sure" | "not_sure" | "not-sure" | "notsure" => Answer::NotSure,
            _ => Answer::No,
        }
    }

    /// Score contribution: yes=2, not sure=1, no=0.
    pub fn encode(self) -> u32 {
        match self {
            Answer::Yes => 2,
            Answer::NotSure => 1,
            Answer::No => 0,
        }
    }

    pub fn is_rejection(self) -> bool {
        self == Answer::No
    }
}

/// Sum of encoded answers.
pub fn score(ledger: &[Answer]) -> u32 {
    ledger.iter().map(|a| a.encode()).sum()
}
