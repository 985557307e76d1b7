use std::cmp::Ordering;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

// Defines a new type that wraps a String for use as an ID.
macro_rules! idtype {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

idtype!(QuestionId);
idtype!(AnswerKeyId);

impl QuestionId {
    /// Question ids for grid rows are 1-based.
    pub fn from_row_index(index: usize) -> Self {
        Self((index + 1).to_string())
    }
}

/// Natural ordering: numeric ids compare by value so that "2" sorts before
/// "10". Ties between equal numbers ("01" vs "1") fall back to the text so
/// the ordering stays consistent with `Eq`.
impl Ord for QuestionId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (
            self.0.trim().parse::<u64>(),
            other.0.trim().parse::<u64>(),
        ) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for QuestionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Maps a zero-based choice position to its label: 0 => "A", 1 => "B", ...
///
/// Positions past "Z" are rejected by config validation, so callers never
/// see anything but a single uppercase letter.
pub fn choice_label(position: usize) -> String {
    let offset = u8::try_from(position).unwrap_or(u8::MAX).min(25);
    char::from(b'A' + offset).to_string()
}

/// Compares two choice labels the way answer keys are written by hand:
/// surrounding whitespace and letter case do not matter.
pub fn labels_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
