//! Format predicates consumed by the `format` keyword.
//!
//! The table ships empty: callers install the formats they need with
//! [`Formats::insert`] or plug in their own [`FormatSource`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

/// `(string) -> valid`.
pub type FormatCheck = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A named string format.
#[derive(Clone)]
pub enum Format {
    Regex(Arc<Regex>),
    Check(FormatCheck),
}

impl Format {
    pub fn regex(re: Regex) -> Self {
        Format::Regex(Arc::new(re))
    }

    pub fn check(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Format::Check(Arc::new(f))
    }

    /// The predicate form.
    pub fn predicate(&self) -> FormatCheck {
        match self {
            Format::Check(f) => f.clone(),
            Format::Regex(re) => {
                let re = re.clone();
                Arc::new(move |s: &str| re.is_match(s))
            }
        }
    }
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Regex(re) => write!(f, "Format::Regex({:?})", re.as_str()),
            Format::Check(_) => f.write_str("Format::Check"),
        }
    }
}

/// Name → format lookup.
pub trait FormatSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Format>;
}

/// A mutable format table.
#[derive(Debug, Clone, Default)]
pub struct Formats {
    table: HashMap<String, Format>,
}

impl Formats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, format: Format) -> Option<Format> {
        self.table.insert(name.into(), format)
    }

    pub fn remove(&mut self, name: &str) -> Option<Format> {
        self.table.remove(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl FormatSource for Formats {
    fn lookup(&self, name: &str) -> Option<Format> {
        self.table.get(name).cloned()
    }
}
