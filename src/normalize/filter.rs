//! Selection of records worth exporting.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::NormalizeConfig;
use crate::models::Record;

fn review_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^review").ok()).as_ref()
}

/// Keeps records of an accepted publication type, language and year
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFilter {
    content_types: Vec<String>,
    include_conference_papers: bool,
    include_reviews: bool,
    language: Option<String>,
    from_year: Option<i32>,
}

impl RecordFilter {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            content_types: config.content_types.clone(),
            include_conference_papers: config.include_conference_papers,
            include_reviews: config.include_reviews,
            language: config.language.clone().filter(|l| !l.is_empty()),
            from_year: config.from_year,
        }
    }

    /// Override the language; an empty string disables the check
    pub fn language(mut self, language: Option<String>) -> Self {
        self.language = language.filter(|l| !l.is_empty());
        self
    }

    pub fn from_year(mut self, year: Option<i32>) -> Self {
        self.from_year = year;
        self
    }

    pub fn accepts(&self, record: &Record) -> bool {
        self.type_accepted(record) && self.language_accepted(record) && self.year_accepted(record)
    }

    fn type_accepted(&self, record: &Record) -> bool {
        let content_type = record.content_type().unwrap_or_default();
        if self.content_types.iter().any(|t| *t == content_type) {
            return true;
        }
        if self.include_conference_papers && content_type.ends_with("ConferencePaper") {
            return true;
        }
        self.include_reviews
            && review_pattern().is_some_and(|re| record.genres().iter().any(|g| re.is_match(g)))
    }

    fn language_accepted(&self, record: &Record) -> bool {
        match &self.language {
            Some(wanted) => record.language().as_deref() == Some(wanted.as_str()),
            None => true,
        }
    }

    fn year_accepted(&self, record: &Record) -> bool {
        let Some(from) = self.from_year else {
            return true;
        };
        publication_year(record).is_some_and(|year| year >= from)
    }
}

/// Leading four-digit year of the publication date
pub fn publication_year(record: &Record) -> Option<i32> {
    let date = record.publication_date()?;
    date.get(..4)?.parse().ok()
}
