//! Flattening of nested publisher records into fixed CSV columns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Record;

const NOT_AVAILABLE: &str = "Not available";
const NO_AUTHORS: &str = "No author information";
const NO_KEYWORDS: &str = "No keywords";
const NO_PDF_LINK: &str = "No PDF link";

/// One CSV row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub doi: String,
    pub title: String,
    pub author: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: String,
    pub publisher: String,
    #[serde(rename = "publicationDate")]
    pub publication_date: String,
    #[serde(rename = "publicationType")]
    pub publication_type: String,
    pub pdf_link: String,
}

impl FlatRecord {
    pub fn from_record(record: &Record) -> Self {
        Self {
            doi: text_or(record, "doi", NOT_AVAILABLE),
            title: clean(&text_or(record, "title", NOT_AVAILABLE)),
            author: clean(&authors(record)),
            abstract_text: clean(&text_or(record, "abstract", NOT_AVAILABLE)),
            keywords: clean(&keywords(record)),
            publisher: text_or(record, "publisher", NOT_AVAILABLE),
            publication_date: record.publication_date().unwrap_or_default(),
            publication_type: record.str_field("publicationType").unwrap_or_default(),
            pdf_link: pdf_link(record),
        }
    }
}

/// Newlines and tabs break naive CSV consumers
fn clean(text: &str) -> String {
    text.replace(['\r', '\n', '\t'], " ")
}

/// A field as text; structured values are rendered as compact JSON
fn text_or(record: &Record, field: &str, placeholder: &str) -> String {
    match record.get(field) {
        None | Some(Value::Null) => placeholder.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => placeholder.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// `creators[].creator` (Springer) or `authors` (plain list or string)
fn authors(record: &Record) -> String {
    let names: Vec<String> = match record.get("creators").or_else(|| record.get("authors")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(map) => map.get("creator").and_then(Value::as_str).map(str::to_string),
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };

    if names.is_empty() {
        NO_AUTHORS.to_string()
    } else {
        names.join(" / ")
    }
}

fn keywords(record: &Record) -> String {
    match record.get("keyword") {
        Some(Value::Array(items)) => {
            let words: Vec<String> = items
                .iter()
                .filter_map(|k| match k {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect();
            if words.is_empty() {
                NO_KEYWORDS.to_string()
            } else {
                words.join(" / ")
            }
        }
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => NO_KEYWORDS.to_string(),
    }
}

/// PDF url if listed, else a doi.org url, else the first url
fn pdf_link(record: &Record) -> String {
    let urls = match record.get("url") {
        Some(Value::Array(items)) => items,
        Some(Value::String(s)) => return s.clone(),
        _ => return NO_PDF_LINK.to_string(),
    };

    let value_of = |item: &Value| item.get("value").and_then(Value::as_str).map(str::to_string);

    urls.iter()
        .find(|u| u.get("format").and_then(Value::as_str) == Some("pdf"))
        .and_then(value_of)
        .or_else(|| {
            urls.iter()
                .filter_map(value_of)
                .find(|v| v.contains("doi.org"))
        })
        .or_else(|| urls.first().and_then(value_of))
        .unwrap_or_else(|| NO_PDF_LINK.to_string())
}
