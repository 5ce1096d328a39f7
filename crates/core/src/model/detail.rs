use serde::{Deserialize, Serialize};

/// A term and its side-menu definition inside a module's study guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyItem {
    pub term: String,
    pub definition: String,
}

/// One titled group of study items; a module's detail is a list of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailSection {
    #[serde(rename = "section_title")]
    pub title: String,
    #[serde(rename = "section_items", default)]
    pub items: Vec<StudyItem>,
}

/// Cache key of a sub-detail.
///
/// Terms are only unique within one topic, so the owning topic title is part
/// of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubDetailKey {
    pub term: String,
    pub context: String,
}

impl SubDetailKey {
    #[must_use]
    pub fn new(term: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            context: context.into(),
        }
    }
}

/// Deep-dive HTML explanation of a single study item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDetail {
    key: SubDetailKey,
    html: String,
}

impl SubDetail {
    /// Wrap generated HTML, dropping a surrounding ```html fence if present.
    #[must_use]
    pub fn new(key: SubDetailKey, raw: &str) -> Self {
        Self {
            key,
            html: strip_html_fence(raw).to_owned(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &SubDetailKey {
        &self.key
    }

    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }
}

fn strip_html_fence(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(rest) = body.strip_prefix("```html") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}
