//! Shared link record, partial-update record, and rank ordering.
//!
//! Every sorted view in this crate uses the same total order defined here:
//! frecency descending, then last visit date descending, then url ascending.
//! Keeping the comparator in one place is what makes repeated merges of
//! identical inputs produce identical orderings.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A ranked link contributed by a provider.
///
/// `url` is the unique key inside one merged view; `title` is display-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub frecency: i64,
    #[serde(default)]
    pub last_visit_date: i64,
}

impl Link {
    pub fn new(url: impl Into<String>, frecency: i64, last_visit_date: i64) -> Self {
        Self {
            url: url.into(),
            title: None,
            frecency,
            last_visit_date,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Total rank order: frecency desc, last visit date desc, url asc.
    pub fn cmp_rank(&self, other: &Link) -> Ordering {
        other
            .frecency
            .cmp(&self.frecency)
            .then_with(|| other.last_visit_date.cmp(&self.last_visit_date))
            .then_with(|| self.url.cmp(&other.url))
    }
}

/// Sort links into rank order (highest-ranked first).
pub fn sort_by_rank(links: &mut [Link]) {
    links.sort_by(Link::cmp_rank);
}

/// A partial link update. `url` identifies the target entry; only the
/// fields that are present overwrite the target's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPatch {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frecency: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_visit_date: Option<i64>,
}

impl LinkPatch {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            frecency: None,
            last_visit_date: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_frecency(mut self, frecency: i64) -> Self {
        self.frecency = Some(frecency);
        self
    }

    pub fn with_last_visit_date(mut self, last_visit_date: i64) -> Self {
        self.last_visit_date = Some(last_visit_date);
        self
    }

    /// Field-level replacement: absent fields leave the target untouched.
    pub fn apply_to(&self, link: &mut Link) {
        if let Some(title) = &self.title {
            link.title = Some(title.clone());
        }
        if let Some(frecency) = self.frecency {
            link.frecency = frecency;
        }
        if let Some(last_visit_date) = self.last_visit_date {
            link.last_visit_date = last_visit_date;
        }
    }

    /// Materialize a brand-new entry; missing fields default.
    pub fn into_link(self) -> Link {
        Link {
            url: self.url,
            title: self.title,
            frecency: self.frecency.unwrap_or(0),
            last_visit_date: self.last_visit_date.unwrap_or(0),
        }
    }
}

impl From<Link> for LinkPatch {
    fn from(link: Link) -> Self {
        Self {
            url: link.url,
            title: link.title,
            frecency: Some(link.frecency),
            last_visit_date: Some(link.last_visit_date),
        }
    }
}
