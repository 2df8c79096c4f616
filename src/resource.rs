use serde::{Deserialize, Serialize};

use crate::table::RecordTable;
use crate::{AppError, AppResult};

pub const NO_TITLE: &str = "No Title Found";
pub const NO_DESCRIPTION: &str = "No Description Found";
pub const NO_LINK: &str = "No Link Found";

/// One learning item: where it lives and what it is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningResource {
    pub title: String,
    pub description: String,
    pub url: String,
    /// User rating, only present for resources loaded from a CSV table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl LearningResource {
    /// Build a resource without checking the link.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            url: url.into(),
            rating: None,
        }
    }

    /// Build a resource whose link must use an http(s) scheme.
    pub fn validated(
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> AppResult<Self> {
        let url = url.into();
        if !has_http_scheme(&url) {
            return Err(AppError::InvalidUrl(url));
        }
        Ok(Self::new(title, description, url))
    }

    pub fn with_rating(mut self, rating: Option<f64>) -> Self {
        self.rating = rating;
        self
    }
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resources in load order. Grows by appending only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningResourceCollection {
    resources: Vec<LearningResource>,
}

impl LearningResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&mut self, resource: LearningResource) {
        self.resources.push(resource);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LearningResource> {
        self.resources.iter()
    }

    pub fn into_table(self) -> RecordTable {
        RecordTable::from_resources(self.resources)
    }
}

impl IntoIterator for LearningResourceCollection {
    type Item = LearningResource;
    type IntoIter = std::vec::IntoIter<LearningResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

impl<'a> IntoIterator for &'a LearningResourceCollection {
    type Item = &'a LearningResource;
    type IntoIter = std::slice::Iter<'a, LearningResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

impl FromIterator<LearningResource> for LearningResourceCollection {
    fn from_iter<I: IntoIterator<Item = LearningResource>>(iter: I) -> Self {
        Self {
            resources: iter.into_iter().collect(),
        }
    }
}
