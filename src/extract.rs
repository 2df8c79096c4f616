use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::AppResult;
use crate::resource::{LearningResource, NO_DESCRIPTION, NO_LINK, NO_TITLE};

/// Turns the text of one document into a resource.
pub trait Extractor: Send + Sync {
    fn extract(&self, content: &str) -> AppResult<LearningResource>;
}

/// Which extractor the pipeline builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Missing sections fall back to sentinels; any link is accepted.
    #[default]
    Heading,
    /// Like `Heading`, but a link without an http(s) scheme fails the document.
    ValidatedHeading,
}

impl ExtractorKind {
    pub fn build(self) -> AppResult<HeadingExtractor> {
        HeadingExtractor::new(matches!(self, ExtractorKind::ValidatedHeading))
    }
}

/// Markdown layout extractor:
///
/// ```markdown
/// ## Title
/// ### Description:
/// One paragraph of description.
/// [Link](https://example.com)
/// ```
#[derive(Debug, Clone)]
pub struct HeadingExtractor {
    title: Regex,
    description: Regex,
    link: Regex,
    validate_urls: bool,
}

impl HeadingExtractor {
    pub fn new(validate_urls: bool) -> AppResult<Self> {
        Ok(Self {
            // first title character may not be `#`, so `###` sub-headings never match
            title: Regex::new(r"(?m)^##[ \t]*([^#\s].*?)\s*$")?,
            description: Regex::new(r"(?m)^###\s*Description:\s*\n(.*)")?,
            link: Regex::new(r"\[Link\]\((.*?)\)")?,
            validate_urls,
        })
    }

    fn first_capture<'a>(re: &Regex, content: &'a str) -> Option<&'a str> {
        re.captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end())
    }
}

impl Extractor for HeadingExtractor {
    fn extract(&self, content: &str) -> AppResult<LearningResource> {
        let title = Self::first_capture(&self.title, content).unwrap_or(NO_TITLE);
        let description =
            Self::first_capture(&self.description, content).unwrap_or(NO_DESCRIPTION);
        let url = Self::first_capture(&self.link, content).unwrap_or(NO_LINK);

        if self.validate_urls {
            LearningResource::validated(title, description, url)
        } else {
            Ok(LearningResource::new(title, description, url))
        }
    }
}
