//! Typed selector descriptors
//!
//! Selectors are data, not script text. Backends receive a [`Locator`] and
//! encode it as JSON before handing it to the page, so a selector value can
//! never change the shape of the query that runs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{PageCheckError, Result};

/// How an attribute value is compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeMatch {
    #[default]
    Exact,
    Contains,
}

/// A rule identifying zero or more elements on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    /// Plain CSS selector
    Css { css: String },
    /// Deepest elements whose rendered text contains `text`
    Text { text: String },
    /// CSS matches whose rendered text contains `text`
    CssText { css: String, text: String },
    /// CSS matches whose attribute `name` matches `value`
    Attribute {
        css: String,
        name: String,
        value: String,
        #[serde(default)]
        mode: AttributeMatch,
    },
}

impl Selector {
    pub fn css(css: impl Into<String>) -> Self {
        Self::Css { css: css.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn css_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssText {
            css: css.into(),
            text: text.into(),
        }
    }

    pub fn attribute(
        css: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Attribute {
            css: css.into(),
            name: name.into(),
            value: value.into(),
            mode: AttributeMatch::Exact,
        }
    }

    pub fn attribute_contains(
        css: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Attribute {
            css: css.into(),
            name: name.into(),
            value: value.into(),
            mode: AttributeMatch::Contains,
        }
    }

    /// Reject descriptors with empty parameters
    pub fn validate(&self) -> Result<()> {
        let empty = |field: &str| {
            Err(PageCheckError::InvalidSelector(format!(
                "{} selector has an empty `{}`",
                self.kind_name(),
                field
            )))
        };

        match self {
            Self::Css { css } if css.trim().is_empty() => empty("css"),
            Self::Text { text } if text.trim().is_empty() => empty("text"),
            Self::CssText { css, .. } if css.trim().is_empty() => empty("css"),
            Self::CssText { text, .. } if text.trim().is_empty() => empty("text"),
            Self::Attribute { css, .. } if css.trim().is_empty() => empty("css"),
            Self::Attribute { name, .. } if name.trim().is_empty() => empty("name"),
            _ => Ok(()),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Css { .. } => "css",
            Self::Text { .. } => "text",
            Self::CssText { .. } => "css_text",
            Self::Attribute { .. } => "attribute",
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css { css } => write!(f, "{}", css),
            Self::Text { text } => write!(f, "text={:?}", text),
            Self::CssText { css, text } => write!(f, "{}:has-text({:?})", css, text),
            Self::Attribute {
                css,
                name,
                value,
                mode,
            } => match mode {
                AttributeMatch::Exact => write!(f, "{}[{}={:?}]", css, name, value),
                AttributeMatch::Contains => write!(f, "{}[{}*={:?}]", css, name, value),
            },
        }
    }
}

/// A selector optionally restricted to a container element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub selector: Selector,
    /// CSS selector of the scoping container (whole document if None)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Locator {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            scope: None,
        }
    }

    pub fn within(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(scope) = &self.scope {
            if scope.trim().is_empty() {
                return Err(PageCheckError::InvalidSelector(
                    "scope container selector is empty".to_string(),
                ));
            }
        }
        self.selector.validate()
    }
}

impl From<Selector> for Locator {
    fn from(selector: Selector) -> Self {
        Self::new(selector)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{} >> {}", scope, self.selector),
            None => write!(f, "{}", self.selector),
        }
    }
}
