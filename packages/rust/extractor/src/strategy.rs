//! Extraction strategies and ordered per-field strategy chains.
//!
//! Strategies are tried in priority order; the first non-empty value wins.
//! The winning index is reported so fallback use can be traced when the
//! site's markup drifts.

use jobpilot_shared::{JobPilotError, Result};
use scraper::{ElementRef, Selector};

/// One candidate method for reading a field from a result-card node.
pub trait ExtractionStrategy: Send + Sync {
    /// Short name for tracing.
    fn name(&self) -> &str;

    /// Try to read the value. `None` or an empty string means "not found".
    fn extract(&self, node: ElementRef<'_>) -> Option<String>;
}

/// Parse a CSS selector, mapping the parser's error into [`JobPilotError`].
pub fn css(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| JobPilotError::parse(format!("invalid selector '{selector}': {e}")))
}

/// Concatenate an element's text with whitespace collapsed.
pub(crate) fn node_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Built-in strategy kinds
// ---------------------------------------------------------------------------

/// Text of the first descendant matching a selector that has non-empty text.
pub struct SelectorText {
    selector_src: String,
    selector: Selector,
}

impl SelectorText {
    pub fn new(selector: &str) -> Result<Self> {
        Ok(Self {
            selector_src: selector.to_string(),
            selector: css(selector)?,
        })
    }
}

impl ExtractionStrategy for SelectorText {
    fn name(&self) -> &str {
        &self.selector_src
    }

    fn extract(&self, node: ElementRef<'_>) -> Option<String> {
        node.select(&self.selector)
            .map(node_text)
            .find(|text| !text.is_empty())
    }
}

/// An attribute of the first descendant matching a selector.
pub struct SelectorAttr {
    name: String,
    selector: Selector,
    attr: String,
}

impl SelectorAttr {
    pub fn new(selector: &str, attr: &str) -> Result<Self> {
        Ok(Self {
            name: format!("{selector}@{attr}"),
            selector: css(selector)?,
            attr: attr.to_string(),
        })
    }
}

impl ExtractionStrategy for SelectorAttr {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, node: ElementRef<'_>) -> Option<String> {
        node.select(&self.selector)
            .filter_map(|el| el.value().attr(&self.attr))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Yields a fixed value when a selector is present, optionally only when the
/// matched element's text contains a needle (case-insensitive).
pub struct Marker {
    name: String,
    selector: Selector,
    text_contains: Option<String>,
    value: String,
}

impl Marker {
    pub fn new(selector: &str, value: &str) -> Result<Self> {
        Ok(Self {
            name: selector.to_string(),
            selector: css(selector)?,
            text_contains: None,
            value: value.to_string(),
        })
    }

    pub fn with_text(selector: &str, needle: &str, value: &str) -> Result<Self> {
        Ok(Self {
            name: format!("{selector}:contains({needle})"),
            selector: css(selector)?,
            text_contains: Some(needle.to_lowercase()),
            value: value.to_string(),
        })
    }
}

impl ExtractionStrategy for Marker {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, node: ElementRef<'_>) -> Option<String> {
        let found = match &self.text_contains {
            None => node.select(&self.selector).next().is_some(),
            Some(needle) => node
                .select(&self.selector)
                .any(|el| node_text(el).to_lowercase().contains(needle)),
        };
        found.then(|| self.value.clone())
    }
}

/// The whole node's text. Used as the last resort for free-form fields.
pub struct NodeText;

impl ExtractionStrategy for NodeText {
    fn name(&self) -> &str {
        "node-text"
    }

    fn extract(&self, node: ElementRef<'_>) -> Option<String> {
        Some(node_text(node))
    }
}

// ---------------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------------

/// A resolved field value plus which strategy produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    /// 1-based priority of the winning strategy.
    pub strategy: usize,
    pub strategy_name: String,
}

/// Ordered list of strategies for one field.
pub struct FieldChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl FieldChain {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Try each strategy in order and return the first non-empty value.
    pub fn resolve(&self, node: ElementRef<'_>) -> Option<Resolved> {
        self.strategies
            .iter()
            .enumerate()
            .find_map(|(i, strategy)| {
                let value = strategy.extract(node)?;
                let value = value.trim();
                (!value.is_empty()).then(|| Resolved {
                    value: value.to_string(),
                    strategy: i + 1,
                    strategy_name: strategy.name().to_string(),
                })
            })
    }
}

impl std::fmt::Debug for FieldChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn root(doc: &Html) -> ElementRef<'_> {
        let sel = css("div.card").unwrap();
        doc.select(&sel).next().expect("card node")
    }

    #[test]
    fn chain_reports_winning_index() {
        let doc = Html::parse_fragment(
            r#"<div class="card"><span class="b">  Backend   Engineer </span></div>"#,
        );
        let chain = FieldChain::new(vec![
            Box::new(SelectorText::new("span.a").unwrap()),
            Box::new(SelectorText::new("span.b").unwrap()),
        ]);
        let resolved = chain.resolve(root(&doc)).expect("resolved");
        assert_eq!(resolved.value, "Backend Engineer");
        assert_eq!(resolved.strategy, 2);
        assert_eq!(resolved.strategy_name, "span.b");
    }

    #[test]
    fn empty_text_falls_through() {
        let doc = Html::parse_fragment(
            r#"<div class="card"><h3>  </h3><a href="/jobs/view/1">Analyst</a></div>"#,
        );
        let chain = FieldChain::new(vec![
            Box::new(SelectorText::new("h3").unwrap()),
            Box::new(SelectorText::new("a").unwrap()),
        ]);
        assert_eq!(chain.resolve(root(&doc)).unwrap().strategy, 2);
    }

    #[test]
    fn attr_and_marker_strategies() {
        let doc = Html::parse_fragment(
            r#"<div class="card">
                 <a class="link" href=" /jobs/view/9 ">x</a>
                 <button class="apply">Easy Apply</button>
               </div>"#,
        );
        let node = root(&doc);

        let attr = SelectorAttr::new("a.link", "href").unwrap();
        assert_eq!(attr.extract(node).as_deref(), Some("/jobs/view/9"));
        assert_eq!(attr.name(), "a.link@href");

        let marker = Marker::with_text("button", "easy apply", "true").unwrap();
        assert_eq!(marker.extract(node).as_deref(), Some("true"));

        let absent = Marker::with_text("button", "quick apply", "true").unwrap();
        assert_eq!(absent.extract(node), None);
    }

    #[test]
    fn exhausted_chain_is_none() {
        let doc = Html::parse_fragment(r#"<div class="card"><p>nothing here</p></div>"#);
        let chain = FieldChain::new(vec![Box::new(SelectorText::new("h3").unwrap())]);
        assert!(chain.resolve(root(&doc)).is_none());
    }

    #[test]
    fn rejects_invalid_selector() {
        assert!(SelectorText::new("div[").is_err());
    }
}
