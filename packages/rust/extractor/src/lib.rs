//! Resilient job-card extraction from a rendered search-results document.
//!
//! This crate provides:
//! - [`strategy`]: extraction strategies and ordered [`FieldChain`]s
//! - [`JobCardExtractor`]: enumerates result cards and resolves each field
//!
//! A card whose required field cannot be read by any strategy is reported as
//! a [`PartialExtractionFailure`] and skipped; the rest of the batch is kept.

pub mod strategy;

use std::collections::BTreeMap;

use chrono::Utc;
use jobpilot_shared::{JobPosting, PostingId, Result};
use scraper::{ElementRef, Html, Selector};
use url::Url;

pub use strategy::{
    ExtractionStrategy, FieldChain, Marker, NodeText, Resolved, SelectorAttr, SelectorText, css,
};

/// A posting field read from a result card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Title,
    Company,
    Url,
    EasyApply,
    Requirements,
    Location,
}

impl Field {
    pub const REQUIRED: [Field; 5] = [
        Field::Title,
        Field::Company,
        Field::Url,
        Field::EasyApply,
        Field::Requirements,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Company => "company",
            Self::Url => "url",
            Self::EasyApply => "easy_apply",
            Self::Requirements => "requirements",
            Self::Location => "location",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which strategy produced a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub strategy: usize,
    pub strategy_name: String,
}

/// A fully extracted card.
#[derive(Debug, Clone)]
pub struct ExtractedPosting {
    pub posting: JobPosting,
    pub provenance: BTreeMap<Field, Provenance>,
}

impl ExtractedPosting {
    /// 1-based index of the strategy that produced `field`.
    pub fn strategy_for(&self, field: Field) -> Option<usize> {
        self.provenance.get(&field).map(|p| p.strategy)
    }
}

/// A card where at least one required field could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialExtractionFailure {
    /// 1-based position of the card in the document.
    pub ordinal: usize,
    pub missing: Vec<Field>,
    /// Title, when it was readable, to help identify the card in logs.
    pub title: Option<String>,
}

impl std::fmt::Display for PartialExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let missing: Vec<&str> = self.missing.iter().map(Field::as_str).collect();
        write!(
            f,
            "card #{} missing required fields: {}",
            self.ordinal,
            missing.join(", ")
        )
    }
}

/// Result of extracting one document.
#[derive(Debug, Default)]
pub struct DocumentExtraction {
    /// 1-based index of the card-container selector that matched, if any.
    pub container_strategy: Option<usize>,
    pub cards: Vec<std::result::Result<ExtractedPosting, PartialExtractionFailure>>,
}

impl DocumentExtraction {
    pub fn postings(&self) -> impl Iterator<Item = &ExtractedPosting> {
        self.cards.iter().filter_map(|c| c.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &PartialExtractionFailure> {
        self.cards.iter().filter_map(|c| c.as_ref().err())
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Job-card extractor with ordered container selectors and per-field chains.
#[derive(Debug)]
pub struct JobCardExtractor {
    containers: Vec<(String, Selector)>,
    chains: BTreeMap<Field, FieldChain>,
}

impl JobCardExtractor {
    /// Extractor with the built-in selector lists for the job board's
    /// logged-in and guest result layouts.
    pub fn builtin() -> Result<Self> {
        let containers = [
            "div.job-card-container",
            "div.jobs-search-results-list li",
            "div[data-test-id*='job-card']",
            "article[class*='job-card']",
            "div.base-card",
        ]
        .into_iter()
        .map(|s| Ok((s.to_string(), css(s)?)))
        .collect::<Result<Vec<_>>>()?;

        let mut chains = BTreeMap::new();
        chains.insert(
            Field::Title,
            text_chain(&[
                "a.job-card-list__title",
                "a.job-card-container__link",
                "h3.base-search-card__title",
                "span.base-search-card__title",
                "a[data-control-name='job_card_click']",
                "h3",
                "a[href*='/jobs/view/']",
            ])?,
        );
        chains.insert(
            Field::Company,
            text_chain(&[
                ".job-card-container__company-name",
                ".job-card-container__primary-description",
                ".base-search-card__subtitle",
                "h4",
                "a[href*='/company/']",
            ])?,
        );
        chains.insert(
            Field::Url,
            FieldChain::new(vec![
                Box::new(SelectorAttr::new("a.job-card-list__title", "href")?),
                Box::new(SelectorAttr::new("a.job-card-container__link", "href")?),
                Box::new(SelectorAttr::new("a.base-card__full-link", "href")?),
                Box::new(SelectorAttr::new("a[data-control-name='job_card_click']", "href")?),
                Box::new(SelectorAttr::new("a[href*='/jobs/view/']", "href")?),
            ]),
        );
        chains.insert(
            Field::EasyApply,
            FieldChain::new(vec![
                Box::new(Marker::new("button[aria-label*='Easy Apply']", "true")?),
                Box::new(Marker::with_text("button", "easy apply", "true")?),
                Box::new(Marker::with_text("span, li", "easy apply", "true")?),
                Box::new(Marker::new("[data-easy-apply='true']", "true")?),
                // A card that links to a posting but advertises no in-platform apply.
                Box::new(Marker::new("a[href]", "false")?),
            ]),
        );
        chains.insert(
            Field::Requirements,
            FieldChain::new(vec![
                Box::new(SelectorText::new(".job-card-container__description")?),
                Box::new(SelectorText::new(".base-search-card__snippet")?),
                Box::new(SelectorText::new("[data-test-id='job-description']")?),
                Box::new(SelectorText::new(".job-card-list__insight")?),
                Box::new(NodeText),
            ]),
        );
        chains.insert(
            Field::Location,
            text_chain(&[
                ".job-card-container__metadata-item",
                ".job-search-card__location",
                ".job-card-container__metadata-wrapper span",
                "[data-test-id='job-location']",
            ])?,
        );

        Ok(Self { containers, chains })
    }

    /// Replace the strategy chain for one field.
    pub fn with_chain(mut self, field: Field, chain: FieldChain) -> Self {
        self.chains.insert(field, chain);
        self
    }

    /// Extract every result card in `html`. Relative posting links are
    /// resolved against `base`.
    #[tracing::instrument(skip_all, fields(base = %base))]
    pub fn extract_document(&self, html: &str, base: &Url) -> DocumentExtraction {
        let doc = Html::parse_document(html);

        let Some((container_idx, nodes)) = self.enumerate_cards(&doc) else {
            tracing::warn!("no result cards found with any container selector");
            return DocumentExtraction::default();
        };

        let cards = nodes
            .into_iter()
            .enumerate()
            .map(|(i, node)| self.extract_card(node, i + 1, base))
            .collect::<Vec<_>>();

        let failed = cards.iter().filter(|c| c.is_err()).count();
        tracing::debug!(
            container_strategy = container_idx,
            cards = cards.len(),
            failed,
            "extracted result cards"
        );

        DocumentExtraction {
            container_strategy: Some(container_idx),
            cards,
        }
    }

    /// First container selector that yields nodes wins.
    fn enumerate_cards<'a>(&self, doc: &'a Html) -> Option<(usize, Vec<ElementRef<'a>>)> {
        self.containers
            .iter()
            .enumerate()
            .find_map(|(i, (name, sel))| {
                let nodes: Vec<_> = doc.select(sel).collect();
                if nodes.is_empty() {
                    return None;
                }
                if i > 0 {
                    tracing::debug!(selector = %name, index = i + 1, "card container fallback");
                }
                Some((i + 1, nodes))
            })
    }

    fn resolve(&self, field: Field, node: ElementRef<'_>) -> Option<Resolved> {
        let resolved = self.chains.get(&field)?.resolve(node)?;
        if resolved.strategy > 1 {
            tracing::debug!(
                field = field.as_str(),
                strategy = resolved.strategy,
                name = %resolved.strategy_name,
                "field resolved by fallback strategy"
            );
        }
        Some(resolved)
    }

    fn extract_card(
        &self,
        node: ElementRef<'_>,
        ordinal: usize,
        base: &Url,
    ) -> std::result::Result<ExtractedPosting, PartialExtractionFailure> {
        let mut values: BTreeMap<Field, Resolved> = BTreeMap::new();
        let mut missing = Vec::new();

        for field in Field::REQUIRED {
            match self.resolve(field, node) {
                Some(r) => {
                    values.insert(field, r);
                }
                None => missing.push(field),
            }
        }

        let url = values
            .get(&Field::Url)
            .and_then(|r| base.join(&r.value).ok());
        if url.is_none() && !missing.contains(&Field::Url) {
            missing.push(Field::Url);
            missing.sort();
        }

        let title = values.get(&Field::Title).map(|r| r.value.clone());
        let (Some(url), true) = (url, missing.is_empty()) else {
            tracing::debug!(ordinal, ?missing, "skipping card with missing fields");
            return Err(PartialExtractionFailure {
                ordinal,
                missing,
                title,
            });
        };

        if let Some(loc) = self.resolve(Field::Location, node) {
            values.insert(Field::Location, loc);
        }

        let value = |field| values.get(&field).map(|r: &Resolved| r.value.clone());
        let posting = JobPosting {
            id: PostingId::from_url(&url),
            url,
            title: value(Field::Title).unwrap_or_default(),
            company: value(Field::Company).unwrap_or_default(),
            location: value(Field::Location),
            easy_apply: value(Field::EasyApply).as_deref() == Some("true"),
            requirements: value(Field::Requirements).unwrap_or_default(),
            discovered_at: Utc::now(),
        };

        let provenance = values
            .into_iter()
            .map(|(field, r)| {
                (
                    field,
                    Provenance {
                        strategy: r.strategy,
                        strategy_name: r.strategy_name,
                    },
                )
            })
            .collect();

        Ok(ExtractedPosting {
            posting,
            provenance,
        })
    }
}

fn text_chain(selectors: &[&str]) -> Result<FieldChain> {
    let strategies = selectors
        .iter()
        .map(|s| Ok(Box::new(SelectorText::new(s)?) as Box<dyn ExtractionStrategy>))
        .collect::<Result<Vec<_>>>()?;
    Ok(FieldChain::new(strategies))
}
