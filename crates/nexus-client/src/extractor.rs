use nexus_core::config::{PaginationConfig, SelectorConfig};
use nexus_core::error::AppError;
use nexus_core::models::{ExtractedPage, Record};
use nexus_core::traits::Extractor;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

/// What to read from the element a field selector matches.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldValue {
    Text,
    Attr(String),
}

/// A parsed field selector such as `h3 a::attr(title)` or `.price::text`.
///
/// An empty CSS part (`::attr(href)`) targets the item element itself.
#[derive(Debug)]
struct FieldSelector {
    css: Option<Selector>,
    value: FieldValue,
}

impl FieldSelector {
    fn parse(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim();
        let (css, value) = if let Some(css) = raw.strip_suffix("::text") {
            (css, FieldValue::Text)
        } else if let Some(idx) = raw.find("::attr(") {
            let rest = &raw[idx + "::attr(".len()..];
            let name = rest
                .strip_suffix(')')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| AppError::SelectorError(format!("Malformed attribute selector '{raw}'")))?;
            (&raw[..idx], FieldValue::Attr(name.to_string()))
        } else {
            (raw, FieldValue::Text)
        };

        let css = css.trim();
        let css = if css.is_empty() {
            None
        } else {
            Some(parse_css(css)?)
        };
        Ok(Self { css, value })
    }

    fn read(&self, item: ElementRef<'_>) -> String {
        let target = match &self.css {
            Some(selector) => item.select(selector).next(),
            None => Some(item),
        };
        let Some(element) = target else {
            return String::new();
        };

        match &self.value {
            FieldValue::Text => element_text(element),
            FieldValue::Attr(name) => element
                .value()
                .attr(name)
                .unwrap_or_default()
                .trim()
                .to_string(),
        }
    }
}

fn parse_css(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::SelectorError(format!("Invalid selector '{css}': {e}")))
}

/// Trimmed text nodes joined by single spaces.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// CSS-selector extractor built on the `scraper` crate.
///
/// Every element matching `selectors.item` becomes one record; each configured
/// field is read relative to that element. Fields whose element is missing are
/// empty strings. The next-page link is resolved against the page URL.
#[derive(Debug, Clone, Default)]
pub struct SelectorExtractor;

impl SelectorExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for SelectorExtractor {
    fn extract(
        &self,
        html: &str,
        page_url: &str,
        selectors: &SelectorConfig,
        pagination: &PaginationConfig,
    ) -> Result<ExtractedPage, AppError> {
        let item_selector = parse_css(&selectors.item)?;
        let fields = selectors
            .fields
            .iter()
            .map(|(name, raw)| -> Result<_, AppError> {
                Ok((name.as_str(), FieldSelector::parse(raw)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let document = Html::parse_document(html);

        let records: Vec<Record> = document
            .select(&item_selector)
            .map(|item| {
                fields
                    .iter()
                    .map(|(name, field)| (name.to_string(), Value::String(field.read(item))))
                    .collect()
            })
            .collect();

        let next_url = match pagination.next_selector.as_deref() {
            Some(css) => next_link(&document, css, page_url)?,
            None => None,
        };

        Ok(ExtractedPage { records, next_url })
    }
}

fn next_link(document: &Html, css: &str, page_url: &str) -> Result<Option<String>, AppError> {
    let selector = parse_css(css)?;
    let Some(href) = document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|h| !h.is_empty())
    else {
        return Ok(None);
    };

    let resolved = Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(String::from);
    match resolved {
        Ok(url) => Ok(Some(url)),
        Err(e) => {
            tracing::warn!(%href, error = %e, "Ignoring unresolvable next link");
            Ok(None)
        }
    }
}
