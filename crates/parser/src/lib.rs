//! Link extraction stage.
//!
//! Takes a fetched page and lifts the deduplicated set of anchor `href`
//! values out of its HTML. Values are kept verbatim; resolving them against
//! a base or normalizing them is intake work for the reconciliation stage.

use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::debug;

use crawld_core::{PageInfo, PageState, ParsedPageInfo};

/// Analyze a fetched page. Failed fetches pass through untouched with no
/// links; successful ones get their outbound `href` set extracted.
pub fn analyze(page: PageInfo) -> ParsedPageInfo {
    let mut parsed = ParsedPageInfo {
        url: page.url,
        state: page.state,
        remark: page.remark,
        content: page.content,
        sub_urls: Vec::new(),
    };

    if parsed.state != PageState::Success {
        return parsed;
    }

    parsed.sub_urls = extract_hrefs(&parsed.content);
    debug!(url = %parsed.url, links = parsed.sub_urls.len(), "page analyzed");
    parsed
}

/// All distinct `href` values of anchor elements, in first-seen order.
fn extract_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| !href.is_empty())
        .filter(|href| seen.insert(href.to_string()))
        .map(|href| href.to_string())
        .collect()
}
