use url::Url;

use crate::error::CrawlError;

/// Normalize a URL to its store key: scheme and fragment blanked, everything
/// else re-serialized as-is. Two URLs differing only in scheme or fragment
/// collapse to the same key.
///
/// Idempotent: an already-normalized (scheme-relative) input parses against a
/// placeholder scheme and normalizes back to itself.
pub fn shortify(raw: &str) -> Result<String, CrawlError> {
    let mut parsed = parse_lenient(raw)?;
    parsed.set_fragment(None);
    let serialized = parsed.to_string();
    Ok(serialized[parsed.scheme().len() + 1..].to_string())
}

/// Host of the URL, without any port suffix.
pub fn get_domain(raw: &str) -> Result<String, CrawlError> {
    let parsed = parse_lenient(raw)?;
    Ok(parsed.host_str().unwrap_or_default().to_string())
}

fn parse_lenient(raw: &str) -> Result<Url, CrawlError> {
    match Url::parse(raw) {
        Ok(parsed) => Ok(parsed),
        // Scheme-relative form, i.e. an already-shortified URL.
        Err(url::ParseError::RelativeUrlWithoutBase) if raw.starts_with("//") => {
            Url::parse(&format!("http:{raw}"))
                .map_err(|e| CrawlError::InvalidUrl(format!("{raw}: {e}")))
        }
        Err(e) => Err(CrawlError::InvalidUrl(format!("{raw}: {e}"))),
    }
}

/// File name for a stored body: the percent-encoded remainder of the
/// normalized URL after its `//<host>` prefix (path plus query). The host
/// itself becomes the sharding directory, so it never appears in the name.
pub fn content_file_name(normalized: &str) -> String {
    let rest = normalized
        .strip_prefix("//")
        .and_then(|r| r.find('/').map(|i| &r[i..]))
        .unwrap_or(normalized);
    urlencoding::encode(rest).into_owned()
}
