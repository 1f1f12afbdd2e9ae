use serde::{Deserialize, Serialize};

/// Upper bound on how many stalled records one retry scan re-enqueues.
pub const MAX_RETRY_BATCH: i64 = 10;

/// Lifecycle state of a page record. Pending is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageState {
    Pending,
    Success,
    Fail,
}

impl PageState {
    pub fn as_i16(self) -> i16 {
        match self {
            PageState::Pending => 0,
            PageState::Success => 1,
            PageState::Fail => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<PageState> {
        match value {
            0 => Some(PageState::Pending),
            1 => Some(PageState::Success),
            2 => Some(PageState::Fail),
            _ => None,
        }
    }
}

/// A fetched page as produced by the downloader.
#[derive(Debug, Clone)]
pub struct PageInfo {
    pub url: String,
    pub state: PageState,
    pub remark: String,
    pub content: String,
}

impl PageInfo {
    pub fn success(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: PageState::Success,
            remark: String::new(),
            content: content.into(),
        }
    }

    pub fn fail(url: impl Into<String>, remark: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: PageState::Fail,
            remark: remark.into(),
            content: String::new(),
        }
    }
}

/// A page after link extraction. Same fields as [`PageInfo`] plus the
/// deduplicated outbound link set.
#[derive(Debug, Clone)]
pub struct ParsedPageInfo {
    pub url: String,
    pub state: PageState,
    pub remark: String,
    pub content: String,
    pub sub_urls: Vec<String>,
}
