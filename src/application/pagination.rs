//! Page-number pagination shared by every feed.
//!
//! Requested page numbers come straight from the `page` query parameter and
//! are never rejected: anything unparsable falls back to the first page and
//! out-of-range numbers clamp to the nearest valid page.

use std::num::NonZeroU32;

use url::form_urlencoded;

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    per_page: NonZeroU32,
}

/// Row window to fetch for a resolved page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub num_pages: u32,
    pub offset: u64,
    pub limit: u32,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub num_pages: u32,
    pub total_count: u64,
}

/// Query string of paginated pages.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    /// Pick `page` out of a raw query string. Parsing never fails; when the
    /// parameter repeats, the last value wins.
    pub fn from_query(raw: Option<&str>) -> Self {
        let page = raw.and_then(|raw| {
            form_urlencoded::parse(raw.as_bytes())
                .filter(|(key, _)| key == "page")
                .map(|(_, value)| value.into_owned())
                .last()
        });
        Self { page }
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.page.as_deref()
    }
}

impl Paginator {
    pub fn new(per_page: NonZeroU32) -> Self {
        Self { per_page }
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.get()
    }

    pub fn num_pages(&self, total_count: u64) -> u32 {
        let per_page = u64::from(self.per_page.get());
        let pages = total_count.div_ceil(per_page).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Resolve the raw `page` parameter against the current row count.
    pub fn window(&self, total_count: u64, requested: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages(total_count);
        let number = match requested.map(str::trim).map(str::parse::<i64>) {
            Some(Ok(value)) if value < 1 => 1,
            Some(Ok(value)) => u32::try_from(value).unwrap_or(u32::MAX).min(num_pages),
            Some(Err(_)) | None => 1,
        };

        let limit = self.per_page.get();
        PageWindow {
            number,
            num_pages,
            offset: u64::from(number - 1) * u64::from(limit),
            limit,
            total_count,
        }
    }
}

impl<T> Page<T> {
    pub fn from_window(window: PageWindow, items: Vec<T>) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total_count: window.total_count,
        }
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_other_pages(&self) -> bool {
        self.has_next() || self.has_previous()
    }

    pub fn next_page_number(&self) -> Option<u32> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn previous_page_number(&self) -> Option<u32> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total_count: self.total_count,
        }
    }
}
