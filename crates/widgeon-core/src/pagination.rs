// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pagination through widget remote links.
//!
//! Pagination libraries hook in here explicitly: they hand over the page
//! numbers and get back markup whose links refresh the widget
//! with the page parameter set. Long page ranges are windowed: the first and
//! last `outer_window + 1` pages, `inner_window` pages either side of the
//! current one, and a gap marker for everything skipped.

use serde_json::{json, Value};

use crate::error::WidgetError;
use crate::helpers::ViewHelpers;
use crate::instance::WidgetInstance;
use crate::naming::DEFAULT_TEMPLATE;
use crate::OptionMap;

const GAP: &str = "<span class=\"gap\">&hellip;</span>";

/// Position within a paginated collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    /// Current page, 1-based.
    pub current: u64,
    /// Number of pages.
    pub total_pages: u64,
    /// Option name the page number travels under.
    pub param: String,
    /// Pages shown either side of the current page.
    pub inner_window: u64,
    /// Extra pages shown after the first and before the last page.
    pub outer_window: u64,
}

impl Pagination {
    /// Pagination with the conventional `page` parameter and windows of 4/1.
    pub fn new(current: u64, total_pages: u64) -> Self {
        Self {
            current,
            total_pages,
            param: "page".into(),
            inner_window: 4,
            outer_window: 1,
        }
    }

    /// Pages to show in order; `None` marks a gap.
    pub fn visible_pages(&self) -> Vec<Option<u64>> {
        let total = self.total_pages;
        let current = self.current.clamp(1, total.max(1));
        let mut shown: Vec<u64> = Vec::new();
        let mut push_range = |from: u64, to: u64| {
            for page in from.max(1)..=to.min(total) {
                shown.push(page);
            }
        };
        push_range(1, 1 + self.outer_window);
        push_range(
            current.saturating_sub(self.inner_window),
            current.saturating_add(self.inner_window),
        );
        push_range(total.saturating_sub(self.outer_window), total);
        shown.sort_unstable();
        shown.dedup();

        let mut pages = Vec::with_capacity(shown.len() + 2);
        let mut previous = 0;
        for page in shown {
            match page - previous {
                1 => {}
                // A gap of one page is shown as the page itself.
                2 => pages.push(Some(page - 1)),
                _ => pages.push(None),
            }
            pages.push(Some(page));
            previous = page;
        }
        pages
    }
}

/// Page links for `widget`, or `None` when there is at most one page.
///
/// `backlink_options` are merged into every link (after the page options, so
/// they may override `refresh`).
pub fn paginate(
    widget: &WidgetInstance,
    helpers: &dyn ViewHelpers,
    pagination: &Pagination,
    backlink_options: &OptionMap,
) -> Result<Option<String>, WidgetError> {
    if pagination.total_pages <= 1 {
        return Ok(None);
    }
    let mut html = String::from("<div class=\"pagination\">");
    for item in pagination.visible_pages() {
        match item {
            None => html.push_str(GAP),
            Some(page) if page == pagination.current => {
                html.push_str(&format!("<span class=\"current\">{page}</span>"));
            }
            Some(page) => {
                let mut options = OptionMap::new();
                options.insert("refresh".into(), json!(DEFAULT_TEMPLATE));
                options.insert(pagination.param.clone(), Value::from(page));
                options.extend(backlink_options.clone());
                html.push_str(&widget.remote_link(
                    helpers,
                    &page.to_string(),
                    options,
                    OptionMap::new(),
                )?);
            }
        }
        html.push('\n');
    }
    html.push_str("</div>");
    Ok(Some(html))
}
