// Paginated reads
//
// APIC refuses queries whose result set is too large, but serves the same
// query page by page. Pages are requested with `page=<n>&page-size=<size>`
// appended to whatever query the caller already had; the first empty page
// ends the walk.

use std::future::Future;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::Error;
use crate::reply::Reply;

/// Objects per page. The controller's own maximum.
pub const PAGE_SIZE: u32 = 50_000;

/// Position within one paged fetch. Lives only for that fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    path: String,
    base_query: Vec<String>,
    page: u32,
    page_size: u32,
}

impl PageCursor {
    /// Start at page 0 of `uri` (relative to the REST root).
    ///
    /// Any `page` / `page-size` the caller put in the query is dropped so
    /// the cursor stays authoritative. Other parameters keep their order
    /// and their literal text.
    pub fn new(uri: &str) -> Self {
        let uri = uri.split_once('#').map_or(uri, |(before, _)| before);
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        let base_query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split_once('=').map_or(*pair, |(k, _)| k);
                key != "page" && key != "page-size"
            })
            .map(str::to_owned)
            .collect();

        Self {
            path: path.to_owned(),
            base_query,
            page: 0,
            page_size: PAGE_SIZE,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The uri for the current page.
    pub fn uri(&self) -> String {
        let mut params = self.base_query.clone();
        params.push(format!("page={}", self.page));
        params.push(format!("page-size={}", self.page_size));
        format!("{}?{}", self.path, params.join("&"))
    }

    fn advance(&mut self) {
        self.page += 1;
    }
}

/// Walks pages until the controller returns an empty one.
#[derive(Debug, Default, Clone, Copy)]
pub struct Paginator;

impl Paginator {
    /// Fetch every page of `uri` through `fetch`, concatenating in page order.
    ///
    /// `fetch` receives the full per-page uri. An error on any page aborts
    /// the walk and discards what was collected; so does a rejection, which
    /// is handed back as-is.
    pub async fn fetch_all<F, Fut>(uri: &str, mut fetch: F) -> Result<Reply<Vec<Value>>, Error>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Reply<Vec<Value>>, Error>>,
    {
        let mut cursor = PageCursor::new(uri);
        let mut all = Vec::new();

        loop {
            let page_uri = cursor.uri();
            debug!(page = cursor.page(), uri = %page_uri, "fetching page");

            let items = match fetch(page_uri).await? {
                Reply::Success(items) => items,
                Reply::Rejected(rejection) => return Ok(Reply::Rejected(rejection)),
            };
            if items.is_empty() {
                info!(
                    pages = cursor.page(),
                    objects = all.len(),
                    "paginated fetch complete"
                );
                return Ok(Reply::Success(all));
            }

            all.extend(items);
            cursor.advance();
        }
    }
}
