//! Mock upstream server for HTTP-level tests.

use httptest::matchers::{contains, eq, key, not, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{all_of, Expectation, Server};
use serde_json::{json, Value};

/// An `httptest` server preloaded with upstream endpoints.
///
/// Helper endpoints accept any number of requests; register an explicit
/// [`Expectation`] through [`MockUpstream::server`] to assert call counts.
pub struct MockUpstream {
    server: Server,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            server: Server::run(),
        }
    }

    /// The underlying server.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Absolute URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        self.server.url_str(path)
    }

    /// Serve a fixed JSON body for GETs on `path`, whatever the query.
    pub fn serve_json(&self, path: &'static str, body: Value) -> &Self {
        self.server.expect(
            Expectation::matching(request::method_path("GET", path))
                .times(..)
                .respond_with(json_encoded(body)),
        );
        self
    }

    /// Serve an error status for GETs on `path`.
    pub fn serve_status(&self, path: &'static str, code: u16) -> &Self {
        self.server.expect(
            Expectation::matching(request::method_path("GET", path))
                .times(..)
                .respond_with(status_code(code)),
        );
        self
    }

    /// Serve a paged JSON:API endpoint.
    ///
    /// Requests without a `page` parameter get the first page with the
    /// `meta.totalItems` envelope. `page=<n>` requests get the n-th slice
    /// of `items`, with the `included` resources attached to the first page.
    pub fn serve_paged(
        &self,
        path: &'static str,
        items: Vec<Value>,
        included: Vec<Value>,
        per_page: usize,
    ) -> &Self {
        let total = items.len();
        let pages: Vec<Vec<Value>> = items.chunks(per_page.max(1)).map(<[Value]>::to_vec).collect();

        let page_body = |n: usize, data: Vec<Value>| {
            let included = if n == 1 { included.clone() } else { Vec::new() };
            json!({"data": data, "included": included, "meta": {"totalItems": total}})
        };

        let first = page_body(1, pages.first().cloned().unwrap_or_default());
        self.server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", path),
                request::query(url_decoded(not(contains(key("page"))))),
            ])
            .times(..)
            .respond_with(json_encoded(first)),
        );

        for (i, data) in pages.into_iter().enumerate() {
            let n = i + 1;
            self.server.expect(
                Expectation::matching(all_of![
                    request::method_path("GET", path),
                    request::query(url_decoded(contains(("page", eq(n.to_string()))))),
                ])
                .times(..)
                .respond_with(json_encoded(page_body(n, data))),
            );
        }
        self
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}
