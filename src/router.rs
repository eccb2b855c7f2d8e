//! Embedded UI router
//!
//! Serves a plugin's bundled UI under the path the host proxies into its
//! web interface. Each request goes through one of four outcomes:
//!
//! 1. the mount prefix is stripped and doubled separators collapsed
//! 2. `.../` redirects (302) to `.../index.html`
//! 3. `*.html` is read whole, every `{{.csrfToken}}` replaced with the
//!    request's token, and served uncached
//! 4. anything else is served as a static file from the asset subtree
//!
//! The router holds no mutable state besides the lazily built asset view,
//! so one instance can serve any number of concurrent requests.

use crate::assets::{AssetSource, ScopedAssets};
use crate::content::{serve_content, Validators};
use crate::error::{json_error_response, AssetError, UiErrorCode};
use crate::paths;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, LOCATION};
use hyper::{Request, Response, StatusCode};
use std::borrow::Cow;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error};

/// Header carrying the per-request CSRF token from the host
pub const CSRF_TOKEN_HEADER: &str = "x-zoraxy-csrf";
/// Placeholder replaced with the token in HTML documents
pub const CSRF_TOKEN_PLACEHOLDER: &str = "{{.csrfToken}}";
/// Substituted when the host sent no token
pub const MISSING_CSRF_TOKEN: &str = "missing-csrf-token";

/// Where the router's files live and where it is mounted
#[derive(Clone)]
pub struct UiRouteConfig {
    pub plugin_id: String,
    pub assets: Arc<dyn AssetSource>,
    /// Directory of the UI root inside `assets`, e.g. `/www`
    pub asset_prefix: String,
    /// Path the router is mounted under, e.g. `/ui`
    pub handler_prefix: String,
}

impl UiRouteConfig {
    /// Build a config with both prefixes normalized to `/prefix` form
    pub fn new(
        plugin_id: impl Into<String>,
        assets: Arc<dyn AssetSource>,
        asset_prefix: &str,
        handler_prefix: &str,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            assets,
            asset_prefix: paths::normalize_prefix(asset_prefix),
            handler_prefix: paths::normalize_prefix(handler_prefix),
        }
    }
}

impl std::fmt::Debug for UiRouteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiRouteConfig")
            .field("plugin_id", &self.plugin_id)
            .field("asset_prefix", &self.asset_prefix)
            .field("handler_prefix", &self.handler_prefix)
            .finish()
    }
}

pub struct PluginUiRouter {
    config: UiRouteConfig,
    /// Built on first request; a failure is kept and served as 500
    scoped: OnceLock<Result<ScopedAssets, AssetError>>,
}

impl PluginUiRouter {
    pub fn new(
        plugin_id: impl Into<String>,
        assets: Arc<dyn AssetSource>,
        asset_prefix: &str,
        handler_prefix: &str,
    ) -> Self {
        Self::with_config(UiRouteConfig::new(plugin_id, assets, asset_prefix, handler_prefix))
    }

    pub fn with_config(config: UiRouteConfig) -> Self {
        Self {
            config,
            scoped: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &UiRouteConfig {
        &self.config
    }

    pub fn handler_prefix(&self) -> &str {
        &self.config.handler_prefix
    }

    fn scoped_assets(&self) -> &Result<ScopedAssets, AssetError> {
        self.scoped.get_or_init(|| {
            let scoped = ScopedAssets::new(Arc::clone(&self.config.assets), &self.config.asset_prefix);
            if let Err(e) = &scoped {
                error!(
                    plugin_id = %self.config.plugin_id,
                    asset_prefix = %self.config.asset_prefix,
                    error = %e,
                    "Failed to scope UI asset tree"
                );
            }
            scoped
        })
    }

    /// Handle one UI request
    pub fn handle<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        let raw_path = paths::strip_handler_prefix(req.uri().path(), &self.config.handler_prefix);

        let assets = match self.scoped_assets() {
            Ok(assets) => assets,
            Err(_) => {
                return json_error_response(UiErrorCode::RouterConfigError, "Internal Server Error");
            }
        };

        let path = match urlencoding::decode(&raw_path) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => {
                debug!(path = %raw_path, "Undecodable UI request path");
                return not_found();
            }
        };

        if path.ends_with('/') {
            return self.redirect(self.location(&path, "/index.html"));
        }

        if path.ends_with(".html") {
            return self.serve_html(req, assets, &path);
        }

        self.serve_static(req, assets, &path)
    }

    /// Redirect target under the mount point for a decoded request path
    ///
    /// The path is cleaned and re-encoded so the target cannot climb out of
    /// the mount once the client resolves it.
    fn location(&self, path: &str, suffix: &str) -> String {
        let cleaned = paths::clean(path);
        let encoded: Vec<Cow<'_, str>> = cleaned
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(urlencoding::encode)
            .collect();
        let dir = if encoded.is_empty() {
            String::new()
        } else {
            format!("/{}", encoded.join("/"))
        };
        format!("{}{}{}", self.config.handler_prefix, dir, suffix)
    }

    fn serve_html<B>(&self, req: &Request<B>, assets: &ScopedAssets, path: &str) -> Response<Full<Bytes>> {
        let document = match assets.open(path) {
            Ok(document) => document,
            Err(e) => {
                debug!(plugin_id = %self.config.plugin_id, path, error = %e, "UI document not found");
                return not_found();
            }
        };

        let token = csrf_token(req);
        let body = replace_all(&document, CSRF_TOKEN_PLACEHOLDER.as_bytes(), token.as_bytes());
        debug!(plugin_id = %self.config.plugin_id, path, "Serving UI document");

        serve_content(req, path, body, &Validators::fresh())
    }

    fn serve_static<B>(
        &self,
        req: &Request<B>,
        assets: &ScopedAssets,
        path: &str,
    ) -> Response<Full<Bytes>> {
        match assets.open(path) {
            Ok(content) => {
                let validators = Validators::for_content(&content);
                serve_content(req, path, content, &validators)
            }
            Err(e) if assets.is_dir(path) => {
                debug!(path, error = %e, "UI directory requested without trailing slash");
                self.redirect(self.location(path, "/"))
            }
            Err(e) => {
                debug!(plugin_id = %self.config.plugin_id, path, error = %e, "UI asset not found");
                not_found()
            }
        }
    }

    fn redirect(&self, location: String) -> Response<Full<Bytes>> {
        Response::builder()
            .status(StatusCode::FOUND)
            .header(LOCATION, location)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Full::new(Bytes::from_static(b"Found")))
            .unwrap_or_else(|_| not_found())
    }
}

/// Token from the request header, or the sentinel if none was sent
///
/// Header bytes that are not UTF-8 are replaced with U+FFFD.
pub fn csrf_token<B>(req: &Request<B>) -> Cow<'_, str> {
    req.headers()
        .get(CSRF_TOKEN_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .filter(|v| !v.is_empty())
        .unwrap_or(Cow::Borrowed(MISSING_CSRF_TOKEN))
}

/// Replace every occurrence of `needle` in `haystack`, leaving other bytes untouched
fn replace_all(haystack: &[u8], needle: &[u8], with: &[u8]) -> Bytes {
    if needle.is_empty() {
        return Bytes::copy_from_slice(haystack);
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(at) = rest.windows(needle.len()).position(|w| w == needle) {
        out.extend_from_slice(&rest[..at]);
        out.extend_from_slice(with);
        rest = &rest[at + needle.len()..];
    }
    out.extend_from_slice(rest);
    Bytes::from(out)
}

fn not_found() -> Response<Full<Bytes>> {
    json_error_response(UiErrorCode::AssetNotFound, "File not found")
}
