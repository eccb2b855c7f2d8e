//! Zoraxy plugin library
//!
//! Building blocks for plugins that run as child processes of the Zoraxy
//! reverse proxy:
//! - Startup handshake: answer `-introspect` with the plugin's metadata and
//!   parse the host's `-configure` runtime parameters
//! - Embedded UI router: serve bundled UI files under the path the host
//!   proxies, with the host's CSRF token injected into HTML
//! - A loopback HTTP server that mounts the router next to other handlers

pub mod assets;
pub mod content;
pub mod descriptor;
pub mod error;
pub mod handshake;
pub mod paths;
pub mod router;
pub mod server;
