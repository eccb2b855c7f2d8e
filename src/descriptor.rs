//! Plugin metadata reported to the host during introspection
//!
//! The host launches the plugin with `-introspect` and reads a
//! [`PluginDescriptor`] as JSON from stdout. It describes who the plugin
//! is and which ingress paths the host should forward traffic to.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Kind of plugin, serialized as an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PluginType {
    /// Handles, routes or forwards proxied traffic
    #[default]
    Router,
    /// Utility that does not intercept proxied traffic (e.g. a static web server)
    Utility,
}

impl PluginType {
    pub fn as_u8(&self) -> u8 {
        match self {
            PluginType::Router => 0,
            PluginType::Utility => 1,
        }
    }
}

impl Serialize for PluginType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for PluginType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(PluginType::Router),
            1 => Ok(PluginType::Utility),
            other => Err(serde::de::Error::custom(format!("unknown plugin type {}", other))),
        }
    }
}

/// A path the plugin wants the host to intercept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRule {
    pub capture_path: String,
    pub include_sub_paths: bool,
}

impl CaptureRule {
    pub fn new(capture_path: impl Into<String>, include_sub_paths: bool) -> Self {
        Self {
            capture_path: capture_path.into(),
            include_sub_paths,
        }
    }
}

/// Introspection payload
///
/// Field order is the JSON key order of the introspection output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique ID, reverse-domain style (e.g. `com.example.helloworld`)
    pub id: String,
    pub name: String,
    pub author: String,
    pub author_contact: String,
    pub description: String,
    pub url: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub version_major: u32,
    pub version_minor: u32,
    pub version_patch: u32,

    /// Applied to all traffic once the plugin is enabled, on every proxy rule
    #[serde(default)]
    pub global_capture_path: Vec<CaptureRule>,
    #[serde(default)]
    pub global_capture_ingress: String,

    /// Applied whenever the plugin is enabled on a proxy rule
    #[serde(default)]
    pub always_capture_path: Vec<CaptureRule>,
    #[serde(default)]
    pub always_capture_ingress: String,

    /// The host asks this path whether the plugin wants a request...
    #[serde(default, rename = "capture_path")]
    pub dynamic_capture_ingress: String,
    /// ...and forwards it here if the answer was yes
    #[serde(default, rename = "handle_path")]
    pub dynamic_handle_ingress: String,

    /// Subtree the host proxies into its own web UI
    #[serde(default)]
    pub ui_path: String,

    /// Receives a POST with a [`SubscriptionEvent`] body per event
    #[serde(default)]
    pub subscription_path: String,
    /// Event name to human readable description
    #[serde(default)]
    pub subscriptions_events: BTreeMap<String, String>,
}

impl PluginDescriptor {
    pub fn version(&self) -> (u32, u32, u32) {
        (self.version_major, self.version_minor, self.version_patch)
    }
}

/// Event delivered by the host to the subscription path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub event_name: String,
    pub event_source: String,
    /// May be empty
    #[serde(default)]
    pub payload: String,
}

impl SubscriptionEvent {
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }
}

/// Status codes the host interprets as control signals rather than HTTP semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStatusCode {
    /// Traffic captured by the plugin, the host must not process it further
    Captured,
    /// Traffic not handled, the host processes it as usual
    Unhandled,
    /// Plugin failed; the host processes the traffic and logs the error
    Error,
}

impl ControlStatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            ControlStatusCode::Captured => 280,
            ControlStatusCode::Unhandled => 284,
            ControlStatusCode::Error => 580,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.as_u16()).expect("control codes are valid status codes")
    }

    /// Whether a status lies in a band the host reserves for control signalling
    pub fn is_reserved(status: StatusCode) -> bool {
        matches!(status.as_u16(), 280..=289 | 580..=589)
    }

    /// Empty response carrying this control code
    pub fn response(&self) -> Response<Full<Bytes>> {
        Response::builder()
            .status(self.status_code())
            .body(Full::new(Bytes::new()))
            .expect("valid response with control status code")
    }
}
