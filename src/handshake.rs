//! Startup handshake with the host process
//!
//! The host runs the plugin binary twice:
//! - `plugin -introspect`: print the [`PluginDescriptor`] as JSON and exit 0
//! - `plugin -configure=<json>` (or `-configure <json>`): parse the
//!   [`RuntimeParameters`] and start serving on `127.0.0.1:<port>`
//!
//! All functions take the argument list explicitly, with the program name
//! at index 0, so they can be driven from tests.

use crate::descriptor::PluginDescriptor;
use crate::error::HandshakeError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use tracing::debug;

pub const INTROSPECT_FLAG: &str = "-introspect";
pub const CONFIGURE_FLAG: &str = "-configure";

/// Values that stay fixed for the lifetime of the host instance
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeConstants {
    #[serde(default)]
    pub zoraxy_version: String,
    #[serde(default)]
    pub zoraxy_uuid: String,
}

/// Configuration payload supplied by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeParameters {
    /// Port to listen on, loopback only
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub runtime_const: RuntimeConstants,
}

impl RuntimeParameters {
    /// Parse and validate a `-configure` JSON value
    pub fn from_json(json: &str) -> Result<Self, HandshakeError> {
        let params: RuntimeParameters = serde_json::from_str(json)
            .map_err(|e| HandshakeError::MalformedConfiguration(e.to_string()))?;
        if params.port == 0 {
            return Err(HandshakeError::MalformedConfiguration(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(params)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

/// Whether the host asked for introspection (first argument after the program name)
pub fn introspection_requested<S: AsRef<str>>(args: &[S]) -> bool {
    args.get(1)
        .map(|a| AsRef::<str>::as_ref(a) == INTROSPECT_FLAG)
        .unwrap_or(false)
}

/// Render the descriptor as single-space indented JSON
///
/// Best effort: a serialization failure yields an empty string, so the host
/// always receives output and a clean exit.
pub fn render_introspection(descriptor: &PluginDescriptor) -> String {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    if descriptor.serialize(&mut serializer).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

/// Write the introspection document followed by a newline
pub fn write_introspection<W: Write>(out: &mut W, descriptor: &PluginDescriptor) -> std::io::Result<()> {
    writeln!(out, "{}", render_introspection(descriptor))?;
    out.flush()
}

/// Print the descriptor and exit 0 if introspection was requested, otherwise return
///
/// Must run before any server bootstrap.
pub fn describe_and_exit_if_requested<S: AsRef<str>>(args: &[S], descriptor: &PluginDescriptor) {
    if !introspection_requested(args) {
        return;
    }
    let stdout = std::io::stdout();
    let _ = write_introspection(&mut stdout.lock(), descriptor);
    std::process::exit(0);
}

/// Find and parse the `-configure` directive
///
/// The first directive wins. Both `-configure=<json>` and `-configure <json>`
/// are accepted.
pub fn parse_runtime_parameters<S: AsRef<str>>(args: &[S]) -> Result<RuntimeParameters, HandshakeError> {
    for (i, arg) in args.iter().enumerate() {
        let arg: &str = arg.as_ref();
        if let Some(json) = arg.strip_prefix("-configure=") {
            debug!(form = "inline", "Configuration directive found");
            return RuntimeParameters::from_json(json);
        }
        if arg == CONFIGURE_FLAG {
            let json = args.get(i + 1).ok_or(HandshakeError::MissingConfiguration(
                "no value specified after -configure flag",
            ))?;
            debug!(form = "separate", "Configuration directive found");
            return RuntimeParameters::from_json(AsRef::<str>::as_ref(json));
        }
    }
    Err(HandshakeError::MissingConfiguration("no -configure flag found"))
}

/// Single entry point for a plugin bootstrap: offer introspection, then parse configuration
pub fn negotiate<S: AsRef<str>>(
    args: &[S],
    descriptor: &PluginDescriptor,
) -> Result<RuntimeParameters, HandshakeError> {
    describe_and_exit_if_requested(args, descriptor);
    parse_runtime_parameters(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PluginType;

    const CONFIG: &str =
        r#"{"port":5874,"runtime_const":{"zoraxy_version":"3.2.0","zoraxy_uuid":"a1b2"}}"#;

    fn expected() -> RuntimeParameters {
        RuntimeParameters {
            port: 5874,
            runtime_const: RuntimeConstants {
                zoraxy_version: "3.2.0".into(),
                zoraxy_uuid: "a1b2".into(),
            },
        }
    }

    #[test]
    fn test_inline_and_separate_forms_are_equal() {
        let inline = format!("-configure={}", CONFIG);
        let a = parse_runtime_parameters(&["prog", inline.as_str()]).unwrap();
        let b = parse_runtime_parameters(&["prog", "-configure", CONFIG]).unwrap();
        assert_eq!(a, expected());
        assert_eq!(a, b);
    }

    #[test]
    fn test_directive_can_appear_anywhere() {
        let params = parse_runtime_parameters(&["prog", "-verbose", "-configure", CONFIG]).unwrap();
        assert_eq!(params.port, 5874);
    }

    #[test]
    fn test_missing_configuration() {
        assert!(matches!(
            parse_runtime_parameters(&["prog"]),
            Err(HandshakeError::MissingConfiguration(_))
        ));
        assert!(matches!(
            parse_runtime_parameters(&["prog", "-configure"]),
            Err(HandshakeError::MissingConfiguration(_))
        ));
        let empty: [&str; 0] = [];
        assert!(matches!(
            parse_runtime_parameters(&empty),
            Err(HandshakeError::MissingConfiguration(_))
        ));
    }

    #[test]
    fn test_malformed_configuration() {
        assert!(matches!(
            parse_runtime_parameters(&["prog", "-configure=not-json"]),
            Err(HandshakeError::MalformedConfiguration(_))
        ));
        assert!(matches!(
            parse_runtime_parameters(&["prog", "-configure", "{\"port\":\"eighty\"}"]),
            Err(HandshakeError::MalformedConfiguration(_))
        ));
        assert!(matches!(
            parse_runtime_parameters(&["prog", "-configure={\"port\":70000}"]),
            Err(HandshakeError::MalformedConfiguration(_))
        ));
        assert!(matches!(
            parse_runtime_parameters(&["prog", "-configure={\"port\":0}"]),
            Err(HandshakeError::MalformedConfiguration(_))
        ));
    }

    #[test]
    fn test_optional_runtime_constants() {
        let params = parse_runtime_parameters(&["prog", "-configure={\"port\":8080,\"extra\":true}"]).unwrap();
        assert_eq!(params.runtime_const, RuntimeConstants::default());
        assert_eq!(params.listen_addr(), "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn test_introspection_requested_only_as_first_argument() {
        assert!(introspection_requested(&["prog", "-introspect"]));
        assert!(!introspection_requested(&["prog", "-configure", CONFIG, "-introspect"]));
        assert!(!introspection_requested(&["prog"]));
    }

    #[test]
    fn test_negotiate_without_introspection_returns_parameters() {
        let descriptor = PluginDescriptor::default();
        let params = negotiate(&["prog", "-configure", CONFIG], &descriptor).unwrap();
        assert_eq!(params, expected());
    }

    #[test]
    fn test_write_introspection() {
        let descriptor = PluginDescriptor {
            id: "org.example.hello".into(),
            plugin_type: PluginType::Utility,
            version_major: 1,
            version_minor: 0,
            version_patch: 4,
            ..Default::default()
        };
        let mut out = Vec::new();
        write_introspection(&mut out, &descriptor).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.ends_with("}\n"));
        assert!(text.contains("\n \"id\": \"org.example.hello\""));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["id"], "org.example.hello");
        assert_eq!(value["type"], 1);
        assert_eq!(value["version_patch"], 4);
    }
}
