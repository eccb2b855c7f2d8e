use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Response, StatusCode};
use rust_embed::RustEmbed;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use zoraxy_plugin::assets::EmbeddedAssets;
use zoraxy_plugin::descriptor::{PluginDescriptor, PluginType, SubscriptionEvent};
use zoraxy_plugin::handshake::{self, RuntimeConstants};
use zoraxy_plugin::router::PluginUiRouter;
use zoraxy_plugin::server::{handler_fn, PluginServer};

const PLUGIN_ID: &str = "org.aroz.zoraxy.helloworld";
const UI_PATH: &str = "/ui";

#[derive(RustEmbed)]
#[folder = "assets/"]
struct WebAssets;

fn plugin_descriptor() -> PluginDescriptor {
    let mut events = BTreeMap::new();
    events.insert(
        "access_list_updated".to_string(),
        "Logged when an access list changes".to_string(),
    );

    PluginDescriptor {
        id: PLUGIN_ID.to_string(),
        name: "Hello World".to_string(),
        author: "foobar".to_string(),
        author_contact: "admin@example.com".to_string(),
        description: "A simple hello world plugin".to_string(),
        url: "https://example.com".to_string(),
        plugin_type: PluginType::Utility,
        version_major: 1,
        version_minor: 0,
        version_patch: 0,
        ui_path: UI_PATH.to_string(),
        subscription_path: "/notify".to_string(),
        subscriptions_events: events,
        ..Default::default()
    }
}

fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum and static header")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the introspection document, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zoraxy_plugin=info".parse().expect("valid log directive"))
                .add_directive("helloworld=info".parse().expect("valid log directive")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let descriptor = plugin_descriptor();
    let params = handshake::negotiate(&args, &descriptor).map_err(|e| {
        error!(error = %e, "Plugin handshake failed");
        e
    })?;

    info!(
        plugin_id = PLUGIN_ID,
        port = params.port,
        zoraxy_version = %params.runtime_const.zoraxy_version,
        "Plugin configured"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let router = PluginUiRouter::new(
        PLUGIN_ID,
        Arc::new(EmbeddedAssets::<WebAssets>::new()),
        "/www",
        UI_PATH,
    );

    let runtime_const: Arc<RuntimeConstants> = Arc::new(params.runtime_const.clone());
    let runtime_info = handler_fn(move |_req| {
        let runtime_const = Arc::clone(&runtime_const);
        async move {
            match serde_json::to_string(runtime_const.as_ref()) {
                Ok(body) => json_response(StatusCode::OK, body),
                Err(e) => json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": e.to_string() }).to_string(),
                ),
            }
        }
    });

    let subscription = handler_fn(|req: hyper::Request<hyper::body::Incoming>| async move {
        if req.method() != Method::POST {
            return json_response(StatusCode::METHOD_NOT_ALLOWED, r#"{"error":"method not allowed"}"#);
        }
        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(error = %e, "Failed to read subscription event");
                return json_response(StatusCode::BAD_REQUEST, r#"{"error":"unreadable body"}"#);
            }
        };
        match SubscriptionEvent::from_slice(&body) {
            Ok(event) => {
                info!(
                    event_name = %event.event_name,
                    event_source = %event.event_source,
                    payload_len = event.payload.len(),
                    "Subscription event received"
                );
                json_response(StatusCode::OK, r#"{"ok":true}"#)
            }
            Err(e) => {
                warn!(error = %e, "Malformed subscription event");
                json_response(StatusCode::BAD_REQUEST, r#"{"error":"malformed event"}"#)
            }
        }
    });

    let server = PluginServer::new(&params, shutdown_rx)
        .mount_ui(router)
        .mount("/ui/api/runtime", runtime_info)
        .mount(&descriptor.subscription_path, subscription);

    let mut server_handle = tokio::spawn(server.run());

    tokio::select! {
        result = &mut server_handle => {
            let result = result.map_err(anyhow::Error::from).and_then(|r| r);
            if let Err(e) = &result {
                error!(error = %e, "Plugin server error");
            }
            return result;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            let _ = shutdown_tx.send(true);
            let _ = server_handle.await;
        }
    }

    info!("Shutdown complete");
    Ok(())
}
