//! HTTP surface for the Lenscast engine.
//!
//! Thin routing layer over [`lenscast_core::Engine`]: manual path/query
//! parsing on top of `tiny_http`, JSON request/response bodies in camelCase.
//! All versioning and delta semantics live in the core crate; this layer
//! only translates between HTTP and engine calls.
//!
//! The [`TestServer`] helper starts a server on a random port for
//! integration testing.

use lenscast_core::{CatalogSource, CoreError, DeltaSince, Engine, EngineConfig, RefreshOutcome};
use lenscast_schema::{ItemId, LensType, SchemaError};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, error, info};

/// A parsed `/lens/...` route.
#[derive(Debug, PartialEq, Eq)]
pub enum LensRoute<'a> {
    Stats,
    Batch,
    Prune,
    Delta { item_id: &'a str },
    Refresh { item_id: &'a str },
    Lens { item_id: &'a str, lens_type: &'a str },
    History { item_id: &'a str, lens_type: &'a str },
}

/// Parse a path (query string already stripped) into a lens route.
pub fn parse_lens_route(path: &str) -> Option<LensRoute<'_>> {
    let rest = path.strip_prefix("/lens/")?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["stats"] => Some(LensRoute::Stats),
        ["batch"] => Some(LensRoute::Batch),
        ["prune"] => Some(LensRoute::Prune),
        [item_id, "delta"] => Some(LensRoute::Delta { item_id }),
        [item_id, "refresh"] => Some(LensRoute::Refresh { item_id }),
        [item_id, lens_type] => Some(LensRoute::Lens { item_id, lens_type }),
        [item_id, lens_type, "history"] => Some(LensRoute::History { item_id, lens_type }),
        _ => None,
    }
}

/// Split a raw request URL into (path, query pairs).
fn split_query(url: &str) -> (&str, HashMap<&str, &str>) {
    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p, q),
        None => (url, ""),
    };
    let params = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect();
    (path, params)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
    #[serde(default)]
    session_id: Option<String>,
    item_ids: Vec<String>,
    lens_type: String,
    #[serde(default)]
    client_versions: HashMap<String, u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PruneRequest {
    days: Option<i64>,
}

fn respond_err(req: tiny_http::Request, code: u16, msg: &str) {
    let body = json!({ "error": msg }).to_string();
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(
        Response::from_string(body)
            .with_header(header)
            .with_status_code(StatusCode(code)),
    );
}

fn respond_json(req: tiny_http::Request, body: &Value) {
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(Response::from_string(body.to_string()).with_header(header));
}

/// Map an engine error onto an HTTP status + message.
fn respond_core_err(req: tiny_http::Request, err: &CoreError) {
    match err {
        CoreError::ItemNotFound(_) => respond_err(req, 404, &err.to_string()),
        CoreError::Validation(_) | CoreError::Schema(SchemaError::UnknownLensType(_)) => {
            respond_err(req, 400, &err.to_string());
        }
        CoreError::Conflict { .. } => respond_err(req, 409, &err.to_string()),
        other => {
            error!("internal error: {other}");
            respond_err(req, 500, &other.to_string());
        }
    }
}

fn read_body(req: &mut tiny_http::Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

fn delta_json(item_id: &str, lens_type: LensType, delta: &DeltaSince) -> Value {
    let mut body = json!({
        "itemId": item_id,
        "lensType": lens_type,
        "hasChanges": delta.has_changes,
        "currentVersion": delta.current_version,
    });
    if let Some(fields) = &delta.changed_fields {
        body["changedFields"] = json!(fields);
    }
    if let Some(payload) = &delta.delta {
        body["delta"] = Value::Object(payload.clone());
    }
    body
}

fn refresh_json(item_id: &str, outcomes: &[RefreshOutcome]) -> Value {
    let mut results = Map::new();
    for outcome in outcomes {
        results.insert(
            outcome.lens_type.as_str().to_owned(),
            json!({ "status": outcome.status, "version": outcome.version }),
        );
    }
    json!({ "itemId": item_id, "results": results })
}

fn handle_lens_get(engine: &Engine, req: tiny_http::Request, item_id: &str, lens_type: &str) {
    let lens_type = match LensType::from_str(lens_type) {
        Ok(lt) => lt,
        Err(e) => return respond_err(req, 400, &e.to_string()),
    };
    match engine.lens(&ItemId::new(item_id), lens_type) {
        Ok(view) => respond_json(
            req,
            &json!({
                "itemId": view.item_id,
                "lensType": view.lens_type,
                "lens": view.lens,
                "version": view.version,
            }),
        ),
        Err(e) => respond_core_err(req, &e),
    }
}

fn handle_delta(
    engine: &Engine,
    req: tiny_http::Request,
    item_id: &str,
    params: &HashMap<&str, &str>,
) {
    let Some(since) = params.get("since").and_then(|v| v.parse::<u64>().ok()) else {
        return respond_err(req, 400, "missing or invalid 'since' query parameter");
    };
    let lens_type = match params.get("lensType").map(|v| LensType::from_str(v)) {
        Some(Ok(lt)) => lt,
        Some(Err(e)) => return respond_err(req, 400, &e.to_string()),
        None => return respond_err(req, 400, "missing 'lensType' query parameter"),
    };
    match engine.delta_since(&ItemId::new(item_id), lens_type, since) {
        Ok(delta) => {
            if delta.current_version == 0 {
                return respond_err(req, 404, &format!("no current version for '{item_id}'"));
            }
            respond_json(req, &delta_json(item_id, lens_type, &delta));
        }
        Err(e) => respond_core_err(req, &e),
    }
}

fn handle_history(
    engine: &Engine,
    req: tiny_http::Request,
    item_id: &str,
    lens_type: &str,
    params: &HashMap<&str, &str>,
) {
    let lens_type = match LensType::from_str(lens_type) {
        Ok(lt) => lt,
        Err(e) => return respond_err(req, 400, &e.to_string()),
    };
    let limit = match params.get("limit") {
        Some(v) => match v.parse::<usize>() {
            Ok(n) => n,
            Err(_) => return respond_err(req, 400, "invalid 'limit' query parameter"),
        },
        None => engine.config().delta_retention,
    };
    match engine.history(&ItemId::new(item_id), lens_type, limit) {
        Ok(entries) => {
            let history: Vec<Value> = entries
                .iter()
                .map(|e| {
                    json!({
                        "fromVersion": e.from_version,
                        "toVersion": e.to_version,
                        "changedFields": e.changed_fields,
                        "createdAt": e.created_at,
                    })
                })
                .collect();
            respond_json(
                req,
                &json!({ "itemId": item_id, "lensType": lens_type, "history": history }),
            );
        }
        Err(e) => respond_core_err(req, &e),
    }
}

fn handle_batch(engine: &Engine, mut req: tiny_http::Request) {
    let Some(body) = read_body(&mut req) else {
        return respond_err(req, 500, "read error");
    };
    let request: BatchRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return respond_err(req, 400, &format!("invalid batch request: {e}")),
    };
    let lens_type = match LensType::from_str(&request.lens_type) {
        Ok(lt) => lt,
        Err(e) => return respond_err(req, 400, &e.to_string()),
    };
    if let Some(session) = &request.session_id {
        debug!("batch for session {session}: {} items", request.item_ids.len());
    }

    let item_ids: Vec<ItemId> = request.item_ids.iter().map(ItemId::new).collect();
    let client_versions: HashMap<ItemId, u64> = request
        .client_versions
        .into_iter()
        .map(|(k, v)| (ItemId::new(k), v))
        .collect();

    match engine.batch(&item_ids, lens_type, &client_versions) {
        Ok(result) => {
            let items: Vec<Value> = result
                .items
                .iter()
                .map(|item| {
                    let mut body = json!({
                        "itemId": item.item_id,
                        "lens": item.lens,
                        "version": item.version,
                    });
                    if let Some(delta) = &item.delta {
                        body["delta"] = delta_json(item.item_id.as_str(), lens_type, delta);
                    }
                    body
                })
                .collect();
            respond_json(req, &json!({ "items": items, "count": result.count }));
        }
        Err(e) => respond_core_err(req, &e),
    }
}

fn handle_refresh(engine: &Engine, req: tiny_http::Request, item_id: &str) {
    match engine.refresh(&ItemId::new(item_id)) {
        Ok(outcomes) => {
            info!("refreshed '{item_id}'");
            respond_json(req, &refresh_json(item_id, &outcomes));
        }
        Err(e) => respond_core_err(req, &e),
    }
}

fn handle_prune(engine: &Engine, mut req: tiny_http::Request) {
    let Some(body) = read_body(&mut req) else {
        return respond_err(req, 500, "read error");
    };
    let request: PruneRequest = if body.is_empty() {
        PruneRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => return respond_err(req, 400, &format!("invalid prune request: {e}")),
        }
    };
    let days = request.days.unwrap_or(engine.config().prune_days);
    match engine.prune_older_than(days) {
        Ok(report) => {
            info!("pruned {} of {} delta records", report.deleted, report.examined);
            respond_json(req, &json!({ "deletedCount": report.deleted }));
        }
        Err(e) => respond_core_err(req, &e),
    }
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(engine: &Engine, req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    let (path, params) = split_query(&url);

    if path == "/health" && method == Method::Get {
        let _ = req.respond(Response::from_string(r#"{"status":"ok"}"#));
        return;
    }

    match parse_lens_route(path) {
        Some(LensRoute::Stats) if method == Method::Get => match engine.stats() {
            Ok(stats) => respond_json(
                req,
                &json!({
                    "card": stats.card,
                    "quickview": stats.quickview,
                    "playback": stats.playback,
                    "totalVersions": stats.total_versions,
                    "totalDeltas": stats.total_deltas,
                }),
            ),
            Err(e) => respond_core_err(req, &e),
        },
        Some(LensRoute::Batch) if method == Method::Post => handle_batch(engine, req),
        Some(LensRoute::Prune) if method == Method::Post => handle_prune(engine, req),
        Some(LensRoute::Delta { item_id }) if method == Method::Get => {
            handle_delta(engine, req, item_id, &params);
        }
        Some(LensRoute::Refresh { item_id }) if method == Method::Post => {
            handle_refresh(engine, req, item_id);
        }
        Some(LensRoute::Lens { item_id, lens_type }) if method == Method::Get => {
            handle_lens_get(engine, req, item_id, lens_type);
        }
        Some(LensRoute::History { item_id, lens_type }) if method == Method::Get => {
            handle_history(engine, req, item_id, lens_type, &params);
        }
        Some(_) => respond_err(req, 405, "method not allowed"),
        None => respond_err(req, 404, "not found"),
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(engine: &Arc<Engine>, addr: &str) -> Result<(), CoreError> {
    let server = Server::http(addr).map_err(|e| {
        CoreError::Io(std::io::Error::other(format!("failed to bind {addr}: {e}")))
    })?;
    for request in server.incoming_requests() {
        handle_request(engine, request);
    }
    Ok(())
}

/// A test helper that starts a lenscast-server on a random port in a
/// background thread.
///
/// Listens on `127.0.0.1:{port}`, stores lens state under `data_dir`.
/// Drop the `TestServer` to stop the server (via `Server::unblock`).
pub struct TestServer {
    pub url: String,
    pub port: u16,
    server: Arc<Server>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    /// Start a test server over the given data directory and catalog.
    /// Binds to `127.0.0.1:0` (random port).
    pub fn start(data_dir: &Path, catalog: Arc<dyn CatalogSource>) -> Self {
        let engine = Engine::new(data_dir, catalog, EngineConfig::default())
            .expect("failed to create test engine");
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let engine = Arc::new(engine);
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&engine, request);
            }
        });

        Self {
            url,
            port,
            server,
            handle: Some(handle),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Join the worker so the engine's store lock is released before the
        // data directory can be reused.
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lens_route_fixed_endpoints() {
        assert_eq!(parse_lens_route("/lens/stats"), Some(LensRoute::Stats));
        assert_eq!(parse_lens_route("/lens/batch"), Some(LensRoute::Batch));
        assert_eq!(parse_lens_route("/lens/prune"), Some(LensRoute::Prune));
    }

    #[test]
    fn parse_lens_route_item_endpoints() {
        assert_eq!(
            parse_lens_route("/lens/item-1/card"),
            Some(LensRoute::Lens {
                item_id: "item-1",
                lens_type: "card"
            })
        );
        assert_eq!(
            parse_lens_route("/lens/item-1/delta"),
            Some(LensRoute::Delta { item_id: "item-1" })
        );
        assert_eq!(
            parse_lens_route("/lens/item-1/refresh"),
            Some(LensRoute::Refresh { item_id: "item-1" })
        );
        assert_eq!(
            parse_lens_route("/lens/item-1/playback/history"),
            Some(LensRoute::History {
                item_id: "item-1",
                lens_type: "playback"
            })
        );
    }

    #[test]
    fn parse_lens_route_rejects_unknown_shapes() {
        assert!(parse_lens_route("/other/x/card").is_none());
        assert!(parse_lens_route("/lens/").is_none());
        assert!(parse_lens_route("/lens/a/b/c/d").is_none());
    }

    #[test]
    fn split_query_extracts_params() {
        let (path, params) = split_query("/lens/item-1/delta?since=3&lensType=card");
        assert_eq!(path, "/lens/item-1/delta");
        assert_eq!(params.get("since"), Some(&"3"));
        assert_eq!(params.get("lensType"), Some(&"card"));
    }

    #[test]
    fn split_query_without_query_string() {
        let (path, params) = split_query("/lens/stats");
        assert_eq!(path, "/lens/stats");
        assert!(params.is_empty());
    }
}
