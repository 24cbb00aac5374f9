mod host;
mod log;
mod state;

use std::rc::Rc;

use mu_core::host::PageLocation;
use mu_core::{MuConfig, MuError, Mu, Params, Post, Session};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::host::WasmHost;
use crate::state::Runtime;

// ── Return codes ─────────────────────────────────────────────────────

const ERR_BAD_INPUT: i32 = -1;
const ERR_PARSE: i32 = -2;
const ERR_INVALID: i32 = -3;
const ERR_TRANSPORT: i32 = -4;
const ERR_NOT_INITIALIZED: i32 = -5;

/// Topic of the event carrying an operation's outcome back to the page.
const CALLBACK_TOPIC: &str = "mu.callback";

// ── Helpers: strings in WASM memory ──────────────────────────────────

fn read_str(ptr: *const u8, len: u32) -> Option<&'static str> {
    if len == 0 {
        return Some("");
    }
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
    std::str::from_utf8(bytes).ok()
}

/// Like [`read_str`], with zero length meaning "not given".
fn read_opt_str(ptr: *const u8, len: u32) -> Result<Option<&'static str>, i32> {
    if len == 0 {
        return Ok(None);
    }
    read_str(ptr, len).map(Some).ok_or(ERR_BAD_INPUT)
}

fn write_to_buffer(s: &str, out_ptr: *mut u8, max_len: u32) -> u32 {
    let bytes = s.as_bytes();
    let copy_len = bytes.len().min(max_len as usize);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), out_ptr, copy_len);
    }
    copy_len as u32
}

fn emit_callback(request: u32, mut body: Value) {
    if let Value::Object(ref mut fields) = body {
        fields.insert("request".to_string(), json!(request));
    }
    host::emit_event(CALLBACK_TOPIC, &body.to_string());
}

/// Flatten a JSON object into call parameters; non-string values are sent as JSON text.
fn params_from_json(json: &str) -> Result<Params, serde_json::Error> {
    let fields: serde_json::Map<String, Value> = serde_json::from_str(json)?;
    let mut params = Params::new();
    for (key, value) in fields {
        match value {
            Value::Null => {
                params.set_opt(key, None::<String>);
            }
            Value::String(s) => {
                params.set(key, s);
            }
            other => {
                params.set(key, other.to_string());
            }
        }
    }
    Ok(params)
}

#[derive(Deserialize)]
struct InitRequest {
    #[serde(default)]
    config: MuConfig,
    page: PageInit,
    #[serde(default)]
    session: Option<Session>,
}

#[derive(Deserialize)]
struct PageInit {
    protocol: String,
    host: String,
    #[serde(default)]
    href: String,
}

// ── LIFECYCLE EXPORTS ────────────────────────────────────────────────

/// Initialize the client from `{"config": {...}, "page": {...}, "session": {...}}`.
/// Returns 0 on success, negative on error.
#[unsafe(no_mangle)]
pub extern "C" fn mu_init(json_ptr: *const u8, json_len: u32) -> i32 {
    log::init();

    let json = match read_str(json_ptr, json_len) {
        Some(s) => s,
        None => return ERR_BAD_INPUT,
    };
    let request: InitRequest = match serde_json::from_str(json) {
        Ok(r) => r,
        Err(_) => return ERR_PARSE,
    };

    let host = Rc::new(WasmHost::new(PageLocation {
        protocol: request.page.protocol,
        host: request.page.host,
        href: request.page.href,
    }));

    match Mu::init(host.clone(), request.config, request.session) {
        Ok(mu) => {
            state::init(Runtime {
                mu,
                host,
                result_buffer: String::new(),
            });
            host::log(2, "mu: client initialized");
            0
        }
        Err(MuError::Config(_)) => ERR_INVALID,
        Err(MuError::TransportUnavailable) => ERR_TRANSPORT,
        Err(_) => ERR_PARSE,
    }
}

// ── MEMORY MANAGEMENT ────────────────────────────────────────────────

/// Allocate memory in WASM linear memory (for host to write into).
#[unsafe(no_mangle)]
pub extern "C" fn mu_alloc(size: u32) -> *mut u8 {
    match std::alloc::Layout::from_size_align(size.max(1) as usize, 1) {
        Ok(layout) => unsafe { std::alloc::alloc(layout) },
        Err(_) => std::ptr::null_mut(),
    }
}

/// Deallocate memory in WASM linear memory.
#[unsafe(no_mangle)]
pub extern "C" fn mu_dealloc(ptr: *mut u8, size: u32) {
    if ptr.is_null() {
        return;
    }
    if let Ok(layout) = std::alloc::Layout::from_size_align(size.max(1) as usize, 1) {
        unsafe { std::alloc::dealloc(ptr, layout) }
    }
}

// ── INBOUND EVENTS ───────────────────────────────────────────────────

/// A `message` event reached the page. Returns 1 if a listener took it.
#[unsafe(no_mangle)]
pub extern "C" fn mu_on_message(msg_ptr: *const u8, msg_len: u32) -> i32 {
    let Some(payload) = read_str(msg_ptr, msg_len) else {
        return ERR_BAD_INPUT;
    };
    let Some((_, host)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    host.deliver_message(payload) as i32
}

/// The embedded bridge relayed a message. Returns 1 if the bridge was wired.
#[unsafe(no_mangle)]
pub extern "C" fn mu_on_bridge_message(msg_ptr: *const u8, msg_len: u32) -> i32 {
    let Some(payload) = read_str(msg_ptr, msg_len) else {
        return ERR_BAD_INPUT;
    };
    let Some((_, host)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    host.deliver_bridge_message(payload) as i32
}

/// A timer scheduled through `host_set_timeout`/`host_set_interval` fired.
/// Returns 1 if it was still live.
#[unsafe(no_mangle)]
pub extern "C" fn mu_on_timer(token: u32) -> i32 {
    let Some((_, host)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    host.fire_timer(token) as i32
}

/// A JSONP response script invoked its callback. Returns 1 if a call was waiting for it.
#[unsafe(no_mangle)]
pub extern "C" fn mu_deliver_api_response(
    id_ptr: *const u8,
    id_len: u32,
    json_ptr: *const u8,
    json_len: u32,
) -> i32 {
    let (Some(id), Some(json)) = (read_str(id_ptr, id_len), read_str(json_ptr, json_len)) else {
        return ERR_BAD_INPUT;
    };
    let response: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(_) => return ERR_PARSE,
    };
    let Some((mu, _)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    mu.deliver_api_response(id, response) as i32
}

// ── OPERATIONS ───────────────────────────────────────────────────────
// Each takes a caller-chosen request number; the outcome arrives later as a
// `mu.callback` event carrying that number.

#[unsafe(no_mangle)]
pub extern "C" fn mu_status(request: u32) -> i32 {
    let Some((mu, _)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    mu.status(move |session| emit_callback(request, json!({ "session": session })));
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn mu_login(request: u32, perms_ptr: *const u8, perms_len: u32) -> i32 {
    let perms = match read_opt_str(perms_ptr, perms_len) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let Some((mu, _)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    mu.login(perms, move |session, perms| {
        emit_callback(request, json!({ "session": session, "perms": perms }))
    });
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn mu_logout(request: u32) -> i32 {
    let Some((mu, _)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    mu.logout(move |session| emit_callback(request, json!({ "session": session })));
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn mu_disconnect(request: u32) -> i32 {
    let Some((mu, _)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    mu.disconnect(move |session| emit_callback(request, json!({ "session": session })));
    0
}

/// Open the share dialog. Zero-length arguments fall back to the defaults.
#[unsafe(no_mangle)]
pub extern "C" fn mu_share(url_ptr: *const u8, url_len: u32, title_ptr: *const u8, title_len: u32) -> i32 {
    let (url, title) = match (read_opt_str(url_ptr, url_len), read_opt_str(title_ptr, title_len)) {
        (Ok(url), Ok(title)) => (url, title),
        _ => return ERR_BAD_INPUT,
    };
    let Some((mu, _)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    mu.share(url, title);
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn mu_publish(request: u32, post_ptr: *const u8, post_len: u32) -> i32 {
    let post = match read_opt_str(post_ptr, post_len) {
        Ok(None) => Post::default(),
        Ok(Some(json)) => match serde_json::from_str::<Post>(json) {
            Ok(post) => post,
            Err(_) => return ERR_PARSE,
        },
        Err(code) => return code,
    };
    let Some((mu, _)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    mu.publish(&post, move |result| emit_callback(request, json!({ "result": result })));
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn mu_add_relation(request: u32, id_ptr: *const u8, id_len: u32) -> i32 {
    let Some(id) = read_str(id_ptr, id_len) else {
        return ERR_BAD_INPUT;
    };
    let Some((mu, _)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };
    mu.add_relation(id, move |result| emit_callback(request, json!({ "result": result })));
    0
}

/// Issue a signed REST call. The call id is left in the result buffer.
#[unsafe(no_mangle)]
pub extern "C" fn mu_api(
    request: u32,
    params_ptr: *const u8,
    params_len: u32,
    secret_ptr: *const u8,
    secret_len: u32,
) -> i32 {
    let Some(json) = read_str(params_ptr, params_len) else {
        return ERR_BAD_INPUT;
    };
    let secret = match read_opt_str(secret_ptr, secret_len) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let params = match params_from_json(json) {
        Ok(p) => p,
        Err(_) => return ERR_PARSE,
    };
    let Some((mu, _)) = state::handles() else {
        return ERR_NOT_INITIALIZED;
    };

    let id = mu.api_call(params, secret, move |response| {
        emit_callback(request, json!({ "response": response }))
    });
    state::set_result(id);
    0
}

// ── STATE ────────────────────────────────────────────────────────────

/// Read the result buffer left by the last export that produced one.
#[unsafe(no_mangle)]
pub extern "C" fn mu_get_result(out_ptr: *mut u8, max_len: u32) -> u32 {
    let result = state::result().unwrap_or_default();
    write_to_buffer(&result, out_ptr, max_len)
}

/// Write the current session as JSON (`null` when there is none).
#[unsafe(no_mangle)]
pub extern "C" fn mu_get_session(out_ptr: *mut u8, max_len: u32) -> u32 {
    let session = state::handles().and_then(|(mu, _)| mu.current_session());
    let json = serde_json::to_string(&session).unwrap_or_else(|_| "null".to_string());
    write_to_buffer(&json, out_ptr, max_len)
}

// ── TESTS ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mu_core::{decode, parse_handoff_url};

    const INIT: &str = r#"{
        "config": {"api_key": "key123"},
        "page": {"protocol": "https:", "host": "app.test", "href": "https://app.test/"},
        "session": {"session_key": "sk", "secret": "sec", "uid": 5}
    }"#;

    fn init() {
        assert_eq!(mu_init(INIT.as_ptr(), INIT.len() as u32), 0);
        host::take_recorded();
    }

    fn recorded(kind: &str) -> Vec<String> {
        host::take_recorded()
            .into_iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, detail)| detail)
            .collect()
    }

    fn read_result() -> String {
        let mut buf = vec![0u8; 256];
        let n = mu_get_result(buf.as_mut_ptr(), buf.len() as u32);
        String::from_utf8(buf[..n as usize].to_vec()).unwrap()
    }

    #[test]
    fn test_mu_init_valid_config() {
        init();
    }

    #[test]
    fn test_mu_init_invalid_json() {
        let config = b"not json";
        assert_eq!(mu_init(config.as_ptr(), config.len() as u32), ERR_PARSE);
    }

    #[test]
    fn test_mu_init_invalid_utf8() {
        let config: &[u8] = &[0xFF, 0xFE];
        assert_eq!(mu_init(config.as_ptr(), config.len() as u32), ERR_BAD_INPUT);
    }

    #[test]
    fn test_mu_init_rejects_invalid_config() {
        let config = r#"{"config": {"monitor_interval_ms": 0}, "page": {"protocol": "https:", "host": "a"}}"#;
        assert_eq!(mu_init(config.as_ptr(), config.len() as u32), ERR_INVALID);
    }

    #[test]
    fn test_mu_alloc_dealloc() {
        let ptr = mu_alloc(1024);
        assert!(!ptr.is_null());
        unsafe {
            std::ptr::write(ptr, 42u8);
            assert_eq!(std::ptr::read(ptr), 42u8);
        }
        mu_dealloc(ptr, 1024);
    }

    #[test]
    fn test_status_round_trip_emits_callback() {
        init();
        assert_eq!(mu_status(3), 0);

        let iframe = recorded("iframe").pop().unwrap();
        assert!(iframe.starts_with("https://www.facebook.com/extern/login_status.php?"));
        let query = decode(iframe.split_once('?').unwrap().1);
        let (_, handoff) = parse_handoff_url(query.get("ok_session").unwrap()).unwrap();
        let reply = format!(
            "frame={}&cb={}&result=xxRESULTTOKENxx",
            handoff.get("frame").unwrap(),
            handoff.get("cb").unwrap()
        );
        assert_eq!(mu_on_message(reply.as_ptr(), reply.len() as u32), 1);

        let calls = host::take_recorded();
        let event = calls.iter().find(|(k, _)| k == CALLBACK_TOPIC).unwrap();
        let payload: Value = serde_json::from_str(&event.1).unwrap();
        assert_eq!(payload["request"], 3);
        assert!(payload["session"].is_null());

        // The hidden iframe is removed once its grace timer fires.
        let timeout = calls.iter().find(|(k, _)| k == "timeout").unwrap();
        let token: u32 = timeout.1.split(':').next().unwrap().parse().unwrap();
        assert_eq!(mu_on_timer(token), 1);
        assert_eq!(recorded("iframe_remove").len(), 1);
        assert_eq!(mu_on_timer(token), 0);
    }

    #[test]
    fn test_api_round_trip() {
        init();
        let params = r#"{"method": "Users.getInfo", "uids": [1, 2], "fields": null}"#;
        assert_eq!(mu_api(7, params.as_ptr(), params.len() as u32, std::ptr::null(), 0), 0);
        let id = read_result();
        assert!(id.starts_with('f'));

        let script = recorded("script").pop().unwrap();
        assert!(script.starts_with("https://api.facebook.com/restserver.php?"));
        let query = decode(script.split_once('?').unwrap().1);
        assert_eq!(query.get("uids"), Some("[1,2]"));
        assert!(!query.contains_key("fields"));
        assert_eq!(query.get("session_key"), Some("sk"));
        assert!(query.contains_key("sig"));

        let body = r#"{"name": "x"}"#;
        assert_eq!(
            mu_deliver_api_response(id.as_ptr(), id.len() as u32, body.as_ptr(), body.len() as u32),
            1
        );
        let events = recorded(CALLBACK_TOPIC);
        let payload: Value = serde_json::from_str(&events[0]).unwrap();
        assert_eq!(payload["request"], 7);
        assert_eq!(payload["response"]["name"], "x");
    }

    #[test]
    fn test_get_session_writes_json() {
        init();
        let mut buf = vec![0u8; 512];
        let n = mu_get_session(buf.as_mut_ptr(), buf.len() as u32);
        let session: Session = serde_json::from_slice(&buf[..n as usize]).unwrap();
        assert_eq!(session.session_key, "sk");
        assert_eq!(session.uid, "5");
    }

    #[test]
    fn test_publish_rejects_bad_post_json() {
        init();
        let post = b"[not a post";
        assert_eq!(mu_publish(1, post.as_ptr(), post.len() as u32), ERR_PARSE);
    }

    #[test]
    fn test_share_opens_popup() {
        init();
        let title = "Hi";
        assert_eq!(mu_share(std::ptr::null(), 0, title.as_ptr(), title.len() as u32), 0);
        let popup = recorded("popup").pop().unwrap();
        assert!(popup.contains("u=https%3A%2F%2Fapp.test%2F"));
    }

    #[test]
    fn test_params_from_json_flattens_values() {
        let params = params_from_json(r#"{"a": "x", "b": 2, "c": true, "d": null}"#).unwrap();
        assert_eq!(params.get("a"), Some("x"));
        assert_eq!(params.get("b"), Some("2"));
        assert_eq!(params.get("c"), Some("true"));
        assert!(params.contains_key("d"));
        assert_eq!(params.get("d"), None);
    }
}
