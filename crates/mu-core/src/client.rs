//! The application-facing client.
//!
//! [`Mu`] owns the current session, the request signer and the cross-domain
//! protocol, and turns each public operation into a remote page URL plus the
//! handoff(s) that bring its answer back. Callbacks hold only weak references
//! to the client, so dropping the last `Mu` handle quietly abandons anything
//! still pending.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::MuConfig;
use crate::error::MuResult;
use crate::host::{Host, ScriptHandle};
use crate::ids::IdGenerator;
use crate::query::{encode, Params};
use crate::registry::CallbackRegistry;
use crate::session::Session;
use crate::sign::RequestSigner;
use crate::xd::{Relation, XdProtocol};

const LOGIN_POPUP: (u32, u32) = (450, 415);
const SHARE_POPUP: (u32, u32) = (575, 380);
const PUBLISH_POPUP: (u32, u32) = (550, 242);
const ADD_RELATION_POPUP: (u32, u32) = (565, 240);

/// REST error codes meaning the session the call was signed with is no good.
const SESSION_INVALID: u64 = 102;
const SIGNATURE_INVALID: u64 = 104;

/// Permission whose grant refreshes the session before the caller hears about it.
const OFFLINE_ACCESS: &str = "offline_access";

/// Receives the new session and the granted permissions of a session handoff.
type SessionCallback = Box<dyn FnOnce(Option<Session>, Option<String>)>;

/// A stream post for [`Mu::publish`]. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    pub message: Option<String>,
    pub attachment: Option<Value>,
    pub action_links: Option<Value>,
    pub target_id: Option<String>,
    pub user_message_prompt: Option<String>,
}

/// One user callback shared by several handoffs, of which at most one fires.
struct SharedOnce<F>(Rc<RefCell<Option<F>>>);

impl<F> SharedOnce<F> {
    fn new(callback: F) -> Self {
        Self(Rc::new(RefCell::new(Some(callback))))
    }

    fn take(&self) -> Option<F> {
        self.0.borrow_mut().take()
    }
}

impl<F> Clone for SharedOnce<F> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

struct Inner {
    host: Rc<dyn Host>,
    config: MuConfig,
    www_base: String,
    api_base: String,
    xd: Rc<XdProtocol>,
    session: RefCell<Option<Session>>,
    signer: RefCell<RequestSigner>,
    ids: RefCell<IdGenerator>,
    api_calls: RefCell<CallbackRegistry<Value>>,
    scripts: RefCell<HashMap<String, Box<dyn ScriptHandle>>>,
}

/// Connect client. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Mu {
    inner: Rc<Inner>,
}

impl Mu {
    /// Validate `config`, pick a transport and start listening for handoffs.
    pub fn init(host: Rc<dyn Host>, config: MuConfig, session: Option<Session>) -> MuResult<Self> {
        config.validate()?;

        let page = host.page();
        let mut ids = IdGenerator::new(host.random_seed());
        let xd = XdProtocol::init(host.clone(), &config, &ids.next_id())?;
        let signer = RequestSigner::new(config.api_key.clone(), config.api_version.clone());

        info!(
            api_key = config.api_key.as_deref().unwrap_or("-"),
            has_session = session.is_some(),
            "mu client initialized"
        );

        Ok(Self {
            inner: Rc::new(Inner {
                www_base: config.www_base(&page.protocol),
                api_base: config.api_base(&page.protocol),
                host,
                config,
                xd,
                session: RefCell::new(session),
                signer: RefCell::new(signer),
                ids: RefCell::new(ids),
                api_calls: RefCell::new(CallbackRegistry::new()),
                scripts: RefCell::new(HashMap::new()),
            }),
        })
    }

    pub fn current_session(&self) -> Option<Session> {
        self.inner.session.borrow().clone()
    }

    pub fn config(&self) -> &MuConfig {
        &self.inner.config
    }

    pub fn xd(&self) -> &Rc<XdProtocol> {
        &self.inner.xd
    }

    /// Ask the service for the current session in a hidden iframe.
    pub fn status<F>(&self, cb: F)
    where
        F: FnOnce(Option<Session>) + 'static,
    {
        let g = self.next_id();
        let xd_url = self.session_handoff(Box::new(move |session, _| cb(session)), &g, Relation::Parent, None);

        let mut params = Params::new();
        params
            .set_opt("api_key", self.api_key())
            .set("no_session", xd_url.clone())
            .set("no_user", xd_url.clone())
            .set("ok_session", xd_url);

        let url = self.dialog_url("extern/login_status.php", &params);
        self.inner.xd.spawn_hidden_iframe(&url, &g);
    }

    /// Log in (or request more permissions) in a popup.
    ///
    /// `cb` receives the new session and granted permissions, or on cancel
    /// the unchanged current session and no permissions.
    pub fn login<F>(&self, perms: Option<&str>, cb: F)
    where
        F: FnOnce(Option<Session>, Option<String>) + 'static,
    {
        let g = self.next_id();
        let shared = SharedOnce::new(cb);

        let cancel_url = {
            let shared = shared.clone();
            let weak = self.weak();
            self.inner.xd.mint_result(
                move |result| {
                    let session = weak.upgrade().and_then(|inner| inner.session.borrow().clone());
                    if let Some(cb) = shared.take() {
                        cb(session, result);
                    }
                },
                &g,
                Relation::Opener,
                None,
            )
        };
        let next_id = self.next_id();
        let next = self.session_handoff(
            Box::new(move |session, perms| {
                if let Some(cb) = shared.take() {
                    cb(session, perms);
                }
            }),
            &g,
            Relation::Opener,
            Some(&next_id),
        );

        let mut params = Params::new();
        params
            .set_opt("api_key", self.api_key())
            .set("cancel_url", cancel_url)
            .set("display", "popup")
            .set("fbconnect", "1")
            .set("next", next)
            .set_opt("req_perms", perms)
            .set("return_session", "1")
            .set("v", self.inner.config.api_version.as_str());

        let url = self.dialog_url("login.php", &params);
        let (width, height) = LOGIN_POPUP;
        self.inner.xd.spawn_popup(&url, width, height, Some(&g));
    }

    /// Log out in a hidden iframe. `cb` receives whatever session the
    /// service hands back, normally none.
    pub fn logout<F>(&self, cb: F)
    where
        F: FnOnce(Option<Session>) + 'static,
    {
        let g = self.next_id();
        let next = self.session_handoff(Box::new(move |session, _| cb(session)), &g, Relation::Parent, None);

        let mut params = Params::new();
        params
            .set_opt("api_key", self.api_key())
            .set("next", next)
            .set_opt("session_key", self.session_key());

        let url = self.dialog_url("logout.php", &params);
        self.inner.xd.spawn_hidden_iframe(&url, &g);
    }

    /// Revoke the application's authorization, then drop the session.
    pub fn disconnect<F>(&self, cb: F)
    where
        F: FnOnce(Option<Session>) + 'static,
    {
        let weak = self.weak();
        let mut params = Params::new();
        params.set("method", "Auth.revokeAuthorization");
        self.api_call(params, None, move |_| {
            if let Some(inner) = weak.upgrade() {
                *inner.session.borrow_mut() = None;
            }
            cb(None)
        });
    }

    /// Open the share dialog for `url`, defaulting to the current page.
    pub fn share(&self, url: Option<&str>, title: Option<&str>) {
        let page = self.inner.host.page();
        let mut params = Params::new();
        params
            .set_opt("title", title)
            .set("u", url.unwrap_or(&page.href));

        let url = self.dialog_url("sharer.php", &params);
        let (width, height) = SHARE_POPUP;
        self.inner.xd.spawn_popup(&url, width, height, None);
    }

    /// Open the publish dialog. `cb` receives the new post id, or none if the
    /// user skipped. Without an API key the dialog still opens but `cb` is
    /// never called.
    pub fn publish<F>(&self, post: &Post, cb: F)
    where
        F: FnOnce(Option<String>) + 'static,
    {
        let g = self.api_key().map(|_| self.next_id());
        let callback = g
            .as_deref()
            .map(|g| self.inner.xd.mint_result(cb, g, Relation::Opener, None));
        if g.is_none() {
            debug!("publishing without an api key, no callback");
        }

        let mut params = Params::new();
        params
            .set("action_links", json_or_empty(post.action_links.as_ref()))
            .set_opt("api_key", self.api_key())
            .set("attachment", json_or_empty(post.attachment.as_ref()))
            .set_opt("callback", callback)
            .set_opt("message", post.message.as_deref())
            .set("preview", "1")
            .set_opt("session_key", self.session_key())
            .set_opt("target_id", post.target_id.as_deref())
            .set_opt("user_message_prompt", post.user_message_prompt.as_deref());

        let url = self.dialog_url("connect/prompt_feed.php", &params);
        let (width, height) = PUBLISH_POPUP;
        self.inner.xd.spawn_popup(&url, width, height, g.as_deref());
    }

    /// Prompt the user to add `id` as a friend. `cb` receives the dialog's result.
    pub fn add_relation<F>(&self, id: &str, cb: F)
    where
        F: FnOnce(Option<String>) + 'static,
    {
        let g = self.next_id();
        let next = self.inner.xd.mint_result(cb, &g, Relation::Opener, None);

        let mut params = Params::new();
        params
            .set_opt("api_key", self.api_key())
            .set("display", "dialog")
            .set("id", id)
            .set("next", next)
            .set_opt("session_key", self.session_key());

        let url = self.dialog_url("addfriend.php", &params);
        let (width, height) = ADD_RELATION_POPUP;
        self.inner.xd.spawn_popup(&url, width, height, Some(&g));
    }

    /// Issue a signed REST call through script injection and return its id.
    ///
    /// The response script calls back into [`deliver_api_response`](Self::deliver_api_response)
    /// with that id. Calls are signed with `secret` when given, else with the
    /// current session's secret, else left unsigned.
    pub fn api_call<F>(&self, params: Params, secret: Option<&str>, cb: F) -> String
    where
        F: FnOnce(Value) + 'static,
    {
        let g = self.next_id();
        let mut request = Params::new();
        request.set("callback", format!("{}{}", self.inner.config.jsonp_callback_prefix, g));
        request.merge_defaults(&params);

        let session = self.current_session();
        let now = self.inner.host.now_ms();
        self.inner
            .signer
            .borrow_mut()
            .sign(&mut request, secret, session.as_ref(), now);

        let url = format!("{}restserver.php?{}", self.inner.api_base, encode(&request));
        self.inner
            .api_calls
            .borrow_mut()
            .register(g.clone(), None, Box::new(cb));
        let script = self.inner.host.inject_script(&url);
        self.inner.scripts.borrow_mut().insert(g.clone(), script);

        debug!(id = %g, method = params.get("method").unwrap_or("-"), "api call issued");
        g
    }

    /// Hand a REST response to the call it answers. Returns false if no call
    /// with that id is pending.
    pub fn deliver_api_response(&self, id: &str, response: Value) -> bool {
        let Some(cb) = self.inner.api_calls.borrow_mut().take(id) else {
            debug!(id, "dropping response for unknown api call");
            return false;
        };
        let script = self.inner.scripts.borrow_mut().remove(id);
        if let Some(script) = script {
            script.remove();
        }

        if let Some(code) = error_code(&response) {
            if code == SESSION_INVALID || code == SIGNATURE_INVALID {
                warn!(code, "api rejected the session, clearing it");
                *self.inner.session.borrow_mut() = None;
            } else {
                debug!(id, code, "api call returned an error");
            }
        }

        cb(response);
        true
    }

    pub fn pending_api_calls(&self) -> usize {
        self.inner.api_calls.borrow().len()
    }

    /// Mint a session handoff that replaces the current session before `cb`
    /// runs. A grant that includes offline access triggers a status refresh
    /// first, so `cb` sees the long-lived session.
    fn session_handoff(
        &self,
        cb: SessionCallback,
        surface_id: &str,
        relation: Relation,
        callback_id: Option<&str>,
    ) -> String {
        let weak = self.weak();
        self.inner.xd.mint_session(
            move |session, perms| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let mu = Mu { inner };
                *mu.inner.session.borrow_mut() = session;

                match perms {
                    Some(perms) if perms.contains(OFFLINE_ACCESS) => {
                        debug!("offline access granted, refreshing session");
                        mu.status(move |session| cb(session, Some(perms)));
                    }
                    perms => cb(mu.current_session(), perms),
                }
            },
            surface_id,
            relation,
            callback_id,
        )
    }

    fn dialog_url(&self, path: &str, params: &Params) -> String {
        format!("{}{}?{}", self.inner.www_base, path, encode(params))
    }

    fn next_id(&self) -> String {
        self.inner.ids.borrow_mut().next_id()
    }

    fn api_key(&self) -> Option<String> {
        self.inner.config.api_key.clone()
    }

    fn session_key(&self) -> Option<String> {
        self.inner
            .session
            .borrow()
            .as_ref()
            .map(|s| s.session_key.clone())
    }

    fn weak(&self) -> Weak<Inner> {
        Rc::downgrade(&self.inner)
    }
}

fn json_or_empty(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "{}".to_string(),
        Some(value) => value.to_string(),
    }
}

fn error_code(response: &Value) -> Option<u64> {
    let code = response.get("error_code")?;
    code.as_u64()
        .or_else(|| code.as_str().and_then(|s| s.parse().ok()))
}
