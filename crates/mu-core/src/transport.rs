//! Cross-document transport selection.
//!
//! Exactly one transport is active per client. Both turn an inbound payload
//! into decoded [`Params`] and hand it to the same delivery function, so the
//! protocol layer never knows which one carried a message.

use std::fmt;
use std::rc::Rc;

use crate::error::{MuError, MuResult};
use crate::host::Host;
use crate::query::{decode, unescape_component, Params};

/// Receives decoded messages from the active transport.
pub type Delivery = Rc<dyn Fn(Params)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Native cross-document messaging.
    PostMessage,
    /// Embedded bridge object polyfilling cross-document messaging.
    Fallback,
}

impl TransportKind {
    /// Name carried in handoff URLs so the proxy page knows how to reply.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::PostMessage => "postmessage",
            TransportKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transport able to carry handoff replies back into this page.
pub trait Transport {
    fn kind(&self) -> TransportKind;

    /// Start routing inbound messages for `target` to `deliver`.
    fn install(&self, host: &dyn Host, target: &str, deliver: Delivery);
}

pub struct PostMessageTransport;

impl Transport for PostMessageTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::PostMessage
    }

    fn install(&self, host: &dyn Host, _target: &str, deliver: Delivery) {
        host.listen_messages(Rc::new(move |payload: String| deliver(decode(&payload))));
    }
}

pub struct BridgeTransport;

impl Transport for BridgeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Fallback
    }

    fn install(&self, host: &dyn Host, target: &str, deliver: Delivery) {
        // The bridge escapes the whole payload once more on the way in.
        host.embed_bridge(
            target,
            Rc::new(move |payload: String| deliver(decode(&unescape_component(&payload)))),
        );
    }
}

/// Pick the best available transport, native messaging first.
pub fn select_transport(host: &dyn Host) -> MuResult<Box<dyn Transport>> {
    if host.supports_post_message() {
        Ok(Box::new(PostMessageTransport))
    } else if host.supports_bridge() {
        Ok(Box::new(BridgeTransport))
    } else {
        Err(MuError::TransportUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;
    use std::cell::RefCell;

    fn capture() -> (Rc<RefCell<Vec<Params>>>, Delivery) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, Rc::new(move |p: Params| sink.borrow_mut().push(p)))
    }

    #[test]
    fn test_prefers_post_message() {
        let host = FakeHost::with_transports(true, true);
        assert_eq!(select_transport(&host).unwrap().kind(), TransportKind::PostMessage);
    }

    #[test]
    fn test_falls_back_to_bridge() {
        let host = FakeHost::with_transports(false, true);
        assert_eq!(select_transport(&host).unwrap().kind(), TransportKind::Fallback);
    }

    #[test]
    fn test_no_transport_is_fatal() {
        let host = FakeHost::with_transports(false, false);
        assert!(matches!(
            select_transport(&host),
            Err(MuError::TransportUnavailable)
        ));
    }

    #[test]
    fn test_post_message_decodes_payload() {
        let host = FakeHost::new();
        let (seen, deliver) = capture();
        PostMessageTransport.install(&host, "http://app/f1", deliver);

        host.deliver_message("cb=f1&frame=f1&result=ok%20go");
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("result"), Some("ok go"));
    }

    #[test]
    fn test_bridge_unwraps_extra_escaping() {
        let host = FakeHost::with_transports(false, true);
        let (seen, deliver) = capture();
        BridgeTransport.install(&host, "http://app/f9", deliver);
        assert_eq!(host.bridge_target().as_deref(), Some("http://app/f9"));

        host.deliver_bridge_message("cb%3Df1%26frame%3Df1%26result%3Dok%2520go");
        let seen = seen.borrow();
        assert_eq!(seen[0].get("cb"), Some("f1"));
        assert_eq!(seen[0].get("result"), Some("ok go"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(TransportKind::PostMessage.to_string(), "postmessage");
        assert_eq!(TransportKind::Fallback.as_str(), "fallback");
    }
}
