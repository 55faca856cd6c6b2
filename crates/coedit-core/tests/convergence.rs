//! Two-peer convergence through a minimal ordering authority.

use chrono::{DateTime, Utc};
use coedit_core::{
    apply, transform, ChannelError, DocumentId, EngineConfig, InboundMessage, Operation,
    OutboundChannel, OutboundMessage, Session, UserId,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Default)]
struct Outbox(Rc<RefCell<Vec<OutboundMessage>>>);

impl OutboundChannel for Outbox {
    fn send(&mut self, message: OutboundMessage) -> Result<(), ChannelError> {
        self.0.borrow_mut().push(message);
        Ok(())
    }
}

impl Outbox {
    fn take_operations(&self) -> Vec<Operation> {
        self.0
            .borrow_mut()
            .drain(..)
            .filter_map(|m| match m {
                OutboundMessage::TextOperation { operation, .. } => Some(operation),
                _ => None,
            })
            .collect()
    }
}

struct Peer {
    name: &'static str,
    session: Session<Outbox>,
    outbox: Outbox,
    /// Server history entries this peer has received or produced.
    seen: usize,
    /// `seen` at the time of the in-flight local edit.
    based_on: usize,
}

impl Peer {
    fn edit(&mut self, text: &str) {
        self.based_on = self.seen;
        self.session.local_edit(text).unwrap();
    }
}

/// Sequences operations into one history, transforming each submission
/// against history entries its author had not seen.
struct Relay {
    content: String,
    history: Vec<(&'static str, Operation)>,
}

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_704_067_200_000).unwrap()
}

fn peer(name: &'static str, content: &str) -> Peer {
    let outbox = Outbox::default();
    let mut session = Session::new(
        DocumentId::new("shared"),
        UserId::new(name),
        content,
        outbox.clone(),
        &EngineConfig::default(),
    );
    session.connect().unwrap();
    session.on_connected().unwrap();
    session.join_document().unwrap();
    session.handle(
        InboundMessage::DocumentJoined {
            content: content.to_string(),
            active_users: vec![],
        },
        &mut (),
        now(),
    );
    outbox.0.borrow_mut().clear();
    Peer {
        name,
        session,
        outbox,
        seen: 0,
        based_on: 0,
    }
}

impl Relay {
    fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            history: Vec::new(),
        }
    }

    /// Sequence `author`'s in-flight operation.
    fn submit(&mut self, author: &mut Peer) {
        let ops = author.outbox.take_operations();
        assert_eq!(ops.len(), 1, "one in-flight operation per peer");

        let concurrent = self.history[author.based_on..]
            .iter()
            .filter(|(name, _)| *name != author.name)
            .map(|(_, op)| op);
        let mut op = Some(ops[0].clone());
        for prior in concurrent {
            op = op.and_then(|o| transform(&o, prior));
        }

        if let Some(op) = op {
            self.content = apply(&self.content, &op).unwrap();
            self.history.push((author.name, op));
        }
        author.session.handle(InboundMessage::OperationAck, &mut (), now());
    }

    /// Deliver every history entry `peer` has not seen yet.
    fn deliver(&self, peer: &mut Peer) {
        while peer.seen < self.history.len() {
            let (name, op) = &self.history[peer.seen];
            if *name != peer.name {
                peer.session.handle(
                    InboundMessage::TextOperation {
                        operation: op.clone(),
                    },
                    &mut (),
                    now(),
                );
                while peer.session.drain_next(&mut ()) {}
            }
            peer.seen += 1;
        }
    }
}

#[test]
fn concurrent_inserts_converge() {
    let mut relay = Relay::new("Hello");
    let mut a = peer("a", "Hello");
    let mut b = peer("b", "Hello");

    a.edit("Hello World");
    b.edit("Hi Hello");

    // A's operation is sequenced first.
    relay.submit(&mut a);
    relay.deliver(&mut b);
    relay.submit(&mut b);
    relay.deliver(&mut a);
    relay.deliver(&mut b);

    assert_eq!(relay.content, "Hi Hello World");
    assert_eq!(a.session.content(), "Hi Hello World");
    assert_eq!(b.session.content(), "Hi Hello World");
    assert_eq!(b.session.sequencer().unacknowledged(), 0);
}

#[test]
fn same_position_inserts_converge() {
    let mut relay = Relay::new("ab");
    let mut a = peer("a", "ab");
    let mut b = peer("b", "ab");

    a.edit("Xab");
    b.edit("Yab");

    relay.submit(&mut a);
    relay.deliver(&mut b);
    relay.submit(&mut b);
    relay.deliver(&mut a);
    relay.deliver(&mut b);

    assert_eq!(relay.content, "XYab");
    assert_eq!(a.session.content(), relay.content);
    assert_eq!(b.session.content(), relay.content);
}

#[test]
fn concurrent_delete_and_insert_converge() {
    let mut relay = Relay::new("the quick brown fox");
    let mut a = peer("a", "the quick brown fox");
    let mut b = peer("b", "the quick brown fox");

    // A removes "quick " while B extends "brown".
    a.edit("the brown fox");
    b.edit("the quick browner fox");

    relay.submit(&mut b);
    relay.deliver(&mut a);
    relay.submit(&mut a);
    relay.deliver(&mut b);
    relay.deliver(&mut a);

    assert_eq!(relay.content, "the browner fox");
    assert_eq!(a.session.content(), relay.content);
    assert_eq!(b.session.content(), relay.content);
}

#[test]
fn sequential_edits_round_trip() {
    let mut relay = Relay::new("");
    let mut a = peer("a", "");
    let mut b = peer("b", "");

    for (who, text) in [
        ("a", "# Notes"),
        ("b", "# Notes\n- milk"),
        ("a", "# Notes\n- milk\n- eggs"),
        ("b", "# Shopping\n- milk\n- eggs"),
    ] {
        let (author, other) = if who == "a" {
            (&mut a, &mut b)
        } else {
            (&mut b, &mut a)
        };
        author.edit(text);
        relay.submit(author);
        relay.deliver(author);
        relay.deliver(other);
    }

    assert_eq!(relay.content, "# Shopping\n- milk\n- eggs");
    assert_eq!(a.session.content(), relay.content);
    assert_eq!(b.session.content(), relay.content);
}
