//! Shared unit-test helpers: message builders, a recording sender, and a
//! small fixed world.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::message::{Author, Message, MessageId, UserId};
use crate::rooms::{ActionDef, ExitDefs, RoomDef, RoomId, World};
use crate::send::Sender;
use crate::session::Session;

pub(crate) fn msg(user: i64, name: &str, text: &str, id: i64) -> Message {
    Message {
        author: Author {
            id: UserId(user),
            display_name: name.to_string(),
        },
        text: text.to_string(),
        id: MessageId(id),
    }
}

pub(crate) fn room_def(id: &str, title: &str) -> RoomDef {
    RoomDef {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("you are in {title}."),
        exits: ExitDefs::default(),
        actions: Vec::new(),
    }
}

/// Three rooms: gate -north- square -east- tavern, with a context action
/// on the gate.
pub(crate) fn demo_world() -> World {
    let mut gate = room_def("gate", "Town Gate");
    gate.exits.north = Some("square".to_string());
    gate.actions.push(ActionDef {
        trigger: "read sign".to_string(),
        reply: "the sign says: abandon all idle chatter.".to_string(),
        announce: Some("* {name} squints at the sign".to_string()),
    });

    let mut square = room_def("square", "Market Square");
    square.exits.south = Some("gate".to_string());
    square.exits.east = Some("tavern".to_string());

    let mut tavern = room_def("tavern", "The Hollow Flagon");
    tavern.exits.west = Some("square".to_string());

    World::from_defs("gate", vec![gate, square, tavern]).expect("demo world is valid")
}

/// What a [`RecordingSender`] delivered.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sent {
    Room {
        from: UserId,
        room: RoomId,
        text: String,
    },
    Reply {
        to: UserId,
        target: Option<MessageId>,
        text: String,
    },
}

impl Sent {
    pub(crate) fn text(&self) -> &str {
        match self {
            Sent::Room { text, .. } | Sent::Reply { text, .. } => text,
        }
    }
}

/// Sender stub that records outbound traffic instead of delivering it.
/// Room membership and reply targets are captured at call time.
#[derive(Debug, Default)]
pub(crate) struct RecordingSender {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingSender {
    /// Drain everything recorded so far.
    pub(crate) fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().expect("recording lock"))
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send_to_room(&self, session: &Session, text: &str) -> anyhow::Result<()> {
        self.sent.lock().expect("recording lock").push(Sent::Room {
            from: session.id(),
            room: session.room(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn reply_to(&self, session: &Session, text: &str) -> anyhow::Result<()> {
        self.sent.lock().expect("recording lock").push(Sent::Reply {
            to: session.id(),
            target: session.reply_target(),
            text: text.to_string(),
        });
        Ok(())
    }
}
