use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Deserialize;

use crate::send::Sender;
use crate::session::Session;

/// Identity of a room in the navigation graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four navigation commands. A room has at most one neighbor per
/// direction; the graph has no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }

    /// The chat token that triggers movement in this direction.
    pub fn token(self) -> &'static str {
        match self {
            Direction::North => "[north]",
            Direction::South => "[south]",
            Direction::East => "[east]",
            Direction::West => "[west]",
        }
    }

    /// Match one of the bracketed movement tokens, case-insensitively.
    pub fn from_token(text: &str) -> Option<Direction> {
        Self::ALL
            .into_iter()
            .find(|d| text.eq_ignore_ascii_case(d.token()))
    }

    fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
        }
    }
}

/// Behavior contract every room satisfies.
///
/// A room reference held by a session always resolves to a live room;
/// [`World::from_defs`] enforces that at construction time, so nothing here
/// needs to handle a dangling neighbor.
#[async_trait]
pub trait Room: Send + Sync {
    fn id(&self) -> &RoomId;

    fn title(&self) -> &str;

    /// Neighbor in `dir`, if the room has an exit that way.
    fn neighbor(&self, dir: Direction) -> Option<&RoomId>;

    /// Describe the room to the session (addressed, not a broadcast).
    async fn look(&self, session: &Session, sender: &dyn Sender) -> anyhow::Result<()>;

    /// Offer `text` to the room as a room-specific command.
    ///
    /// Returns true when the room consumed the text, whether or not it did
    /// anything meaningful with it.
    async fn process_context_action(
        &self,
        session: &Session,
        text: &str,
        sender: &dyn Sender,
    ) -> anyhow::Result<bool>;
}

/// Declarative room description, as found in a world data file.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomDef {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub exits: ExitDefs,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExitDefs {
    #[serde(default)]
    pub north: Option<String>,
    #[serde(default)]
    pub south: Option<String>,
    #[serde(default)]
    pub east: Option<String>,
    #[serde(default)]
    pub west: Option<String>,
}

impl ExitDefs {
    fn get(&self, dir: Direction) -> Option<&String> {
        match dir {
            Direction::North => self.north.as_ref(),
            Direction::South => self.south.as_ref(),
            Direction::East => self.east.as_ref(),
            Direction::West => self.west.as_ref(),
        }
    }
}

/// A room-specific command. The trigger is matched case-insensitively
/// against the whole message text; `reply` answers the acting player and
/// `announce` (with `{name}` expanded) goes to the room.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDef {
    pub trigger: String,
    pub reply: String,
    #[serde(default)]
    pub announce: Option<String>,
}

/// Data-driven [`Room`]: a description, up to four exits, and a table of
/// context actions.
#[derive(Debug)]
pub struct ScriptedRoom {
    id: RoomId,
    title: String,
    description: String,
    exits: [Option<RoomId>; 4],
    actions: Vec<ActionDef>,
}

impl ScriptedRoom {
    pub fn from_def(def: RoomDef) -> Self {
        let mut exits: [Option<RoomId>; 4] = [None, None, None, None];
        for dir in Direction::ALL {
            exits[dir.index()] = def.exits.get(dir).map(RoomId::new);
        }
        Self {
            id: RoomId::new(def.id),
            title: def.title,
            description: def.description,
            exits,
            actions: def.actions,
        }
    }

    fn exits_line(&self) -> String {
        let dirs: Vec<&str> = Direction::ALL
            .into_iter()
            .filter(|d| self.exits[d.index()].is_some())
            .map(Direction::as_str)
            .collect();
        if dirs.is_empty() {
            "exits: none".to_string()
        } else {
            format!("exits: {}", dirs.join(", "))
        }
    }
}

#[async_trait]
impl Room for ScriptedRoom {
    fn id(&self) -> &RoomId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn neighbor(&self, dir: Direction) -> Option<&RoomId> {
        self.exits[dir.index()].as_ref()
    }

    async fn look(&self, session: &Session, sender: &dyn Sender) -> anyhow::Result<()> {
        let text = format!("{}\n{}\n{}", self.title, self.description, self.exits_line());
        sender.reply_to(session, &text).await
    }

    async fn process_context_action(
        &self,
        session: &Session,
        text: &str,
        sender: &dyn Sender,
    ) -> anyhow::Result<bool> {
        for action in &self.actions {
            if action.trigger.eq_ignore_ascii_case(text) {
                sender.reply_to(session, &action.reply).await?;
                if let Some(line) = &action.announce {
                    let line = line.replace("{name}", session.display_name());
                    sender.send_to_room(session, &line).await?;
                }
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Top-level shape of a world data file.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldDef {
    pub start: String,
    pub rooms: Vec<RoomDef>,
}

/// The navigation graph. States are rooms, transitions are the four
/// directional commands; the graph lives for the process lifetime.
pub struct World {
    start: RoomId,
    rooms: BTreeMap<RoomId, Arc<dyn Room>>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("start", &self.start)
            .field("rooms", &self.rooms.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl World {
    /// Build a world from declarative room defs.
    ///
    /// Fails when the start room is missing, a room id repeats, or an exit
    /// points at a room that does not exist. Sessions must never hold an
    /// unresolvable room reference, so bad worlds are rejected outright.
    pub fn from_defs(start: &str, defs: Vec<RoomDef>) -> anyhow::Result<World> {
        let mut rooms: BTreeMap<RoomId, Arc<dyn Room>> = BTreeMap::new();
        for def in defs {
            let id = RoomId::new(def.id.clone());
            if rooms
                .insert(id.clone(), Arc::new(ScriptedRoom::from_def(def)))
                .is_some()
            {
                bail!("duplicate room id {id}");
            }
        }

        let start = RoomId::new(start);
        if !rooms.contains_key(&start) {
            bail!("start room {start} is not defined");
        }
        for room in rooms.values() {
            for dir in Direction::ALL {
                if let Some(n) = room.neighbor(dir) {
                    if !rooms.contains_key(n) {
                        bail!(
                            "room {} has a {} exit to unknown room {n}",
                            room.id(),
                            dir.as_str()
                        );
                    }
                }
            }
        }

        Ok(World { start, rooms })
    }

    /// Parse a JSON world file and build the graph from it.
    pub fn from_json(text: &str) -> anyhow::Result<World> {
        let def: WorldDef = serde_json::from_str(text).context("parse world definition")?;
        World::from_defs(&def.start, def.rooms)
    }

    /// Where newly created sessions begin.
    pub fn start_room(&self) -> &RoomId {
        &self.start
    }

    pub fn room(&self, id: &RoomId) -> Option<Arc<dyn Room>> {
        self.rooms.get(id).cloned()
    }

    fn current(&self, session: &Session) -> anyhow::Result<Arc<dyn Room>> {
        let id = session.room();
        self.room(&id)
            .with_context(|| format!("session {} is in unknown room {id}", session.id()))
    }

    /// Perform look in the session's current room.
    pub async fn look(&self, session: &Session, sender: &dyn Sender) -> anyhow::Result<()> {
        self.current(session)?.look(session, sender).await
    }

    /// Move the session one room in `dir`.
    ///
    /// With no exit that way the session stays put and gets an addressed
    /// notice. Otherwise: departure announcement to the old room, rebind,
    /// arrival announcement to the new room, then look for the mover.
    pub async fn go(
        &self,
        session: &Session,
        dir: Direction,
        sender: &dyn Sender,
    ) -> anyhow::Result<()> {
        let here = self.current(session)?;
        let Some(next_id) = here.neighbor(dir) else {
            let notice = format!("no exit to the {}.", dir.as_str());
            return sender.reply_to(session, &notice).await;
        };
        let next = self
            .room(next_id)
            .with_context(|| format!("exit {} of {} is dangling", dir.as_str(), here.id()))?;

        let name = session.display_name();
        sender
            .send_to_room(session, &format!("* {name} goes {}", dir.as_str()))
            .await?;
        session.set_room(next.id().clone());
        sender
            .send_to_room(session, &format!("* {name} arrives"))
            .await?;
        next.look(session, sender).await
    }

    /// Offer `text` to the session's current room as a context action.
    pub async fn context_action(
        &self,
        session: &Session,
        text: &str,
        sender: &dyn Sender,
    ) -> anyhow::Result<bool> {
        self.current(session)?
            .process_context_action(session, text, sender)
            .await
    }
}
