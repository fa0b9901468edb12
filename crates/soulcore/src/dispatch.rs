use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::message::Message;
use crate::queue::Inbox;
use crate::rooms::{Direction, World};
use crate::send::Sender;
use crate::session::SessionStorage;

pub const CMD_START: &str = "/start";
pub const CMD_STOP: &str = "/stop";
pub const CMD_WHO: &str = "/who";
/// Bracketed look token; the movement tokens live on [`Direction`].
pub const CMD_LOOK: &str = "[look]";

/// Single-consumer command dispatcher.
///
/// Dequeues one message at a time and applies the command table in strict
/// priority order; the first matching rule wins:
///
/// 1. `/start` creates a session (no-op if already active), announces the
///    arrival and performs look;
/// 2. anything else from a user with no active session is silently ignored;
/// 3. `/stop` announces the departure and destroys the session;
/// 4. `/who` replies with the display names of all active sessions;
/// 5. a movement token moves the session through the room graph;
/// 6. the look token describes the current room;
/// 7. the current room may consume the text as a context action;
/// 8. everything else is room chat, broadcast as `"name: text"`.
///
/// Every side effect is delegated to the room graph or the sender; the
/// dispatcher performs no I/O of its own, and collaborator failures are
/// logged without aborting the loop.
pub struct Dispatcher {
    sessions: Arc<SessionStorage>,
    world: Arc<World>,
    sender: Arc<dyn Sender>,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionStorage>,
        world: Arc<World>,
        sender: Arc<dyn Sender>,
    ) -> Dispatcher {
        Dispatcher {
            sessions,
            world,
            sender,
        }
    }

    /// Spawn the dispatch loop as an independent task.
    pub fn spawn(self, inbox: Inbox) -> DispatcherHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(inbox, stop_rx));
        DispatcherHandle {
            stop: stop_tx,
            task: Some(task),
        }
    }

    async fn run(self, mut inbox: Inbox, mut stop: watch::Receiver<bool>) {
        info!("dispatcher running");
        loop {
            let message = tokio::select! {
                biased;
                // Stop requested, or the handle was dropped.
                _ = stop.changed() => break,
                m = inbox.recv() => match m {
                    Some(m) => m,
                    // Every producer is gone; drain is complete.
                    None => break,
                },
            };
            // An in-flight message always runs to completion; the stop
            // signal is only honored between messages.
            self.handle(message).await;
        }
        info!("dispatcher stopped");
    }

    /// Process one message. Failures in collaborators are contained here
    /// so the loop never unwinds.
    pub(crate) async fn handle(&self, message: Message) {
        let user = message.author.id;
        if let Err(e) = self.dispatch(message).await {
            warn!(user = %user, err = %e, "message dispatch failed");
        }
    }

    async fn dispatch(&self, message: Message) -> anyhow::Result<()> {
        let text = message.text.as_str();

        if text.eq_ignore_ascii_case(CMD_START) {
            if self.sessions.is_active(message.author.id) {
                debug!(user = %message.author.id, "re-entrant /start ignored");
                return Ok(());
            }
            let session = self
                .sessions
                .create(message.author.id, &message.author.display_name);
            let arrival = format!("* {} materializes out of thin air", session.display_name());
            self.sender.send_to_room(&session, &arrival).await?;
            return self.world.look(&session, self.sender.as_ref()).await;
        }

        // Not /start and no session: nothing to act on.
        let Some(session) = self.sessions.get(&message) else {
            debug!(user = %message.author.id, "message from inactive user ignored");
            return Ok(());
        };
        session.set_reply_target(message.id);

        if text.eq_ignore_ascii_case(CMD_STOP) {
            let departure = format!("* {} slowly dissolves into the air", session.display_name());
            // The session is destroyed even if the announcement fails.
            let announced = self.sender.send_to_room(&session, &departure).await;
            self.sessions.abandon(session.id());
            return announced;
        }

        if text.eq_ignore_ascii_case(CMD_WHO) {
            let names = self
                .sessions
                .list()
                .iter()
                .map(|s| s.display_name().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return self.sender.reply_to(&session, &names).await;
        }

        if let Some(dir) = Direction::from_token(text) {
            return self.world.go(&session, dir, self.sender.as_ref()).await;
        }

        if text.eq_ignore_ascii_case(CMD_LOOK) {
            return self.world.look(&session, self.sender.as_ref()).await;
        }

        if self
            .world
            .context_action(&session, text, self.sender.as_ref())
            .await?
        {
            return Ok(());
        }

        let chat = format!("{}: {}", session.display_name(), text);
        self.sender.send_to_room(&session, &chat).await
    }
}

/// Owner-side handle to a running dispatcher.
///
/// Stopping is explicit and deterministic: signal, then join. Dropping the
/// handle also stops the loop at its next safe point.
pub struct DispatcherHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl DispatcherHandle {
    /// Signal the loop to stop and wait for it to finish. Idempotent;
    /// calling it again is a no-op.
    pub async fn stop(&mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(err = %e, "dispatcher task failed");
            }
        }
    }

    /// Wait for the loop to exit on its own, once every queue producer is
    /// dropped, without signalling a stop.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(err = %e, "dispatcher task failed");
            }
        }
    }
}
