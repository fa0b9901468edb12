use async_trait::async_trait;

use crate::session::Session;

/// Outbound delivery contract.
///
/// The core only ever names the originating session and the text; how the
/// text reaches users is entirely the implementor's business. In particular,
/// `send_to_room` recipient resolution (which users count as "in the room")
/// belongs to the implementation, not the caller.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Broadcast `text` to the room the session currently occupies.
    async fn send_to_room(&self, session: &Session, text: &str) -> anyhow::Result<()>;

    /// Addressed reply to the session's user, threaded on the session's
    /// last-processed message id.
    async fn reply_to(&self, session: &Session, text: &str) -> anyhow::Result<()>;
}
