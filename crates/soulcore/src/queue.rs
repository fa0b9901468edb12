use tokio::sync::mpsc;
use tracing::warn;

use crate::message::Message;

/// Create the inbound message queue: a cloneable producer handle and the
/// single consumer half.
pub fn message_queue() -> (MessageQueue, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MessageQueue { tx }, Inbox { rx })
}

/// Producer side of the inbound queue.
///
/// Cheap to clone and safe to use from any number of tasks. Arrival order
/// is preserved across producers: whatever order `enqueue` calls complete
/// in is the order the consumer sees.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    tx: mpsc::UnboundedSender<Message>,
}

impl MessageQueue {
    /// Append one message at the tail. Never blocks.
    ///
    /// Once the consumer is gone the message is dropped with a warning;
    /// producers may legitimately outlive the dispatcher during shutdown.
    pub fn enqueue(&self, message: Message) {
        if let Err(e) = self.tx.send(message) {
            warn!(message_id = %e.0.id, "queue closed, dropping message");
        }
    }
}

/// Consumer half of the inbound queue. The design assumes exactly one
/// consumer; ordering is not promised across several simultaneous ones.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Inbox {
    /// Wait for the next message. Suspends while the queue is empty and
    /// returns `None` once every producer handle is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Non-blocking dequeue; `None` when the queue is currently empty.
    pub fn try_next(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::msg;

    #[tokio::test]
    async fn preserves_arrival_order_across_producers() {
        let (q, mut inbox) = message_queue();
        let q2 = q.clone();

        q.enqueue(msg(1, "Alice", "a", 1));
        q2.enqueue(msg(2, "Bob", "b", 2));
        q.enqueue(msg(1, "Alice", "c", 3));

        assert_eq!(inbox.recv().await.expect("a").text, "a");
        assert_eq!(inbox.recv().await.expect("b").text, "b");
        assert_eq!(inbox.recv().await.expect("c").text, "c");
    }

    #[tokio::test]
    async fn try_next_reports_empty() {
        let (q, mut inbox) = message_queue();
        assert!(inbox.try_next().is_none());

        q.enqueue(msg(1, "Alice", "a", 1));
        assert_eq!(inbox.try_next().expect("a").text, "a");
        assert!(inbox.try_next().is_none());
    }

    #[tokio::test]
    async fn recv_drains_then_closes_when_producers_gone() {
        let (q, mut inbox) = message_queue();
        q.enqueue(msg(1, "Alice", "a", 1));
        drop(q);

        assert_eq!(inbox.recv().await.expect("a").text, "a");
        assert!(inbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn enqueue_after_consumer_drop_is_harmless() {
        let (q, inbox) = message_queue();
        drop(inbox);
        q.enqueue(msg(1, "Alice", "a", 1));
    }
}
