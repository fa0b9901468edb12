//! TCP line gateway: the in-process stand-ins for the remote-chat poller
//! and sender collaborators.
//!
//! Each connection is one chat user. The first line names the player; every
//! following non-empty line becomes one inbound message. Outbound delivery
//! resolves room membership against the session table and writes to the
//! matching connections through per-connection write channels.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use soulcore::dispatch::CMD_STOP;
use soulcore::message::{Author, Message, MessageId, UserId};
use soulcore::queue::MessageQueue;
use soulcore::send::Sender;
use soulcore::session::{Session, SessionStorage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, info};

const MOTD: &[u8] = b"soulmud\r\nname: ";

#[derive(Debug)]
struct ConnHandle {
    write_tx: tokio::sync::mpsc::Sender<Bytes>,
}

type ConnMap = Arc<Mutex<HashMap<UserId, ConnHandle>>>;

/// Accept-side of the gateway: turns connections into message producers.
#[derive(Debug)]
pub struct Gateway {
    sessions: Arc<SessionStorage>,
    queue: MessageQueue,
    conns: ConnMap,
    next_message_id: AtomicI64,
}

impl Gateway {
    pub fn new(sessions: Arc<SessionStorage>, queue: MessageQueue) -> Gateway {
        Gateway {
            sessions,
            queue,
            conns: Arc::new(Mutex::new(HashMap::new())),
            next_message_id: AtomicI64::new(1),
        }
    }

    /// The outbound side of this gateway, for the dispatcher.
    pub fn line_sender(&self) -> LineSender {
        LineSender {
            sessions: self.sessions.clone(),
            conns: self.conns.clone(),
        }
    }

    fn next_message_id(&self) -> MessageId {
        MessageId(self.next_message_id.fetch_add(1, Ordering::Relaxed))
    }

    pub async fn handle_conn(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> anyhow::Result<()> {
        let (rd, mut wr) = stream.into_split();
        let mut rd = BufReader::new(rd);

        let (write_tx, mut write_rx) = tokio::sync::mpsc::channel::<Bytes>(128);
        let writer = tokio::spawn(async move {
            while let Some(b) = write_rx.recv().await {
                if wr.write_all(&b[..]).await.is_err() {
                    break;
                }
            }
        });

        write_tx.send(Bytes::from_static(MOTD)).await.ok();

        let mut line = String::new();
        rd.read_line(&mut line).await.context("read name")?;
        let name = line.trim().to_string();
        if name.is_empty() {
            write_tx
                .send(Bytes::from_static(b"a name is required, bye\r\n"))
                .await
                .ok();
            drop(write_tx);
            let _ = writer.await;
            return Ok(());
        }

        let user = user_id_for(&name);
        let replaced = self
            .conns
            .lock()
            .expect("conns lock poisoned")
            .insert(
                user,
                ConnHandle {
                    write_tx: write_tx.clone(),
                },
            )
            .is_some();
        if replaced {
            debug!(user = %user, name = %name, "existing connection replaced");
        }
        info!(peer = %peer, user = %user, name = %name, "player connected");

        write_tx
            .send(Bytes::from(format!(
                "hello {name}. send /start to enter the world.\r\n"
            )))
            .await
            .ok();

        let author = Author {
            id: user,
            display_name: name,
        };
        let read_result = self.read_loop(&mut rd, &author).await;

        // Only tear down if this connection still owns delivery; a
        // reconnect for the same name may have taken over already.
        let ours = {
            let mut conns = self.conns.lock().expect("conns lock poisoned");
            let ours = conns
                .get(&user)
                .is_some_and(|c| c.write_tx.same_channel(&write_tx));
            if ours {
                conns.remove(&user);
            }
            ours
        };
        if ours {
            self.queue.enqueue(Message {
                author,
                text: CMD_STOP.to_string(),
                id: self.next_message_id(),
            });
        }

        drop(write_tx);
        let _ = writer.await;
        info!(peer = %peer, user = %user, "player disconnected");
        read_result
    }

    async fn read_loop(
        &self,
        rd: &mut BufReader<OwnedReadHalf>,
        author: &Author,
    ) -> anyhow::Result<()> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = rd.read_line(&mut line).await.context("read line")?;
            if n == 0 {
                return Ok(());
            }
            let text = line.trim().to_string();
            if text.is_empty() {
                continue;
            }
            self.queue.enqueue(Message {
                author: author.clone(),
                text,
                id: self.next_message_id(),
            });
        }
    }
}

/// Stable numeric id for a display name, so a returning player keeps their
/// session identity across connections.
fn user_id_for(name: &str) -> UserId {
    let mut h = DefaultHasher::new();
    name.to_ascii_lowercase().hash(&mut h);
    UserId((h.finish() >> 1) as i64)
}

/// Delivers dispatcher output over the live connections.
///
/// Room broadcast recipients are all active sessions currently in the
/// originating session's room; an addressed reply goes only to its target
/// user. Output for users without a live connection is dropped.
#[derive(Debug)]
pub struct LineSender {
    sessions: Arc<SessionStorage>,
    conns: ConnMap,
}

impl LineSender {
    fn write_tx_for(&self, user: UserId) -> Option<tokio::sync::mpsc::Sender<Bytes>> {
        self.conns
            .lock()
            .expect("conns lock poisoned")
            .get(&user)
            .map(|c| c.write_tx.clone())
    }

    async fn write_line(&self, user: UserId, text: &str) {
        let Some(tx) = self.write_tx_for(user) else {
            debug!(user = %user, "no live connection, output dropped");
            return;
        };
        let mut b = text.replace('\n', "\r\n").into_bytes();
        b.extend_from_slice(b"\r\n");
        if tx.send(Bytes::from(b)).await.is_err() {
            debug!(user = %user, "write channel closed, output dropped");
        }
    }
}

#[async_trait]
impl Sender for LineSender {
    async fn send_to_room(&self, session: &Session, text: &str) -> anyhow::Result<()> {
        let room = session.room();
        for s in self.sessions.list() {
            if s.room() == room {
                self.write_line(s.id(), text).await;
            }
        }
        Ok(())
    }

    async fn reply_to(&self, session: &Session, text: &str) -> anyhow::Result<()> {
        self.write_line(session.id(), text).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use soulcore::dispatch::Dispatcher;
    use soulcore::queue::message_queue;
    use soulcore::rooms::World;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn user_ids_are_stable_and_case_insensitive() {
        assert_eq!(user_id_for("Alice"), user_id_for("alice"));
        assert_ne!(user_id_for("alice"), user_id_for("bob"));
        assert!(user_id_for("alice").0 >= 0);
    }

    #[tokio::test]
    async fn end_to_end_over_tcp() {
        let world = Arc::new(World::from_json(crate::DEFAULT_WORLD).expect("default world"));
        let sessions = Arc::new(SessionStorage::new(world.start_room().clone()));
        let (queue, inbox) = message_queue();
        let gateway = Arc::new(Gateway::new(sessions.clone(), queue));
        let sender = Arc::new(gateway.line_sender());
        let mut dispatcher = Dispatcher::new(sessions, world, sender).spawn(inbox);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.expect("accept");
            let _ = gateway.handle_conn(stream, peer).await;
        });

        let mut client = TcpStream::connect(addr).await.expect("connect");
        client
            .write_all(b"alice\r\n/start\r\n[look]\r\n")
            .await
            .expect("write");

        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            let mut seen = String::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = client.read(&mut buf).await.expect("read");
                assert!(n > 0, "connection closed early");
                seen.push_str(&String::from_utf8_lossy(&buf[..n]));
                if seen.contains("materializes out of thin air") && seen.contains("Town Gate") {
                    return seen;
                }
            }
        })
        .await
        .expect("expected output within 5s");

        assert!(seen.contains("name: "));
        assert!(seen.contains("Town Gate"));

        drop(client);
        let _ = server.await;
        dispatcher.stop().await;
    }
}
