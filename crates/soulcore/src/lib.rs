//! `soulcore`: the message-processing core of soulmud.
//!
//! Inbound chat messages flow through an unbounded FIFO queue into a
//! single-consumer dispatcher. For each message the dispatcher resolves the
//! acting session (creating or destroying it for the lifecycle commands) and
//! interprets the text against a fixed command grammar: `/start`, `/stop`,
//! `/who`, the bracketed movement and look tokens, room-specific context
//! actions, and a plain chat fallback.
//!
//! All delivery goes through the [`send::Sender`] contract; this crate never
//! performs network I/O itself. The transport that produces [`message::Message`]
//! values and the transport that carries replies live with the embedding
//! binary.

pub mod dispatch;
pub mod message;
pub mod queue;
pub mod rooms;
pub mod send;
pub mod session;

#[cfg(test)]
pub(crate) mod testkit;
