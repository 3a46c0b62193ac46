//! Per-agent connection with a bounded outbound send buffer.
//!
//! Bounded queue, no silent drops: a saturated buffer is an error the
//! caller must handle, and a slow agent never blocks the router.

use std::sync::Mutex;
use tokio::sync::mpsc;

use skiff_core::constants::SEND_BUFFER_DEPTH_MAX;
use skiff_core::{Error, Result};

/// One live agent connection.
///
/// All outbound traffic goes through the bounded queue; exactly one write
/// loop drains the receiver half onto the wire and closes the socket when
/// the queue closes. There is no direct write API.
pub struct AgentConnection {
    agent_id: String,
    connection_id: String,
    /// None after close; the mutex serializes enqueue against close
    tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl AgentConnection {
    /// Create a connection with the default buffer depth.
    ///
    /// Returns the connection and the receiver half for the write loop.
    pub fn new(
        agent_id: impl Into<String>,
        connection_id: impl Into<String>,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        Self::with_depth(agent_id, connection_id, SEND_BUFFER_DEPTH_MAX)
    }

    /// Create a connection with an explicit buffer depth (tests)
    pub fn with_depth(
        agent_id: impl Into<String>,
        connection_id: impl Into<String>,
        depth: usize,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        debug_assert!(depth > 0, "send buffer depth must be positive");

        let (tx, rx) = mpsc::channel(depth);
        (
            Self {
                agent_id: agent_id.into(),
                connection_id: connection_id.into(),
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Enqueue an outbound frame without blocking.
    ///
    /// Fails with `SendBufferFull` when the buffer is saturated and
    /// `ConnectionClosed` after [`close`](Self::close).
    pub fn send(&self, message: Vec<u8>) -> Result<()> {
        let guard = self.tx.lock().expect("connection lock poisoned");
        let tx = guard.as_ref().ok_or_else(|| Error::ConnectionClosed {
            agent_id: self.agent_id.clone(),
        })?;

        tx.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => Error::SendBufferFull {
                agent_id: self.agent_id.clone(),
                depth: tx.max_capacity(),
            },
            mpsc::error::TrySendError::Closed(_) => Error::ConnectionClosed {
                agent_id: self.agent_id.clone(),
            },
        })
    }

    /// Close the outbound queue. Idempotent.
    ///
    /// Dropping the sender ends the write loop, which closes the
    /// underlying socket; the read loop then observes EOF and unregisters.
    pub fn close(&self) {
        let mut guard = self.tx.lock().expect("connection lock poisoned");
        guard.take();
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.tx.lock().expect("connection lock poisoned").is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_drain() {
        let (conn, mut rx) = AgentConnection::with_depth("a1", "c1", 4);

        conn.send(b"one".to_vec()).unwrap();
        conn.send(b"two".to_vec()).unwrap();

        assert_eq!(rx.try_recv().unwrap(), b"one");
        assert_eq!(rx.try_recv().unwrap(), b"two");
    }

    #[test]
    fn test_send_full_buffer() {
        let (conn, mut rx) = AgentConnection::with_depth("a1", "c1", 2);

        conn.send(b"1".to_vec()).unwrap();
        conn.send(b"2".to_vec()).unwrap();

        let err = conn.send(b"3".to_vec()).unwrap_err();
        assert!(matches!(err, Error::SendBufferFull { depth: 2, .. }));

        // Draining one message makes room for exactly one new send.
        rx.try_recv().unwrap();
        conn.send(b"3".to_vec()).unwrap();
        assert!(conn.send(b"4".to_vec()).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (conn, _rx) = AgentConnection::with_depth("a1", "c1", 2);

        assert!(!conn.is_closed());
        conn.close();
        conn.close();
        assert!(conn.is_closed());
    }

    #[test]
    fn test_send_after_close_fails() {
        let (conn, _rx) = AgentConnection::with_depth("a1", "c1", 2);
        conn.close();

        let err = conn.send(b"late".to_vec()).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed { .. }));
    }

    #[test]
    fn test_close_ends_the_write_loop_side() {
        let (conn, mut rx) = AgentConnection::with_depth("a1", "c1", 2);
        conn.send(b"last".to_vec()).unwrap();
        conn.close();

        // Buffered frame still drains, then the channel reports closed.
        assert_eq!(rx.try_recv().unwrap(), b"last");
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
