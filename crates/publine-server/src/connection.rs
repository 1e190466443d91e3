//! Per-connection task
//!
//! Requests are read one line at a time and answered in order. Replies and
//! broker notices share one bounded channel drained by a dedicated writer
//! task; a client that stops reading stalls its own read loop once that
//! channel is full.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use publine_core::{Broker, Reply, Session};
use publine_types::{ClientId, Error, Frame, Result};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::ConnectionInfo;

/// How long a closing connection waits for queued replies to flush
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state handed to every connection task
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub broker: Arc<Broker>,
    pub connections: Arc<DashMap<ClientId, ConnectionInfo>>,
    pub max_line_bytes: usize,
    pub write_queue_capacity: usize,
    pub shutdown: watch::Receiver<bool>,
}

pub(crate) async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: ConnectionContext)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let ConnectionContext {
        broker,
        connections,
        max_line_bytes,
        write_queue_capacity,
        mut shutdown,
    } = ctx;

    let (read_half, mut write_half) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::channel::<Frame>(write_queue_capacity);

    let mut session = Session::new(broker, tx.clone(), peer);
    let client_id = session.id();
    connections.insert(
        client_id,
        ConnectionInfo {
            peer,
            connected_at: Utc::now(),
        },
    );
    info!(client_id = %client_id, peer = %peer, "Connection accepted");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = write_half.write_all(frame.encode().as_bytes()).await {
                warn!(client_id = %client_id, error = %e, "Write failed");
                return;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut reader = BufReader::new(read_half);
    let mut line = Vec::with_capacity(256);
    loop {
        line.clear();
        let read = tokio::select! {
            read = read_line(&mut reader, &mut line, max_line_bytes) => read,
            _ = shutdown.changed() => {
                debug!(client_id = %client_id, "Closing connection for shutdown");
                break;
            }
        };

        match read {
            Ok(0) => {
                debug!(client_id = %client_id, "Peer closed connection");
                break;
            }
            Ok(_) => {}
            Err(err @ Error::LineTooLong(_)) => {
                warn!(client_id = %client_id, error = %err, "Rejecting oversized line");
                let _ = tx.send(Reply::failure(&err).frame).await;
                break;
            }
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Read failed");
                break;
            }
        }

        // A dead writer would drop the reply, and a RECV would lose its item.
        if tx.is_closed() {
            debug!(client_id = %client_id, "Writer gone, dropping request");
            break;
        }

        let reply = session.handle_line(&line).await;
        let close = reply.is_close();
        let sent = tokio::select! {
            sent = tx.send(reply.frame) => sent.is_ok(),
            _ = shutdown.changed() => false,
        };
        if !sent || close {
            break;
        }
    }

    session.close().await;
    connections.remove(&client_id);

    // The writer exits once every sender is gone, after flushing what is queued.
    drop(session);
    drop(tx);
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(client_id = %client_id, error = %e, "Writer task failed"),
        Err(_) => {
            warn!(client_id = %client_id, "Peer not reading, dropping queued replies");
            writer.abort();
        }
    }
    debug!(client_id = %client_id, peer = %peer, "Connection closed");
}

/// Read one line of at most `limit` bytes, terminator included. Returns 0 at
/// end of stream.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let read = (&mut *reader)
        .take(limit as u64)
        .read_until(b'\n', buf)
        .await?;
    if read == limit && buf.last() != Some(&b'\n') {
        return Err(Error::LineTooLong(limit));
    }
    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_line_splits_on_newline() {
        let mut input: &[u8] = b"PUBREG\nSUBREG\n";
        let mut buf = Vec::new();

        assert_eq!(read_line(&mut input, &mut buf, 64).await.unwrap(), 7);
        assert_eq!(buf, b"PUBREG\n");

        buf.clear();
        read_line(&mut input, &mut buf, 64).await.unwrap();
        assert_eq!(buf, b"SUBREG\n");

        buf.clear();
        assert_eq!(read_line(&mut input, &mut buf, 64).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_line_accepts_line_at_limit() {
        let mut input: &[u8] = b"OK\n";
        let mut buf = Vec::new();
        assert_eq!(read_line(&mut input, &mut buf, 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_read_line_rejects_one_byte_over_limit() {
        let mut input: &[u8] = b"OKX\n";
        let mut buf = Vec::new();
        assert!(matches!(
            read_line(&mut input, &mut buf, 3).await,
            Err(Error::LineTooLong(3))
        ));
    }

    #[tokio::test]
    async fn test_read_line_rejects_oversized_line() {
        let mut input: &[u8] = b"PUBREG\n";
        let mut buf = Vec::new();
        assert!(matches!(
            read_line(&mut input, &mut buf, 4).await,
            Err(Error::LineTooLong(4))
        ));
    }

    #[tokio::test]
    async fn test_read_line_unterminated_tail() {
        let mut input: &[u8] = b"RECV";
        let mut buf = Vec::new();
        assert_eq!(read_line(&mut input, &mut buf, 64).await.unwrap(), 4);
        assert_eq!(buf, b"RECV");
    }

    #[tokio::test]
    async fn test_pipelined_requests_wait_for_slow_reader() {
        let broker = Arc::new(Broker::with_topics(["default"]).unwrap());
        let (_shutdown_tx, shutdown) = watch::channel(false);
        let ctx = ConnectionContext {
            broker: broker.clone(),
            connections: Arc::new(DashMap::new()),
            max_line_bytes: 1024,
            write_queue_capacity: 2,
            shutdown,
        };
        let (client, server) = tokio::io::duplex(64);
        tokio::spawn(handle_connection(
            server,
            "127.0.0.1:7000".parse().unwrap(),
            ctx,
        ));

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut replies = BufReader::new(client_read);
        let mut line = String::new();

        client_write
            .write_all(b"SUBREG\nSUB {\"topic\":\"default\"}\n")
            .await
            .unwrap();
        for _ in 0..2 {
            line.clear();
            replies.read_line(&mut line).await.unwrap();
            assert_eq!(line, "OK\n");
        }

        for i in 0..100 {
            broker.publish("default", format!("m{i}")).await.unwrap();
        }

        let pipelined = tokio::spawn(async move {
            for _ in 0..100 {
                client_write
                    .write_all(b"RECV {\"topic\":\"default\"}\n")
                    .await
                    .unwrap();
            }
            client_write
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let queued = broker.topic_stats("default").await.unwrap().queued_items;
        assert!(queued > 80, "{} items popped while the client was not reading", 100 - queued);

        for i in 0..100 {
            line.clear();
            replies.read_line(&mut line).await.unwrap();
            assert_eq!(line, format!("RESP {{\"message\":\"m{i}\"}}\n"));
        }
        let _client_write = pipelined.await.unwrap();
        assert_eq!(broker.topic_stats("default").await.unwrap().queued_items, 0);
    }
}
