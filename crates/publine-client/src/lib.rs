//! Publine Client - blocking-style publisher and subscriber handles
//!
//! Each handle owns one TCP connection, registers its role on connect and
//! then issues one request at a time, waiting for the matching reply.
//!
//! ```no_run
//! # async fn demo() -> Result<(), publine_client::ClientError> {
//! use publine_client::{Publisher, Subscriber};
//!
//! let mut sub = Subscriber::connect("127.0.0.1:3000").await?;
//! sub.subscribe("default").await?;
//!
//! let mut publisher = Publisher::connect("127.0.0.1:3000").await?;
//! publisher.publish("default", "Hello World!").await?;
//!
//! assert_eq!(sub.receive("default").await?, "Hello World!");
//! # Ok(())
//! # }
//! ```

use publine_types::{Command, DecodeError, Frame};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("undecodable reply: {0}")]
    Decode(#[from] DecodeError),

    /// The broker answered with `ERROR`
    #[error("broker error: {0}")]
    Broker(String),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(Command),

    #[error("connection closed by broker")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Line-oriented connection to a broker
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer,
        })
    }

    /// Send a frame and wait for its reply. `ERROR` replies become
    /// [`ClientError::Broker`].
    pub async fn request(&mut self, frame: &Frame) -> Result<Frame> {
        debug!(command = %frame.command, "Sending request");
        self.send_line(&frame.encode()).await?;
        let reply = self.read_frame().await?;
        if reply.command == Command::Error {
            return Err(ClientError::Broker(reply.payload.error.unwrap_or_default()));
        }
        Ok(reply)
    }

    /// Write raw text; a terminator is added when missing
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n").await?;
        }
        Ok(())
    }

    /// Read the next line from the broker
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(ClientError::Closed);
        }
        Ok(Frame::decode(&line)?)
    }

    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

fn expect(reply: Frame, command: Command) -> Result<Frame> {
    if reply.command == command {
        Ok(reply)
    } else {
        Err(ClientError::UnexpectedReply(reply.command))
    }
}

/// Connection registered as a publisher
pub struct Publisher {
    conn: Connection,
}

impl Publisher {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let mut conn = Connection::connect(addr).await?;
        expect(conn.request(&Frame::pubreg()).await?, Command::Ok)?;
        Ok(Self { conn })
    }

    pub async fn publish(&mut self, topic: &str, message: &str) -> Result<()> {
        let reply = self.conn.request(&Frame::publish(topic, message)).await?;
        expect(reply, Command::Ok).map(|_| ())
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await
    }
}

/// Connection registered as a subscriber
pub struct Subscriber {
    conn: Connection,
}

impl Subscriber {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let mut conn = Connection::connect(addr).await?;
        expect(conn.request(&Frame::subreg()).await?, Command::Ok)?;
        Ok(Self { conn })
    }

    pub async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let reply = self.conn.request(&Frame::subscribe(topic)).await?;
        expect(reply, Command::Ok).map(|_| ())
    }

    pub async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        let reply = self.conn.request(&Frame::unsubscribe(topic)).await?;
        expect(reply, Command::Ok).map(|_| ())
    }

    /// Pop the oldest queued message on `topic`
    pub async fn receive(&mut self, topic: &str) -> Result<String> {
        let reply = expect(
            self.conn.request(&Frame::receive(topic)).await?,
            Command::Resp,
        )?;
        Ok(reply.payload.message.unwrap_or_default())
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one connection and answer each request line with the next
    /// canned reply.
    async fn scripted_broker(replies: Vec<&'static str>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            for reply in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    return;
                }
                write_half.write_all(reply.as_bytes()).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_subscriber_round_trip() {
        let addr = scripted_broker(vec![
            "OK\n",
            "OK\n",
            "RESP {\"message\":\"Hello World!\"}\n",
            "ERROR {\"error\":\"no items in the queue\"}\n",
        ])
        .await;

        let mut sub = Subscriber::connect(addr).await.unwrap();
        sub.subscribe("default").await.unwrap();
        assert_eq!(sub.receive("default").await.unwrap(), "Hello World!");

        let err = sub.receive("default").await.unwrap_err();
        assert!(matches!(err, ClientError::Broker(msg) if msg == "no items in the queue"));
    }

    #[tokio::test]
    async fn test_registration_error() {
        let addr = scripted_broker(vec!["ERROR {\"error\":\"nope\"}\n"]).await;
        let err = Publisher::connect(addr).await.err().unwrap();
        assert!(matches!(err, ClientError::Broker(msg) if msg == "nope"));
    }

    #[tokio::test]
    async fn test_unexpected_reply() {
        let addr = scripted_broker(vec!["OK\n", "RESP {\"message\":\"?\"}\n"]).await;
        let mut publisher = Publisher::connect(addr).await.unwrap();
        let err = publisher.publish("default", "x").await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedReply(Command::Resp)));
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let addr = scripted_broker(vec!["OK\n"]).await;
        let mut publisher = Publisher::connect(addr).await.unwrap();
        let err = publisher.publish("default", "x").await.unwrap_err();
        assert!(matches!(err, ClientError::Closed | ClientError::Io(_)));
    }
}
