use std::fmt;

use tracing::debug;
use zeromq::{DealerSocket, ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::error::{Result, TransportError};

/// The socket patterns kernelmux uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPattern {
    /// Request/reply initiator (control, shell, stdin, heartbeat).
    Req,
    /// Subscribe receiver (iopub). Receive-only.
    Sub,
    /// Asynchronous bidirectional peer (the outward issuer connection).
    Dealer,
}

impl fmt::Display for SocketPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketPattern::Req => "req",
            SocketPattern::Sub => "sub",
            SocketPattern::Dealer => "dealer",
        };
        f.write_str(name)
    }
}

/// One connected messaging endpoint.
///
/// Owns the underlying socket for the endpoint's entire life: opened by
/// [`Endpoint::connect`], used for send/receive, closed exactly once by
/// [`Endpoint::close`].
pub enum Endpoint {
    Req(ReqSocket),
    Sub(SubSocket),
    Dealer(DealerSocket),
}

impl Endpoint {
    /// Connect to `addr` (e.g. `tcp://127.0.0.1:5555`) with the requested
    /// socket pattern.
    ///
    /// Sub endpoints subscribe to everything before returning, so no
    /// broadcast published after connect is filtered out. There is no
    /// retry: a failure here is fatal to the caller.
    pub async fn connect(addr: &str, pattern: SocketPattern) -> Result<Self> {
        let endpoint = match pattern {
            SocketPattern::Req => {
                let mut socket = ReqSocket::new();
                socket.connect(addr).await.map_err(|source| {
                    TransportError::Connect {
                        addr: addr.to_owned(),
                        source,
                    }
                })?;
                Endpoint::Req(socket)
            }
            SocketPattern::Sub => {
                let mut socket = SubSocket::new();
                socket.connect(addr).await.map_err(|source| {
                    TransportError::Connect {
                        addr: addr.to_owned(),
                        source,
                    }
                })?;
                socket.subscribe("").await.map_err(|source| {
                    TransportError::Subscribe {
                        addr: addr.to_owned(),
                        source,
                    }
                })?;
                Endpoint::Sub(socket)
            }
            SocketPattern::Dealer => {
                let mut socket = DealerSocket::new();
                socket.connect(addr).await.map_err(|source| {
                    TransportError::Connect {
                        addr: addr.to_owned(),
                        source,
                    }
                })?;
                Endpoint::Dealer(socket)
            }
        };
        debug!(%addr, %pattern, "endpoint connected");
        Ok(endpoint)
    }

    /// The pattern this endpoint was opened with.
    pub fn pattern(&self) -> SocketPattern {
        match self {
            Endpoint::Req(_) => SocketPattern::Req,
            Endpoint::Sub(_) => SocketPattern::Sub,
            Endpoint::Dealer(_) => SocketPattern::Dealer,
        }
    }

    /// Receive one complete multipart message.
    ///
    /// Blocks indefinitely; the caller is responsible for racing this
    /// against its cancellation signal.
    pub async fn recv(&mut self) -> Result<ZmqMessage> {
        let result = match self {
            Endpoint::Req(socket) => socket.recv().await,
            Endpoint::Sub(socket) => socket.recv().await,
            Endpoint::Dealer(socket) => socket.recv().await,
        };
        result.map_err(TransportError::Recv)
    }

    /// Send one complete multipart message atomically.
    ///
    /// Fails with [`TransportError::Unsupported`] on subscribe endpoints,
    /// which are receive-only.
    pub async fn send(&mut self, message: ZmqMessage) -> Result<()> {
        match self {
            Endpoint::Req(socket) => socket.send(message).await.map_err(TransportError::Send),
            Endpoint::Dealer(socket) => socket.send(message).await.map_err(TransportError::Send),
            Endpoint::Sub(_) => Err(TransportError::Unsupported {
                pattern: SocketPattern::Sub,
                op: "send",
            }),
        }
    }

    /// Close the endpoint, releasing the underlying socket.
    pub async fn close(self) {
        match self {
            Endpoint::Req(socket) => {
                socket.close().await;
            }
            Endpoint::Sub(socket) => {
                socket.close().await;
            }
            Endpoint::Dealer(socket) => {
                socket.close().await;
            }
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("pattern", &self.pattern())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use zeromq::{PubSocket, RepSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

    use super::*;

    async fn bind_rep() -> (RepSocket, String) {
        let mut socket = RepSocket::new();
        let bound = socket
            .bind("tcp://127.0.0.1:0")
            .await
            .expect("rep should bind");
        (socket, bound.to_string())
    }

    #[tokio::test]
    async fn req_endpoint_round_trips_multipart() {
        let (mut rep, addr) = bind_rep().await;

        let echo = tokio::spawn(async move {
            let request = rep.recv().await.expect("rep should receive");
            rep.send(request).await.expect("rep should reply");
        });

        let mut endpoint = Endpoint::connect(&addr, SocketPattern::Req)
            .await
            .expect("req should connect");
        assert_eq!(endpoint.pattern(), SocketPattern::Req);

        let mut message = ZmqMessage::from("ping");
        message.push_back(Bytes::from_static(b"payload"));
        endpoint.send(message).await.expect("req should send");

        let reply = endpoint.recv().await.expect("req should receive reply");
        let frames = reply.into_vec();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), b"ping");
        assert_eq!(frames[1].as_ref(), b"payload");

        echo.await.expect("echo task should finish");
        endpoint.close().await;
    }

    #[tokio::test]
    async fn sub_endpoint_receives_broadcasts() {
        let mut publisher = PubSocket::new();
        let bound = publisher
            .bind("tcp://127.0.0.1:0")
            .await
            .expect("pub should bind");

        let mut endpoint = Endpoint::connect(&bound.to_string(), SocketPattern::Sub)
            .await
            .expect("sub should connect");

        // Give the subscription time to propagate to the publisher.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        publisher
            .send(ZmqMessage::from("broadcast"))
            .await
            .expect("pub should send");

        let received = endpoint.recv().await.expect("sub should receive");
        assert_eq!(received.get(0).expect("one frame").as_ref(), b"broadcast");

        endpoint.close().await;
        publisher.close().await;
    }

    #[tokio::test]
    async fn sub_endpoint_rejects_send() {
        let mut publisher = PubSocket::new();
        let bound = publisher
            .bind("tcp://127.0.0.1:0")
            .await
            .expect("pub should bind");

        let mut endpoint = Endpoint::connect(&bound.to_string(), SocketPattern::Sub)
            .await
            .expect("sub should connect");

        let err = endpoint
            .send(ZmqMessage::from("nope"))
            .await
            .expect_err("send on sub should fail");
        assert!(matches!(err, TransportError::Unsupported { op: "send", .. }));

        endpoint.close().await;
        publisher.close().await;
    }

    #[tokio::test]
    async fn connect_failure_names_the_address() {
        // Nothing listens on this address and ZMQ connects lazily, so use a
        // malformed address to force an immediate error.
        let err = Endpoint::connect("bogus://nowhere", SocketPattern::Req)
            .await
            .expect_err("malformed address should fail");
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(err.to_string().contains("bogus://nowhere"));
    }
}
