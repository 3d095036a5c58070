//! Proxy listener and supervisor.

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::pair::ConnectionPair;
use memdproxy_script::ScriptHost;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// The proxy: accepts frontend connections and spawns one connection pair
/// per accept.
pub struct Proxy {
    config: ProxyConfig,
    script: Arc<ScriptHost>,
    listener: TcpListener,
    cancel: CancellationToken,
    next_cid: AtomicU64,
}

impl Proxy {
    /// Binds the listen socket.
    ///
    /// Split from [`Proxy::run`] so callers can bind port 0 and discover
    /// the assigned port via [`Proxy::local_addr`].
    pub async fn bind(config: ProxyConfig, script: ScriptHost) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(("0.0.0.0", config.listen_port)).await?;
        Ok(Self {
            config,
            script: Arc::new(script),
            listener,
            cancel: CancellationToken::new(),
            next_cid: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.listener.local_addr()?)
    }

    /// Requests shutdown: the accept loop stops and every connection pair
    /// observes cancellation and drains.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the accept loop until shutdown.
    ///
    /// Each accepted connection gets its own task, script engine, and child
    /// cancellation token; a slow script on one connection never blocks
    /// accepts. Accept errors other than those caused by shutdown are fatal.
    pub async fn run(&self) -> Result<(), ProxyError> {
        tracing::info!(
            addr = %self.listener.local_addr()?,
            script = self.script.name(),
            "listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("shutting down");
                    break;
                }
                result = self.listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            if self.cancel.is_cancelled() {
                                break;
                            }
                            tracing::error!(error = %e, "accept failed");
                            return Err(e.into());
                        }
                    };
                    let cid = self.next_cid.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::info!(cid, peer = %peer, "client connected");

                    let script = self.script.clone();
                    let config = self.config.clone();
                    let cancel = self.cancel.child_token();
                    tokio::spawn(async move {
                        let engine = match script.instantiate() {
                            Ok(engine) => engine,
                            Err(e) => {
                                tracing::error!(cid, error = %e, "failed to instantiate script");
                                return;
                            }
                        };
                        let pair = ConnectionPair::new(cid, config, engine, cancel);
                        match pair.run(stream).await {
                            Ok(()) => tracing::info!(cid, "client disconnected"),
                            Err(e) => tracing::warn!(cid, error = %e, "connection terminated"),
                        }
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use memdproxy_protocol::{command, feature, split_tcp, Magic, Packet};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    fn get_request(key: &str) -> Packet {
        Packet {
            magic: Magic::Request,
            opcode: command::GET,
            vbucket: 3,
            opaque: 0x2a,
            key: Bytes::copy_from_slice(key.as_bytes()),
            ..Packet::default()
        }
    }

    fn not_found_response(opaque: u32) -> Packet {
        Packet {
            magic: Magic::Response,
            opcode: command::GET,
            status: 0x0001,
            opaque,
            ..Packet::default()
        }
    }

    /// Starts a proxy on an ephemeral port in front of a fixture backend
    /// listener, returning the running proxy, its address, and the backend
    /// listener for the test to accept on.
    async fn start_proxy(script: &str) -> (Arc<Proxy>, SocketAddr, TcpListener) {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend.local_addr().unwrap();
        let config = ProxyConfig::new()
            .with_backend(backend_addr.ip().to_string(), backend_addr.port())
            .with_listen_port(0);
        let host = ScriptHost::load("test.lua", script).unwrap();
        let proxy = Arc::new(Proxy::bind(config, host).await.unwrap());
        let addr = SocketAddr::from(([127, 0, 0, 1], proxy.local_addr().unwrap().port()));
        let runner = proxy.clone();
        tokio::spawn(async move {
            let _ = runner.run().await;
        });
        (proxy, addr, backend)
    }

    async fn read_with_timeout<R>(
        reader: &mut memdproxy_protocol::MemdReader<R>,
    ) -> Packet
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        timeout(Duration::from_secs(5), reader.read_packet())
            .await
            .expect("timed out waiting for packet")
            .expect("read failed")
    }

    #[tokio::test]
    async fn test_passthrough_roundtrip() {
        let (proxy, addr, backend) = start_proxy("").await;

        let fe = TcpStream::connect(addr).await.unwrap();
        let (mut fe_reader, mut fe_writer) = split_tcp(fe);
        let (be_stream, _) = backend.accept().await.unwrap();
        let (mut be_reader, mut be_writer) = split_tcp(be_stream);

        let request = get_request("x");
        fe_writer.write_packet(&request).await.unwrap();
        let seen = read_with_timeout(&mut be_reader).await;
        assert_eq!(seen, request);

        let response = not_found_response(request.opaque);
        be_writer.write_packet(&response).await.unwrap();
        let seen = read_with_timeout(&mut fe_reader).await;
        assert_eq!(seen, response);

        proxy.shutdown();
    }

    #[tokio::test]
    async fn test_rewrite_key() {
        let script = r#"
            function GET(p)
                p.Key = stringToBytes("y")
                forward(p)
            end
        "#;
        let (proxy, addr, backend) = start_proxy(script).await;

        let fe = TcpStream::connect(addr).await.unwrap();
        let (_fe_reader, mut fe_writer) = split_tcp(fe);
        let (be_stream, _) = backend.accept().await.unwrap();
        let (mut be_reader, _be_writer) = split_tcp(be_stream);

        fe_writer.write_packet(&get_request("x")).await.unwrap();
        let seen = read_with_timeout(&mut be_reader).await;
        assert_eq!(seen.key, Bytes::from_static(b"y"));
        assert_eq!(seen.opaque, 0x2a);

        proxy.shutdown();
    }

    #[tokio::test]
    async fn test_synthesized_reply_short_circuits_backend() {
        let script = r#"
            function GET(p)
                reply({ Magic = 0x81, Command = 0x00, Datatype = 0, Status = 0x0001,
                        Opaque = p.Opaque, Value = stringToBytes("nope") })
            end
        "#;
        let (proxy, addr, backend) = start_proxy(script).await;

        let fe = TcpStream::connect(addr).await.unwrap();
        let (mut fe_reader, mut fe_writer) = split_tcp(fe);
        let (be_stream, _) = backend.accept().await.unwrap();
        let (mut be_reader, _be_writer) = split_tcp(be_stream);

        fe_writer.write_packet(&get_request("x")).await.unwrap();
        let seen = read_with_timeout(&mut fe_reader).await;
        assert_eq!(seen.magic, Magic::Response);
        assert_eq!(seen.status, 0x0001);
        assert_eq!(seen.opaque, 0x2a);
        assert_eq!(seen.value, Bytes::from_static(b"nope"));

        // The backend must see nothing.
        let quiet = timeout(Duration::from_millis(200), be_reader.read_packet()).await;
        assert!(quiet.is_err(), "backend unexpectedly received a packet");

        proxy.shutdown();
    }

    #[tokio::test]
    async fn test_drop_handler_keeps_connection_open() {
        let script = "function NOOP(p) end";
        let (proxy, addr, backend) = start_proxy(script).await;

        let fe = TcpStream::connect(addr).await.unwrap();
        let (_fe_reader, mut fe_writer) = split_tcp(fe);
        let (be_stream, _) = backend.accept().await.unwrap();
        let (mut be_reader, _be_writer) = split_tcp(be_stream);

        let noop = Packet {
            magic: Magic::Request,
            opcode: command::NOOP,
            ..Packet::default()
        };
        fe_writer.write_packet(&noop).await.unwrap();
        let quiet = timeout(Duration::from_millis(200), be_reader.read_packet()).await;
        assert!(quiet.is_err(), "dropped packet reached the backend");

        // The pair is still alive: an unhandled opcode still flows through.
        let request = get_request("alive");
        fe_writer.write_packet(&request).await.unwrap();
        let seen = read_with_timeout(&mut be_reader).await;
        assert_eq!(seen, request);

        proxy.shutdown();
    }

    #[tokio::test]
    async fn test_helo_negotiation_enables_collections_framing() {
        let (proxy, addr, backend) = start_proxy("").await;

        let fe = TcpStream::connect(addr).await.unwrap();
        let (mut fe_reader, mut fe_writer) = split_tcp(fe);
        let (be_stream, _) = backend.accept().await.unwrap();
        let (mut be_reader, mut be_writer) = split_tcp(be_stream);

        let helo_request = Packet {
            magic: Magic::Request,
            opcode: command::HELO,
            key: Bytes::from_static(b"test-agent"),
            value: Bytes::from_static(&[0x00, 0x07, 0x00, 0x12]),
            ..Packet::default()
        };
        fe_writer.write_packet(&helo_request).await.unwrap();
        let seen = read_with_timeout(&mut be_reader).await;
        assert_eq!(seen, helo_request);

        let helo_response = Packet {
            magic: Magic::Response,
            opcode: command::HELO,
            value: Bytes::from_static(&[0x00, 0x07, 0x00, 0x12]),
            ..Packet::default()
        };
        be_writer.write_packet(&helo_response).await.unwrap();
        let seen = read_with_timeout(&mut fe_reader).await;
        assert_eq!(seen.value, helo_response.value);

        // Both proxy codecs negotiated COLLECTIONS before the response
        // reached us, so collection-framed keys now survive the trip.
        fe_writer.enable_feature(feature::COLLECTIONS);
        be_reader.enable_feature(feature::COLLECTIONS);
        let request = Packet {
            collection_id: 9,
            ..get_request("x")
        };
        fe_writer.write_packet(&request).await.unwrap();
        let seen = read_with_timeout(&mut be_reader).await;
        assert_eq!(seen.collection_id, 9);
        assert_eq!(seen.key, Bytes::from_static(b"x"));

        proxy.shutdown();
    }

    #[tokio::test]
    async fn test_backend_loss_terminates_pair_but_not_listener() {
        let (proxy, addr, backend) = start_proxy("").await;

        let fe = TcpStream::connect(addr).await.unwrap();
        let (mut fe_reader, _fe_writer) = split_tcp(fe);
        let (be_stream, _) = backend.accept().await.unwrap();
        drop(be_stream);

        let result = timeout(Duration::from_secs(5), fe_reader.read_packet())
            .await
            .expect("pair did not terminate after backend loss");
        assert!(result.unwrap_err().is_disconnect());

        // The listener still accepts.
        let fe2 = TcpStream::connect(addr).await.unwrap();
        let (be2, _) = timeout(Duration::from_secs(5), backend.accept())
            .await
            .expect("listener stopped accepting")
            .unwrap();
        drop(fe2);
        drop(be2);

        proxy.shutdown();
    }

    #[tokio::test]
    async fn test_unreachable_backend_closes_frontend() {
        // Grab a port that nothing listens on.
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = unused.local_addr().unwrap();
        drop(unused);

        let config = ProxyConfig::new()
            .with_backend(dead_addr.ip().to_string(), dead_addr.port())
            .with_listen_port(0);
        let host = ScriptHost::load("test.lua", "").unwrap();
        let proxy = Arc::new(Proxy::bind(config, host).await.unwrap());
        let addr = SocketAddr::from(([127, 0, 0, 1], proxy.local_addr().unwrap().port()));
        let runner = proxy.clone();
        tokio::spawn(async move {
            let _ = runner.run().await;
        });

        let fe = TcpStream::connect(addr).await.unwrap();
        let (mut fe_reader, _fe_writer) = split_tcp(fe);
        let result = timeout(Duration::from_secs(5), fe_reader.read_packet())
            .await
            .expect("frontend was not closed after failed backend dial");
        assert!(result.unwrap_err().is_disconnect());

        proxy.shutdown();
    }

    #[tokio::test]
    async fn test_script_error_does_not_kill_connection() {
        let script = r#"
            function GET(p)
                error("handler exploded")
            end
        "#;
        let (proxy, addr, backend) = start_proxy(script).await;

        let fe = TcpStream::connect(addr).await.unwrap();
        let (mut fe_reader, mut fe_writer) = split_tcp(fe);
        let (be_stream, _) = backend.accept().await.unwrap();
        let (mut be_reader, mut be_writer) = split_tcp(be_stream);

        // The failing handler drops the packet but the pair survives.
        fe_writer.write_packet(&get_request("boom")).await.unwrap();
        let quiet = timeout(Duration::from_millis(200), be_reader.read_packet()).await;
        assert!(quiet.is_err());

        // Traffic the script does not handle still flows both ways.
        let noop = Packet {
            magic: Magic::Request,
            opcode: command::NOOP,
            opaque: 5,
            ..Packet::default()
        };
        fe_writer.write_packet(&noop).await.unwrap();
        let seen = read_with_timeout(&mut be_reader).await;
        assert_eq!(seen, noop);

        let response = Packet {
            magic: Magic::Response,
            opcode: command::NOOP,
            opaque: 5,
            ..Packet::default()
        };
        be_writer.write_packet(&response).await.unwrap();
        let seen = read_with_timeout(&mut fe_reader).await;
        assert_eq!(seen, response);

        proxy.shutdown();
    }
}
