//! Address validation, TCP connect and websocket handshake.

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::config::DispatcherConfig;
use crate::error::DispatchError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Whether `wss://` addresses can be served by this build.
const TLS_ENABLED: bool = cfg!(any(
    feature = "native-tls",
    feature = "rustls-tls-native-roots"
));

/// A validated `ws://` or `wss://` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    url: Url,
    /// `host:port` to open the TCP connection to.
    addr: String,
}

impl Endpoint {
    pub(crate) fn parse(address: &str) -> Result<Self, DispatchError> {
        let url = Url::parse(address).map_err(|e| DispatchError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        let default_port = match url.scheme() {
            "ws" => 80,
            "wss" if TLS_ENABLED => 443,
            "wss" => {
                return Err(DispatchError::TlsNotEnabled {
                    address: address.to_string(),
                });
            }
            other => {
                return Err(DispatchError::UnsupportedScheme {
                    scheme: other.to_string(),
                });
            }
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => {
                return Err(DispatchError::InvalidAddress {
                    address: address.to_string(),
                    reason: "missing host".to_string(),
                });
            }
        };
        let port = url.port().unwrap_or(default_port);
        let addr = format!("{}:{}", host, port);

        Ok(Self { url, addr })
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    /// Handshake request carrying the configured Origin and subprotocol.
    pub(crate) fn request(&self, config: &DispatcherConfig) -> Result<Request, DispatchError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(DispatchError::Handshake)?;

        if let Some(origin) = config.origin() {
            request
                .headers_mut()
                .insert("Origin", header_value("Origin", origin)?);
        }
        if let Some(subprotocol) = config.subprotocol() {
            request.headers_mut().insert(
                "Sec-WebSocket-Protocol",
                header_value("Sec-WebSocket-Protocol", subprotocol)?,
            );
        }

        Ok(request)
    }
}

fn header_value(header: &'static str, value: &str) -> Result<HeaderValue, DispatchError> {
    HeaderValue::from_str(value).map_err(|_| DispatchError::InvalidHeader {
        header,
        value: value.to_string(),
    })
}

/// Open a websocket to `endpoint`. Does not apply any timeout itself.
pub(crate) async fn open(
    id: u32,
    endpoint: &Endpoint,
    request: Request,
) -> Result<WsStream, DispatchError> {
    log::info!("[Exchange {}] Connecting TCP to {}", id, endpoint.addr());

    let tcp_stream = TcpStream::connect(endpoint.addr())
        .await
        .map_err(|source| DispatchError::Connect {
            addr: endpoint.addr().to_string(),
            source,
        })?;

    log::info!("[Exchange {}] TCP connected, performing handshake", id);

    #[cfg(any(feature = "native-tls", feature = "rustls-tls-native-roots"))]
    let handshake = tokio_tungstenite::client_async_tls(request, tcp_stream).await;
    #[cfg(not(any(feature = "native-tls", feature = "rustls-tls-native-roots")))]
    let handshake =
        tokio_tungstenite::client_async(request, MaybeTlsStream::Plain(tcp_stream)).await;

    let (stream, response) = handshake.map_err(DispatchError::Handshake)?;

    log::info!(
        "[Exchange {}] Connected successfully (status: {})",
        id,
        response.status()
    );

    Ok(stream)
}
