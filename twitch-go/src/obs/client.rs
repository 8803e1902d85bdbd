//! obs-websocket client issuing one request per connection.

use crate::error::{Error, Result};
use crate::obs::protocol::{
    self, Hello, Identified, Identify, Incoming, Outgoing, RequestResponse, StreamStatus,
};
use crate::obs::{BroadcastController, BroadcastStatus};
use crate::settings::ObsConnection;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::instrument;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Talks to OBS over obs-websocket.
///
/// There is no long-lived connection: each operation connects, identifies, sends its request,
/// waits for the matching response, and disconnects again.
#[derive(Debug, Clone)]
pub struct ObsClient<'a> {
    connection: &'a ObsConnection,
    timeout: Duration,
}

impl<'a> ObsClient<'a> {
    pub fn new(connection: &'a ObsConnection, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}:{}", self.connection.host, self.connection.port)
    }

    /// Runs one request on a fresh connection, bounded by the client's timeout.
    ///
    /// Only connecting, identifying and the request itself count against the timeout. Once OBS
    /// has answered, the outcome stands however the close goes.
    #[instrument(skip(self), fields(url = %self.url()), level = tracing::Level::DEBUG)]
    async fn call(&self, request_type: &str) -> Result<Option<serde_json::Value>> {
        let (mut socket, response) = tokio::time::timeout(self.timeout, self.exchange(request_type))
            .await
            .map_err(|_| {
                Error::ControllerUnavailable(format!(
                    "no answer from {} within {:?}",
                    self.url(),
                    self.timeout
                ))
            })??;

        // OBS does not care how we leave
        if tokio::time::timeout(CLOSE_TIMEOUT, socket.close(None))
            .await
            .is_err()
        {
            tracing::debug!("gave up on closing the OBS connection");
        }
        response
    }

    async fn exchange(
        &self,
        request_type: &str,
    ) -> Result<(Socket, Result<Option<serde_json::Value>>)> {
        let mut socket = self.connect().await?;
        let response = request(&mut socket, request_type).await;
        Ok((socket, response))
    }

    async fn connect(&self) -> Result<Socket> {
        let url = self.url();
        let (mut socket, _) =
            tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|source| Error::Websocket {
                    context: format!("connect to {url}"),
                    source,
                })?;

        let hello: Hello = expect_op(&mut socket, protocol::OP_HELLO).await?;
        tracing::trace!(version = hello.obs_web_socket_version, "OBS said hello");

        let authentication = match (&hello.authentication, &self.connection.password) {
            (None, _) => None,
            (Some(challenge), Some(password)) => {
                Some(protocol::authentication_string(password, challenge))
            }
            (Some(_), None) => {
                return Err(Error::ControllerUnavailable(
                    "OBS requires a password but OBS_WS_PASSWORD is not set".to_string(),
                ));
            }
        };
        send(
            &mut socket,
            protocol::OP_IDENTIFY,
            &Identify {
                rpc_version: protocol::RPC_VERSION,
                authentication,
                event_subscriptions: 0,
            },
        )
        .await?;

        let identified: Identified = expect_op(&mut socket, protocol::OP_IDENTIFIED).await?;
        tracing::trace!(
            rpc_version = identified.negotiated_rpc_version,
            "identified to OBS"
        );
        Ok(socket)
    }
}

async fn send(socket: &mut Socket, op: u8, d: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string(&Outgoing { op, d }).map_err(|e| {
        Error::ControllerUnavailable(format!("could not encode obs-websocket op {op}: {e}"))
    })?;
    socket
        .send(Message::Text(text.into()))
        .await
        .map_err(|source| Error::Websocket {
            context: "send to OBS".to_string(),
            source,
        })
}

/// Reads the next obs-websocket message, skipping anything that is not one.
async fn receive(socket: &mut Socket) -> Result<Incoming> {
    loop {
        let message = socket
            .next()
            .await
            .ok_or_else(|| {
                Error::ControllerUnavailable("OBS closed the connection unexpectedly".to_string())
            })?
            .map_err(|source| Error::Websocket {
                context: "read from OBS".to_string(),
                source,
            })?;

        match message {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).map_err(|e| {
                    Error::ControllerUnavailable(format!("OBS sent an unreadable message: {e}"))
                });
            }
            Message::Close(frame) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                    .unwrap_or((1005, String::new()));
                return Err(Error::ControllerUnavailable(
                    if code == protocol::CLOSE_AUTHENTICATION_FAILED {
                        "OBS rejected the password (check OBS_WS_PASSWORD)".to_string()
                    } else {
                        format!("OBS closed the connection ({code}): {reason}")
                    },
                ));
            }
            _ => continue,
        }
    }
}

async fn expect_op<T: DeserializeOwned>(socket: &mut Socket, op: u8) -> Result<T> {
    let incoming = receive(socket).await?;
    if incoming.op != op {
        return Err(Error::ControllerUnavailable(format!(
            "expected obs-websocket op {op}, got {}",
            incoming.op
        )));
    }
    serde_json::from_value(incoming.d).map_err(|e| {
        Error::ControllerUnavailable(format!("OBS sent an unreadable op {op} message: {e}"))
    })
}

async fn request(socket: &mut Socket, request_type: &str) -> Result<Option<serde_json::Value>> {
    let request_id = format!("twitch-go-{request_type}");
    send(
        socket,
        protocol::OP_REQUEST,
        &protocol::Request {
            request_type,
            request_id: &request_id,
        },
    )
    .await?;

    loop {
        let incoming = receive(socket).await?;
        if incoming.op != protocol::OP_REQUEST_RESPONSE {
            tracing::trace!(op = incoming.op, "skipping OBS message");
            continue;
        }
        let response: RequestResponse = serde_json::from_value(incoming.d).map_err(|e| {
            Error::ControllerUnavailable(format!("OBS sent an unreadable response: {e}"))
        })?;
        if response.request_id != request_id {
            continue;
        }

        if !response.request_status.result {
            return Err(Error::ControllerRejected {
                request: response.request_type,
                code: response.request_status.code,
                comment: response.request_status.comment,
            });
        }
        return Ok(response.response_data);
    }
}

impl BroadcastController for ObsClient<'_> {
    async fn query_status(&self) -> Result<BroadcastStatus> {
        let data = self.call("GetStreamStatus").await?.ok_or_else(|| {
            Error::ControllerUnavailable("GetStreamStatus returned no data".to_string())
        })?;
        let status: StreamStatus = serde_json::from_value(data).map_err(|e| {
            Error::ControllerUnavailable(format!("unreadable GetStreamStatus response: {e}"))
        })?;

        tracing::debug!(
            active = status.output_active,
            reconnecting = status.output_reconnecting,
            "fetched stream status"
        );
        Ok(BroadcastStatus {
            active: status.output_active,
        })
    }

    async fn start(&self) -> Result<()> {
        self.call("StartStream").await?;
        tracing::info!("OBS accepted StartStream");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.call("StopStream").await?;
        tracing::info!("OBS accepted StopStream");
        Ok(())
    }
}
