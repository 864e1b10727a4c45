use super::{Result, SynthesisError};
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    Sink, SinkExt, Stream, StreamExt,
};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

/// Keepalive ping period while waiting on the server.
pub(crate) const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewComplete {
    pub audio_url: String,
}

/// A frame as seen by the completion loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(usize),
    /// Ping, pong and raw frames.
    Control,
    Close,
    Error(String),
}

impl From<std::result::Result<Message, tungstenite::Error>> for Frame {
    fn from(message: std::result::Result<Message, tungstenite::Error>) -> Self {
        match message {
            Ok(Message::Text(text)) => Frame::Text(text.as_str().to_string()),
            Ok(Message::Binary(data)) => Frame::Binary(data.len()),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => Frame::Control,
            Ok(Message::Close(_)) => Frame::Close,
            Err(e) => Frame::Error(e.to_string()),
        }
    }
}

/// Source of inbound frames. `None` means the connection is gone.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Option<Frame>;
}

#[derive(Debug)]
pub enum PreviewState {
    Awaiting,
    Done(PreviewComplete),
    Failed(SynthesisError),
}

impl PreviewState {
    /// Transition out of `Awaiting` for one inbound frame.
    pub fn on_frame(frame: Option<Frame>) -> PreviewState {
        match frame {
            Some(Frame::Text(text)) => Self::on_text(&text),
            Some(Frame::Binary(len)) => {
                debug!(len, "ignoring binary frame");
                PreviewState::Awaiting
            }
            Some(Frame::Control) => PreviewState::Awaiting,
            Some(Frame::Close) | None => PreviewState::Failed(SynthesisError::Protocol(
                "WebSocket closed before completion".to_string(),
            )),
            Some(Frame::Error(e)) => {
                PreviewState::Failed(SynthesisError::Protocol(format!("WebSocket error: {}", e)))
            }
        }
    }

    fn on_text(text: &str) -> PreviewState {
        let parsed: Value = match serde_json::from_str(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("skipping malformed frame: {}", e);
                return PreviewState::Awaiting;
            }
        };
        match parsed.get("type").and_then(Value::as_str) {
            Some("tts_complete") => {
                let audio_url = parsed
                    .get("data")
                    .and_then(|data| data.get("audio_url"))
                    .and_then(Value::as_str)
                    .filter(|url| !url.is_empty());
                match audio_url {
                    Some(audio_url) => PreviewState::Done(PreviewComplete {
                        audio_url: audio_url.to_string(),
                    }),
                    None => PreviewState::Failed(SynthesisError::Protocol(
                        "tts_complete missing audio_url".to_string(),
                    )),
                }
            }
            Some("error") => {
                let data = parsed.get("data").cloned().unwrap_or(Value::Null);
                warn!(%data, "backend reported an error");
                PreviewState::Failed(SynthesisError::Protocol(format!("Backend error: {}", data)))
            }
            other => {
                debug!(frame_type = ?other, "ignoring frame");
                PreviewState::Awaiting
            }
        }
    }
}

/// Read frames until the server reports completion or failure. Individual
/// reads are unbounded; callers wrap the whole exchange in their deadline.
pub async fn await_completion<S>(source: &mut S) -> Result<PreviewComplete>
where
    S: FrameSource + ?Sized,
{
    loop {
        let frame = source.next_frame().await;
        match PreviewState::on_frame(frame) {
            PreviewState::Awaiting => continue,
            PreviewState::Done(complete) => return Ok(complete),
            PreviewState::Failed(e) => return Err(e),
        }
    }
}

/// Websocket-backed frame source that pings the server while waiting.
pub(crate) struct WsFrameSource<S> {
    sink: SplitSink<S, Message>,
    stream: SplitStream<S>,
    heartbeat: Interval,
}

impl<S> WsFrameSource<S>
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin
        + Send,
{
    pub fn new(ws: S, heartbeat: Duration) -> Self {
        let (sink, stream) = ws.split();
        Self {
            sink,
            stream,
            heartbeat: interval_at(Instant::now() + heartbeat, heartbeat),
        }
    }

    /// A failed send mid-exchange is reported like a failed read.
    pub async fn send_json(&mut self, value: &Value) -> Result<()> {
        self.sink
            .send(Message::Text(value.to_string().into()))
            .await
            .map_err(|e| SynthesisError::Protocol(format!("WebSocket error: {}", e)))
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!("error closing preview websocket: {}", e);
        }
    }
}

#[async_trait]
impl<S> FrameSource for WsFrameSource<S>
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin
        + Send,
{
    async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            tokio::select! {
                message = self.stream.next() => return message.map(Frame::from),
                _ = self.heartbeat.tick() => {
                    if let Err(e) = self.sink.send(Message::Ping(Default::default())).await {
                        return Some(Frame::Error(e.to_string()));
                    }
                }
            }
        }
    }
}
