//! # Live Speech Service WebSocket Transport
//!
//! Bidirectional streaming session with the hosted speech model.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: `wss://…BidiGenerateContent?key=<credential>`
//! 2. **Setup**: first client message names the model, asks for audio
//!    responses in a prebuilt voice, carries the persona and channel, and
//!    enables transcripts of the spoken output
//! 3. **Ready**: the server answers `setupComplete` (reported as `Opened`)
//! 4. **Audio up**: `realtimeInput.mediaChunks[]` with base64 16 kHz PCM
//! 5. **Audio down**: `serverContent.modelTurn.parts[].inlineData` with base64
//!    24 kHz PCM, plus `outputTranscription`, `turnComplete`, `interrupted`
//!
//! ## Message Format:
//! - **Client → Server**: JSON text frames
//! - **Server → Client**: JSON, delivered as text or binary frames

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use super::{ServerPayload, SessionConfig, SessionHandle, Transport, TransportEvent, TransportEvents};
use crate::audio::codec::EncodedChunk;
use crate::config::TransportConfig;
use crate::error::{RadioError, RadioResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Messages sent by the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum ClientMessage<'a> {
    /// Session configuration, must be the first message
    Setup(Setup),
    /// Streaming microphone audio
    RealtimeInput(RealtimeInput<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: Content,
    /// Present-and-empty enables transcripts of the spoken response
    output_audio_transcription: Empty,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct Empty {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput<'a> {
    media_chunks: Vec<MediaChunk<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk<'a> {
    mime_type: &'a str,
    data: &'a str,
}

/// Messages sent by the server. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    go_away: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    output_transcription: Option<Transcription>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<InboundPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundPart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct Transcription {
    text: Option<String>,
}

impl Setup {
    fn from_config(config: &SessionConfig) -> Self {
        let channel = &config.channel;
        let instruction = format!(
            "{}\nYou are operating on {} ({} MHz, {}).",
            config.transport.system_instruction.trim(),
            channel.name,
            channel.frequency,
            channel.description
        );

        Self {
            model: config.transport.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.transport.voice.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart { text: instruction }],
            },
            output_audio_transcription: Empty {},
        }
    }
}

/// Reduce a server message to the events the controller cares about.
fn interpret(message: ServerMessage) -> Vec<TransportEvent> {
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(TransportEvent::Opened);
    }

    if let Some(content) = message.server_content {
        // Only the first inline audio part of a turn fragment is played
        let audio = content
            .model_turn
            .and_then(|turn| turn.parts.into_iter().find_map(|part| part.inline_data))
            .filter(|inline| {
                inline
                    .mime_type
                    .as_deref()
                    .map_or(true, |mime| mime.starts_with("audio/"))
            })
            .map(|inline| inline.data);
        let transcript = content
            .output_transcription
            .and_then(|t| t.text)
            .filter(|text| !text.is_empty());

        let payload = ServerPayload {
            audio,
            transcript,
            turn_complete: content.turn_complete,
            interrupted: content.interrupted,
        };
        if payload != ServerPayload::default() {
            events.push(TransportEvent::Message(payload));
        }
    }

    if let Some(notice) = message.go_away {
        warn!(?notice, "Server announced it will close the session");
    }

    events
}

/// Endpoint with the credential attached as a query parameter.
fn session_url(config: &TransportConfig) -> String {
    if config.api_key.is_empty() {
        return config.endpoint.clone();
    }
    let separator = if config.endpoint.contains('?') { '&' } else { '?' };
    format!(
        "{}{}key={}",
        config.endpoint,
        separator,
        urlencoding::encode(&config.api_key)
    )
}

/// Connects to the hosted speech model over WebSocket.
#[derive(Debug, Default, Clone)]
pub struct LiveTransport;

impl LiveTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LiveTransport {
    async fn connect(
        &self,
        config: SessionConfig,
        events: TransportEvents,
    ) -> RadioResult<Box<dyn SessionHandle>> {
        info!(
            endpoint = %config.transport.endpoint,
            channel = %config.channel.name,
            generation = events.generation(),
            "Opening live session"
        );

        let (socket, _response) = tokio_tungstenite::connect_async(session_url(&config.transport)).await?;
        let (mut sink, stream) = socket.split();

        let setup = serde_json::to_string(&ClientMessage::Setup(Setup::from_config(&config)))?;
        sink.send(Message::Text(setup)).await?;
        debug!("Setup message sent");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(sink, outbound_rx));
        let reader = tokio::spawn(read_loop(stream, events));

        Ok(Box::new(LiveSession {
            outbound,
            reader: Some(reader),
            writer: Some(writer),
            closed: false,
        }))
    }
}

enum Outbound {
    Text(String),
    Close,
}

async fn write_loop(mut sink: SplitSink<WsStream, Message>, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Text(text) => {
                if let Err(err) = sink.send(Message::Text(text)).await {
                    // The reader reports the failure to the controller
                    warn!("Live session write failed: {}", err);
                    break;
                }
            }
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                break;
            }
        }
    }
    debug!("Live session writer finished");
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: TransportEvents) {
    while let Some(frame) = stream.next().await {
        let bytes = match frame {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(reason)) => {
                info!(?reason, "Live session closed by server");
                events.emit(TransportEvent::Closed);
                return;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
            Err(err) => {
                error!("Live session error: {}", err);
                events.emit(TransportEvent::Error(err.to_string()));
                return;
            }
        };

        match serde_json::from_slice::<ServerMessage>(&bytes) {
            Ok(message) => {
                for event in interpret(message) {
                    trace!(?event, "Live session event");
                    if !events.emit(event) {
                        return;
                    }
                }
            }
            Err(err) => warn!(bytes = bytes.len(), "Ignoring unparseable server message: {}", err),
        }
    }

    events.emit(TransportEvent::Closed);
}

/// Handle to an open live session.
pub struct LiveSession {
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    closed: bool,
}

impl SessionHandle for LiveSession {
    fn send_realtime_input(&mut self, chunk: &EncodedChunk) -> RadioResult<()> {
        if self.closed {
            return Err(RadioError::Transport("session already closed".to_string()));
        }
        let message = ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: &chunk.mime_type,
                data: &chunk.data,
            }],
        });
        let text = serde_json::to_string(&message)?;
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| RadioError::Transport("session writer stopped".to_string()))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.outbound.send(Outbound::Close);
        // Our own close must not come back as a Closed callback
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        // The writer exits by itself after the close frame
        self.writer.take();
        debug!("Live session closed by client");
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.close();
    }
}
