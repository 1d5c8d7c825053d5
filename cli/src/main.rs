use std::time::Duration;

use actions::{Action, Point, encode_action};
use canvas::{CanvasEvent, EngineConfig, EngineCore, EngineError, Tool};
use clap::{Args, Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// How long a one-shot edit waits for the server to acknowledge the close.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("server returned HTTP {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("websocket failed: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket closed by server ({code}): {reason}")]
    WsClosed { code: u16, reason: String },
    #[error("timed out waiting for the server")]
    Timeout,
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("message encoding failed: {0}")]
    Codec(#[from] actions::CodecError),
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for CliError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Ws(Box::new(error))
    }
}

#[derive(Parser, Debug)]
#[command(name = "drawsync-cli", about = "Headless client for drawsync rooms")]
struct Cli {
    #[arg(long, env = "DRAWSYNC_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    /// Shared secret, when the server requires one.
    #[arg(long, env = "DRAWSYNC_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone)]
struct CliContext {
    base_url: String,
    token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    Ping,
    Rooms(RoomsCommand),
    /// Follow a room and print what the engine sees.
    Watch(WatchArgs),
    /// Draw one shape spanning `(x, y)` to `(x + w, y + h)`.
    Draw(DrawArgs),
    /// Draw one freehand stroke through the given points.
    Stroke(StrokeArgs),
    /// Clear the room for everyone.
    Clear { room: String },
}

#[derive(Args, Debug)]
struct RoomsCommand {
    #[command(subcommand)]
    command: RoomsSubcommand,
}

#[derive(Subcommand, Debug)]
enum RoomsSubcommand {
    Create {
        /// Use the deprecated `GET /create-room` endpoint.
        #[arg(long, default_value_t = false)]
        legacy: bool,
    },
    Get {
        room: String,
    },
}

#[derive(Args, Debug)]
struct WatchArgs {
    room: String,

    /// Exit after this many inbound messages.
    #[arg(long)]
    count: Option<usize>,
}

#[derive(Args, Debug, Clone)]
struct StyleArgs {
    #[arg(long, default_value = "#000000")]
    color: String,

    #[arg(long, default_value_t = 2.0)]
    width: f64,
}

#[derive(Args, Debug)]
struct DrawArgs {
    room: String,
    #[arg(value_parser = parse_shape_tool)]
    shape: Tool,
    #[arg(allow_negative_numbers = true)]
    x: f64,
    #[arg(allow_negative_numbers = true)]
    y: f64,
    #[arg(allow_negative_numbers = true)]
    w: f64,
    #[arg(allow_negative_numbers = true)]
    h: f64,
    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Args, Debug)]
struct StrokeArgs {
    room: String,
    #[arg(required = true, num_args = 1.., value_parser = parse_point, allow_negative_numbers = true)]
    points: Vec<Point>,
    #[command(flatten)]
    style: StyleArgs,
}

/// A one-shot local edit, performed through the engine.
#[derive(Debug, Clone, PartialEq)]
enum Edit {
    Shape { tool: Tool, x: f64, y: f64, w: f64, h: f64 },
    Stroke(Vec<Point>),
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let ctx = CliContext { base_url: cli.base_url, token: cli.token };

    match cli.command {
        Command::Ping => run_ping(&ctx).await,
        Command::Rooms(rooms) => run_rooms(&ctx, rooms).await,
        Command::Watch(args) => run_watch(&ctx, args).await,
        Command::Draw(args) => {
            let edit = Edit::Shape { tool: args.shape, x: args.x, y: args.y, w: args.w, h: args.h };
            run_edit(&ctx, &args.room, &edit, Some(&args.style)).await
        }
        Command::Stroke(args) => run_edit(&ctx, &args.room, &Edit::Stroke(args.points), Some(&args.style)).await,
        Command::Clear { room } => run_edit(&ctx, &room, &Edit::Clear, None).await,
    }
}

async fn run_ping(cli: &CliContext) -> Result<(), CliError> {
    http_request(cli, Method::GET, "/healthz").await?;
    println!("ok");
    Ok(())
}

async fn run_rooms(cli: &CliContext, rooms: RoomsCommand) -> Result<(), CliError> {
    match rooms.command {
        RoomsSubcommand::Create { legacy } => {
            let (method, path) = if legacy { (Method::GET, "/create-room") } else { (Method::POST, "/rooms") };
            let body = http_request(cli, method, path).await?;
            let room_id = body
                .get("room_id")
                .and_then(Value::as_str)
                .ok_or(CliError::MissingField("room_id"))?;
            println!("{room_id}");
            Ok(())
        }
        RoomsSubcommand::Get { room } => {
            let body = http_request(cli, Method::GET, &format!("/rooms/{room}")).await?;
            print_json(&body)?;
            Ok(())
        }
    }
}

async fn run_watch(cli: &CliContext, args: WatchArgs) -> Result<(), CliError> {
    let mut engine = EngineCore::new(EngineConfig::default())?;
    let mut stream = connect_room(cli, &args.room).await?;
    eprintln!("watching room {} as session {}", args.room, engine.session_token());

    let mut received = 0_usize;
    while args.count.is_none_or(|limit| received < limit) {
        let Some(message) = stream.next().await else {
            break;
        };
        match message? {
            Message::Text(text) => {
                received = received.saturating_add(1);
                if let Err(error) = engine.handle_inbound_text(text.as_str()) {
                    eprintln!("ignored message: {error}");
                    continue;
                }
                for event in engine.drain_events() {
                    println!("{}  objects={}", describe_event(&event), engine.objects().len());
                }
            }
            Message::Close(frame) => {
                let (code, reason) =
                    frame.map_or((1005, String::new()), |f| (u16::from(f.code), f.reason.as_str().to_owned()));
                eprintln!("room closed ({code}) {reason}");
                return Ok(());
            }
            _ => {}
        }
    }

    stream.close(None).await?;
    Ok(())
}

async fn run_edit(cli: &CliContext, room: &str, edit: &Edit, style: Option<&StyleArgs>) -> Result<(), CliError> {
    let mut engine = EngineCore::new(EngineConfig::default())?;
    if let Some(style) = style {
        engine.set_color(style.color.clone());
        engine.set_width(style.width);
    }

    let outbound = plan_edit(&mut engine, edit)?;
    if outbound.is_empty() {
        eprintln!("nothing to send");
        return Ok(());
    }

    let mut stream = connect_room(cli, room).await?;
    for action in &outbound {
        stream.send(Message::Text(encode_action(action)?.into())).await?;
    }
    close_gracefully(&mut stream).await?;

    for action in &outbound {
        match action.object_id() {
            Some(id) => println!("sent {} {id}", action.kind()),
            None => println!("sent {}", action.kind()),
        }
    }
    Ok(())
}

/// Run `edit` through the engine and return what it queued for the server.
fn plan_edit(engine: &mut EngineCore, edit: &Edit) -> Result<Vec<Action>, CliError> {
    match edit {
        Edit::Shape { tool, x, y, w, h } => {
            engine.set_tool(*tool);
            engine.pointer_down(Point::new(*x, *y));
            engine.pointer_up(Point::new(x + w, y + h))?;
        }
        Edit::Stroke(points) => {
            engine.set_tool(Tool::Pen);
            let Some((last, rest)) = points.split_last() else {
                return Ok(Vec::new());
            };
            let Some((first, middle)) = rest.split_first() else {
                engine.pointer_down(*last);
                engine.pointer_up(*last)?;
                return Ok(engine.take_outbound());
            };
            engine.pointer_down(*first);
            for point in middle {
                engine.pointer_move(*point);
            }
            engine.pointer_up(*last)?;
        }
        Edit::Clear => engine.clear()?,
    }
    Ok(engine.take_outbound())
}

/// Send a close frame and wait for the server's, so queued edits are
/// processed before the socket drops.
async fn close_gracefully(stream: &mut WsStream) -> Result<(), CliError> {
    stream.close(None).await?;
    let drain = async {
        while let Some(message) = stream.next().await {
            if let Message::Close(Some(frame)) = message? {
                let code = u16::from(frame.code);
                if code != 1000 {
                    return Err(CliError::WsClosed { code, reason: frame.reason.as_str().to_owned() });
                }
            }
        }
        Ok(())
    };
    tokio::time::timeout(CLOSE_GRACE, drain).await.map_err(|_| CliError::Timeout)?
}

async fn connect_room(cli: &CliContext, room: &str) -> Result<WsStream, CliError> {
    let url = ws_url(&cli.base_url, room, cli.token.as_deref())?;
    let (stream, _) = connect_async(url.as_str()).await?;
    Ok(stream)
}

async fn http_request(cli: &CliContext, method: Method, path: &str) -> Result<Value, CliError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    }

    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let url = format!("{}{}", cli.base_url.trim_end_matches('/'), path);
    let response = client.request(method, &url).send().await?;
    let status = response.status();
    let value = response.json::<Value>().await.unwrap_or(Value::Null);

    if !status.is_success() {
        return Err(server_error(status, &value));
    }
    Ok(value)
}

fn server_error(status: StatusCode, body: &Value) -> CliError {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| body.to_string(), ToOwned::to_owned);
    CliError::ServerError { status: status.as_u16(), message }
}

/// WebSocket URL for `room`: `http(s)://host` becomes `ws(s)://host/ws/{room}`.
fn ws_url(base_url: &str, room: &str, token: Option<&str>) -> Result<Url, CliError> {
    let invalid = || CliError::InvalidBaseUrl(base_url.to_owned());
    let mut url = Url::parse(base_url).map_err(|_| invalid())?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return Err(invalid()),
    };
    url.set_scheme(scheme).map_err(|()| invalid())?;
    url.path_segments_mut().map_err(|()| invalid())?.pop_if_empty().push("ws").push(room);
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

fn parse_point(raw: &str) -> Result<Point, String> {
    let (x, y) = raw.split_once(',').ok_or_else(|| format!("expected x,y but got `{raw}`"))?;
    let x = x.trim().parse::<f64>().map_err(|e| format!("bad x in `{raw}`: {e}"))?;
    let y = y.trim().parse::<f64>().map_err(|e| format!("bad y in `{raw}`: {e}"))?;
    Ok(Point::new(x, y))
}

fn parse_shape_tool(raw: &str) -> Result<Tool, String> {
    Tool::from_name(raw)
        .filter(|tool| tool.shape_kind().is_some())
        .ok_or_else(|| format!("unknown shape `{raw}` (rectangle, circle, triangle, line)"))
}

fn describe_event(event: &CanvasEvent) -> String {
    match event {
        CanvasEvent::ObjectCreated(id) => format!("created {id}"),
        CanvasEvent::ObjectModified(id) => format!("modified {id}"),
        CanvasEvent::Cleared => "cleared".to_owned(),
        CanvasEvent::Restored => "restored".to_owned(),
        CanvasEvent::PeerUndo => "peer undo".to_owned(),
        CanvasEvent::PeerRedo => "peer redo".to_owned(),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
