//! Per-client connection handling: greeting, line framing, command-list
//! batching, authentication gating, the ACK protocol and idle parking.
//!
//! Every connection runs in its own task. A command list is only processed
//! once `command_list_end` has arrived, so a half-received list never emits
//! partial output. Idle clients are parked on a race between the next input
//! line and the event bus.

pub mod commands;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use color_eyre::Result;
use color_eyre::eyre::Context;
use futures::FutureExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast};
use tokio::task;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::mpd_client::commands::{HandlerCtx, find_command};
use crate::mpd_protocol::{self, Ack, BINARY_SIZE_DEFAULT, CommandError, Events, args};
use crate::system::System;

/// State specific to a single client connection.
pub struct ClientCtx {
    pub authenticated: bool,
    /// Upper bound for one `binary:` chunk.
    pub binary_limit: usize,
    /// Events the client subscribed to with the last idle.
    pub idle_mask: Events,
    /// Events observed since the last drain.
    pub pending_events: Events,
}

impl ClientCtx {
    pub fn new(authenticated: bool) -> Self {
        ClientCtx {
            authenticated,
            binary_limit: BINARY_SIZE_DEFAULT,
            idle_mask: Events::NONE,
            pending_events: Events::NONE,
        }
    }
}

pub async fn handle_clients(
    system: Arc<Mutex<System>>,
    config: Arc<Config>,
    port: u16,
) -> Result<()> {
    let listener = TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .wrap_err("Could not bind mpd port")?;
    info!("listening for mpd clients on port {port}");

    loop {
        let (stream, addr) = listener
            .accept()
            .await
            .wrap_err("Could not accept connection")?;
        // loopback peers are trusted and skip authentication
        let trusted = addr.ip().is_loopback();
        let (reader, writer) = tokio::io::split(stream);
        let reader = BufReader::new(reader).lines();
        let system = Arc::clone(&system);
        let config = Arc::clone(&config);
        task::spawn(async move {
            if let Err(e) = handle_client(reader, writer, system, config, trusted).await {
                warn!("error handling client: {e:#}");
            } else {
                info!("client disconnected");
            }
        });
    }
}

async fn handle_client(
    mut reader: tokio::io::Lines<impl AsyncBufRead + Unpin>,
    mut writer: impl AsyncWrite + Unpin,
    system: Arc<Mutex<System>>,
    config: Arc<Config>,
    trusted: bool,
) -> Result<()> {
    // the protocol version, not the server version
    writer
        .write_all(format!("OK MPD {}\n", mpd_protocol::VERSION).as_bytes())
        .await
        .wrap_err("Could not send greeting to client")?;

    let mut events_rx = system.lock().await.subscribe();
    let mut client = ClientCtx::new(config.password().is_none() || trusted);
    let mut pending_line: Option<String> = None;

    loop {
        drain_events(&mut events_rx, &mut client);

        let line = match pending_line.take() {
            Some(line) => line,
            None => match reader
                .next_line()
                .await
                .wrap_err("Could not get next line from client")?
            {
                Some(line) => line,
                None => return Ok(()),
            },
        };

        // wait for the whole list before processing anything
        let mut unit = vec![line];
        if unit[0] == "command_list_begin" || unit[0] == "command_list_ok_begin" {
            loop {
                match reader
                    .next_line()
                    .await
                    .wrap_err("Could not get next line from client")?
                {
                    Some(line) => {
                        let done = line == "command_list_end";
                        unit.push(line);
                        if done {
                            break;
                        }
                    }
                    None => return Ok(()),
                }
            }
        }

        drain_events(&mut events_rx, &mut client);
        let outcome = {
            let mut system = system.lock().await;
            process_unit(&unit, &mut client, &mut system, &config)
        };
        writer
            .write_all(&outcome.out)
            .await
            .wrap_err("Failed to write response to client")?;

        if outcome.close {
            return Ok(());
        }
        if outcome.parked {
            match parked_idle(&mut reader, &mut writer, &mut events_rx, &mut client).await? {
                Park::Closed => return Ok(()),
                Park::Resumed => {}
                Park::Command(line) => pending_line = Some(line),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListType {
    None,
    List,
    ListOk,
    ListEnd,
}

struct UnitOutcome {
    out: Vec<u8>,
    parked: bool,
    close: bool,
}

/// Processes one complete unit: a single line, or a whole command list. The
/// response bytes for the unit are returned in one piece.
fn process_unit(
    lines: &[String],
    client: &mut ClientCtx,
    system: &mut System,
    config: &Config,
) -> UnitOutcome {
    let mut out = Vec::new();
    let mut parked = false;
    let mut idle_cmd = false;
    let mut close_cmd = false;
    let mut listtype = ListType::None;
    let mut ncmd = 0;
    let mut failed = false;

    for line in lines {
        debug!("mpd message: {line}");

        let argv = match args::tokenize(line) {
            Ok(argv) if !argv.is_empty() => argv,
            Ok(_) | Err(_) => {
                warn!("error parsing arguments for mpd message: {line}");
                ack(&mut out, Ack::Arg, ncmd, "unknown", "Error parsing arguments");
                failed = true;
                break;
            }
        };

        // list control words are not dispatched
        match argv[0].as_str() {
            "command_list_ok_begin" => {
                listtype = ListType::ListOk;
                continue;
            }
            "command_list_begin" => {
                listtype = ListType::List;
                continue;
            }
            "command_list_end" => {
                listtype = ListType::ListEnd;
                break;
            }
            "idle" | "noidle" => idle_cmd = true,
            "close" => close_cmd = true,
            _ => {}
        }

        if let Err(e) = dispatch(&argv, client, system, config, &mut out, &mut parked) {
            warn!("error executing command '{}': {}", argv[0], e.message);
            ack(&mut out, e.ack, ncmd, &argv[0], &e.message);
            failed = true;
            break;
        }

        if listtype == ListType::ListOk {
            out.extend_from_slice(b"list_OK\n");
        } else if listtype == ListType::None && !idle_cmd && !close_cmd {
            out.extend_from_slice(b"OK\n");
        }
        ncmd += 1;
    }

    if !failed && !close_cmd && listtype == ListType::ListEnd {
        out.extend_from_slice(b"OK\n");
    }

    UnitOutcome {
        out,
        parked,
        close: close_cmd,
    }
}

fn ack(out: &mut Vec<u8>, code: Ack, ncmd: usize, command: &str, message: &str) {
    out.extend_from_slice(format!("ACK [{}@{ncmd}] {{{command}}} {message}\n", code as u8).as_bytes());
}

fn dispatch(
    argv: &[String],
    client: &mut ClientCtx,
    system: &mut System,
    config: &Config,
    out: &mut Vec<u8>,
    parked: &mut bool,
) -> Result<(), CommandError> {
    let command = find_command(&argv[0]).ok_or_else(|| {
        CommandError::new(Ack::Unknown, format!("Unsupported command '{}'", argv[0]))
    })?;

    if command.min_argc > argv.len() {
        return Err(CommandError::arg(format!(
            "Missing argument(s) for command '{}', expected {}, given {}",
            argv[0],
            command.min_argc,
            argv.len()
        )));
    }

    if argv[0] == "password" {
        let mut ctx = HandlerCtx {
            out: &mut *out,
            client: &mut *client,
            system: &mut *system,
            config,
        };
        let result = (command.handler)(&mut ctx, argv);
        client.authenticated = result.is_ok();
        return result;
    }

    if !client.authenticated {
        return Err(CommandError::permission("Not authenticated"));
    }

    // idle, noidle and close touch connection state the handlers cannot see
    match argv[0].as_str() {
        "idle" => {
            *parked = command_idle(client, argv, out);
            Ok(())
        }
        "noidle" => {
            command_noidle(client, out);
            Ok(())
        }
        _ => {
            let mut ctx = HandlerCtx {
                out,
                client,
                system,
                config,
            };
            (command.handler)(&mut ctx, argv)
        }
    }
}

/// Arms the idle subscription. Returns whether the client is parked; when
/// subscribed events already accumulated the notification fires right away
/// instead.
fn command_idle(client: &mut ClientCtx, argv: &[String], out: &mut Vec<u8>) -> bool {
    client.idle_mask = Events::NONE;
    if argv.len() > 1 {
        for name in &argv[1..] {
            match Events::from_subsystem(name) {
                Some(flag) => client.idle_mask |= flag,
                None => debug!("idle for '{name}' not supported"),
            }
        }
    } else {
        client.idle_mask = Events::ALL;
    }

    if client.pending_events.intersects(client.idle_mask) {
        drain_idle(client, out);
        return false;
    }
    true
}

/// The protocol says the results "might be empty at this time", which is
/// the bare OK.
fn command_noidle(client: &mut ClientCtx, out: &mut Vec<u8>) {
    if client.pending_events.is_empty() {
        out.extend_from_slice(b"OK\n");
    } else {
        drain_idle(client, out);
    }
    client.idle_mask = Events::NONE;
}

/// One `changed:` line per accumulated event class, canonical order, then
/// OK. Clears the whole idle state.
fn drain_idle(client: &mut ClientCtx, out: &mut Vec<u8>) {
    for name in client.pending_events.subsystems() {
        out.extend_from_slice(format!("changed: {name}\n").as_bytes());
    }
    out.extend_from_slice(b"OK\n");
    client.pending_events = Events::NONE;
    client.idle_mask = Events::NONE;
}

/// Moves whatever accumulated on the bus into the client's pending set.
fn drain_events(rx: &mut broadcast::Receiver<Events>, client: &mut ClientCtx) {
    loop {
        match rx.try_recv() {
            Ok(events) => client.pending_events |= events,
            Err(broadcast::error::TryRecvError::Lagged(_)) => {
                client.pending_events = Events::ALL;
            }
            Err(_) => break,
        }
    }
}

enum Park {
    Closed,
    Resumed,
    /// The client ignored the protocol and sent a regular command while
    /// parked; it is processed normally.
    Command(String),
}

/// A parked client waits for the next matching event or its own `noidle`,
/// whichever comes first.
async fn parked_idle(
    reader: &mut tokio::io::Lines<impl AsyncBufRead + Unpin>,
    writer: &mut (impl AsyncWrite + Unpin),
    rx: &mut broadcast::Receiver<Events>,
    client: &mut ClientCtx,
) -> Result<Park> {
    use futures_concurrency::prelude::*;
    debug!("client parked in idle");

    enum Wake {
        Line(std::io::Result<Option<String>>),
        Event(Result<Events, broadcast::error::RecvError>),
    }

    loop {
        let next_line = reader.next_line().map(Wake::Line);
        let next_event = rx.recv().map(Wake::Event);

        match (next_line, next_event).race().await {
            Wake::Event(Ok(events)) => {
                client.pending_events |= events;
                if !events.intersects(client.idle_mask) {
                    continue;
                }
                let mut out = Vec::new();
                drain_idle(client, &mut out);
                writer
                    .write_all(&out)
                    .await
                    .wrap_err("Failed to write idle notification")?;
                return Ok(Park::Resumed);
            }
            Wake::Event(Err(broadcast::error::RecvError::Lagged(_))) => {
                // missed events count as everything having changed
                client.pending_events = Events::ALL;
                let mut out = Vec::new();
                drain_idle(client, &mut out);
                writer
                    .write_all(&out)
                    .await
                    .wrap_err("Failed to write idle notification")?;
                return Ok(Park::Resumed);
            }
            Wake::Event(Err(broadcast::error::RecvError::Closed)) => {
                warn!("event bus closed while client was parked");
                return Ok(Park::Resumed);
            }
            Wake::Line(Ok(Some(line))) => {
                if line.trim() == "noidle" {
                    let mut out = Vec::new();
                    command_noidle(client, &mut out);
                    writer
                        .write_all(&out)
                        .await
                        .wrap_err("Failed to write response to client")?;
                    return Ok(Park::Resumed);
                }
                warn!("client sent '{line}' while parked in idle");
                client.idle_mask = Events::NONE;
                return Ok(Park::Command(line));
            }
            Wake::Line(Ok(None)) => return Ok(Park::Closed),
            Wake::Line(Err(e)) => {
                return Err(e).wrap_err("Could not get next line from client");
            }
        }
    }
}
