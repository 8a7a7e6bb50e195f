//! Line-oriented console front-end.
//!
//! Every input line is either plain text, which the Typist types, or a
//! slash command:
//!
//! ```text
//! hello world              type "hello world" (plus Enter unless --no-enter)
//! //literal                type "/literal"
//! /replace <text>          erase what was typed and type <text> instead
//! /list                    refresh the macro table
//! /run <id>                run a stored macro
//! /put [id]|title|icon|script
//!                          create (empty id) or update a macro
//! /del <id>                delete a macro
//! /startup <id>            run this macro when the device powers up
//! /startup-script <text>   run this text when the device powers up
//! /connect                 pick a device and connect
//! /disconnect              drop the link, keep the device
//! /forget                  drop the link and forget the device
//! /pause  /resume          what a hidden/visible window would do
//! /help  /quit
//! ```
//!
//! Parsing is a pure function ([`parse_line`]) and so is rendering
//! ([`render_event`]); [`run`] wires both to an input stream, an output
//! sink, and a [`SessionHandle`].

use std::future::Future;
use std::io::Write;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::UnboundedReceiver;

use typist_core::{ConfigDocument, MacroDraft};

use crate::application::session::{
    SentPayload, SessionEvent, SessionHandle, SessionState, DEFAULT_FIELD,
};

pub const HELP: &str = "\
commands:
  <text>                   type text
  //<text>                 type text starting with '/'
  /replace <text>          replace what was typed
  /list                    refresh the macro table
  /run <id>                run a macro
  /put [id]|title|icon|script
                           create or update a macro
  /del <id>                delete a macro
  /startup <id>            set the power-up macro
  /startup-script <text>   set the power-up script
  /connect  /disconnect  /forget  /pause  /resume
  /help  /quit";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Type(String),
    Replace(String),
    List,
    Run(i64),
    Put(MacroDraft),
    Delete(i64),
    Startup(i64),
    StartupScript(String),
    Connect,
    Disconnect,
    Forget,
    Pause,
    Resume,
    Help,
    Quit,
}

/// Reasons a console line is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command /{0} (try /help)")]
    UnknownCommand(String),

    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),

    #[error("'{0}' is not a macro id")]
    InvalidId(String),

    #[error("/put expects [id]|title|icon|script")]
    InvalidMacro,
}

fn required<'a>(arg: &'a str, command: &'static str) -> Result<&'a str, ParseError> {
    if arg.trim().is_empty() {
        Err(ParseError::MissingArgument(command))
    } else {
        Ok(arg)
    }
}

fn parse_id(raw: &str) -> Result<i64, ParseError> {
    raw.trim()
        .parse()
        .map_err(|_| ParseError::InvalidId(raw.trim().to_string()))
}

fn parse_draft(raw: &str) -> Result<MacroDraft, ParseError> {
    // The script is last so it may itself contain '|'.
    let mut fields = raw.splitn(4, '|');
    let (Some(id), Some(title), Some(icon), Some(script)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(ParseError::InvalidMacro);
    };
    let id = match id.trim() {
        "" => None,
        other => Some(parse_id(other)?),
    };
    Ok(MacroDraft {
        id,
        title: title.trim().to_string(),
        icon: icon.trim().to_string(),
        script: script.to_string(),
    })
}

/// Parses one input line (without its line terminator).
///
/// # Errors
///
/// Returns a [`ParseError`] for unknown slash commands and malformed
/// arguments.  Plain text never fails.
pub fn parse_line(line: &str) -> Result<ConsoleCommand, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ConsoleCommand::Type(line.to_string()));
    };
    if rest.starts_with('/') {
        return Ok(ConsoleCommand::Type(rest.to_string()));
    }

    let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    match name {
        "replace" => Ok(ConsoleCommand::Replace(arg.to_string())),
        "list" => Ok(ConsoleCommand::List),
        "run" => parse_id(required(arg, "run")?).map(ConsoleCommand::Run),
        "put" => parse_draft(required(arg, "put")?).map(ConsoleCommand::Put),
        "del" => parse_id(required(arg, "del")?).map(ConsoleCommand::Delete),
        "startup" => parse_id(required(arg, "startup")?).map(ConsoleCommand::Startup),
        "startup-script" => Ok(ConsoleCommand::StartupScript(arg.to_string())),
        "connect" => Ok(ConsoleCommand::Connect),
        "disconnect" => Ok(ConsoleCommand::Disconnect),
        "forget" => Ok(ConsoleCommand::Forget),
        "pause" => Ok(ConsoleCommand::Pause),
        "resume" => Ok(ConsoleCommand::Resume),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

/// Forwards a parsed command to the session.  Returns `false` once the
/// console should stop reading.
pub fn dispatch(command: ConsoleCommand, handle: &SessionHandle) -> bool {
    match command {
        ConsoleCommand::Type(text) => handle.send_text(DEFAULT_FIELD, &text),
        ConsoleCommand::Replace(text) => handle.replace_text(DEFAULT_FIELD, &text),
        ConsoleCommand::List => handle.list_config(),
        ConsoleCommand::Run(id) => handle.run_macro(id),
        ConsoleCommand::Put(draft) => handle.save_macro(draft),
        ConsoleCommand::Delete(id) => handle.delete_macro(id),
        ConsoleCommand::Startup(id) => handle.set_startup(id),
        ConsoleCommand::StartupScript(script) => handle.set_startup_script(&script),
        ConsoleCommand::Connect => handle.connect(),
        ConsoleCommand::Disconnect => handle.disconnect(false),
        ConsoleCommand::Forget => handle.disconnect(true),
        ConsoleCommand::Pause => handle.pause(),
        ConsoleCommand::Resume => handle.resume(),
        ConsoleCommand::Help => true,
        ConsoleCommand::Quit => false,
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Disconnected => "disconnected",
        SessionState::Connecting => "connecting…",
        SessionState::Connected => "connected",
        SessionState::Reconnecting => "reconnecting…",
    }
}

/// Renders the macro table, the startup selection and storage usage.
pub fn render_config(doc: &ConfigDocument) -> String {
    let mut out = String::new();
    if doc.macros.is_empty() {
        out.push_str("no macros stored\n");
    }
    for record in &doc.macros {
        let marker = if doc.startup_id == Some(record.id) { '*' } else { ' ' };
        out.push_str(&format!(
            "{marker}[{:>3}] {} {}\n",
            record.id, record.icon, record.title
        ));
    }
    if let Some(script) = doc.startup_script.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("startup script: {script:?}\n"));
    }
    if let Some(fs) = &doc.fs {
        let kind = if fs.kind.is_empty() { "storage" } else { &fs.kind };
        out.push_str(&format!(
            "{kind}: {} / {} bytes ({}% used)\n",
            fs.used,
            fs.total,
            fs.percent_used()
        ));
    }
    out.trim_end().to_string()
}

/// Renders one session event as console text.
pub fn render_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::StateChanged(state) => format!("[{}]", state_label(*state)),
        SessionEvent::ConfigLoaded(doc) => render_config(doc),
        SessionEvent::Sent(SentPayload::Text { chars, .. }) => format!("sent {chars} chars"),
        SessionEvent::Sent(SentPayload::Macro(id)) => format!("ran macro {id}"),
        SessionEvent::Sent(SentPayload::Command(body)) => format!("sent {body}"),
        SessionEvent::Notice(message) => format!("error: {message}"),
    }
}

// ── REPL ──────────────────────────────────────────────────────────────────────

/// Reads commands from `input` and prints session events to `output` until
/// `/quit`, end of input, or `shutdown` completes.
///
/// The caller owns the session: this function neither connects nor shuts it
/// down.
///
/// # Errors
///
/// Propagates I/O errors from reading `input` or writing `output`.
pub async fn run<R, W, S>(
    input: R,
    mut output: W,
    handle: &SessionHandle,
    events: &mut UnboundedReceiver<SessionEvent>,
    shutdown: S,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Ok(ConsoleCommand::Help) => writeln!(output, "{HELP}")?,
                    Ok(command) => {
                        if !dispatch(command, handle) {
                            break;
                        }
                    }
                    Err(e) => writeln!(output, "{e}")?,
                }
            }
            Some(event) = events.recv() => writeln!(output, "{}", render_event(&event))?,
        }
        output.flush()?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
