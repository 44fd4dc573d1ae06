//! Upload protocol messages.
//!
//! The transport already preserves frame boundaries, so no message carries
//! a length prefix. Three kinds of payload share the connection:
//!
//! | Direction | Frame | Payload |
//! |-----------|-------|---------|
//! | client → server | text/binary | JSON control message (`init`, `exit`) |
//! | client → server | binary | file content or end-of-file marker |
//! | server → client | text | `ready`, `reject`, `next`, `progress\|<n>`, `error\|<reason>` |
//!
//! ## Init Message
//!
//! ```text
//! {"command":"init","username":"alice","token":"...",
//!  "filenames":"a.txt|b.txt","sizes":"5|3","boundary":"#END#","framing":"tagged"}
//! ```
//!
//! `framing` is optional and defaults to `boundary`, which keeps the
//! message compatible with peers that never send it.
//!
//! ## Chunk Framing
//!
//! - `boundary`: data frames are raw bytes; a frame equal to the boundary
//!   token ends the file. A content slice that happens to equal the token
//!   is taken as end-of-file; this is a limitation of the mode.
//! - `tagged`: byte 0 is a tag. `0x00` + bytes is content, a lone `0x01`
//!   ends the file.

pub mod boundary;

pub use boundary::BoundaryToken;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::file::{Manifest, ManifestEntry};

/// Separator used in the `filenames`/`sizes` fields and in replies.
pub const FIELD_SEPARATOR: char = '|';

/// Tag byte for a content frame in tagged framing.
pub const TAG_DATA: u8 = 0x00;

/// Tag byte for an end-of-file frame in tagged framing.
pub const TAG_END_OF_FILE: u8 = 0x01;

/// How binary frames are split into content and end-of-file markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    /// Raw content frames, end-of-file is the boundary token
    #[default]
    Boundary,
    /// One-byte tag on every frame
    Tagged,
}

impl FramingMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boundary => "boundary",
            Self::Tagged => "tagged",
        }
    }

    /// Classify an inbound binary frame.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation for tagged frames with a missing or
    /// unknown tag, or an end-of-file tag followed by bytes.
    pub fn classify<'a>(self, frame: &'a [u8], boundary: &BoundaryToken) -> Result<ChunkFrame<'a>> {
        match self {
            Self::Boundary if boundary.matches(frame) => Ok(ChunkFrame::EndOfFile),
            Self::Boundary => Ok(ChunkFrame::Data(frame)),
            Self::Tagged => match frame.split_first() {
                Some((&TAG_DATA, data)) => Ok(ChunkFrame::Data(data)),
                Some((&TAG_END_OF_FILE, [])) => Ok(ChunkFrame::EndOfFile),
                Some((&TAG_END_OF_FILE, rest)) => Err(Error::violation(
                    "uploading",
                    format!("end-of-file frame carries {} trailing bytes", rest.len()),
                )),
                Some((tag, _)) => Err(Error::violation(
                    "uploading",
                    format!("unknown frame tag {tag:#04x}"),
                )),
                None => Err(Error::violation("uploading", "empty tagged frame")),
            },
        }
    }

    /// Encode a content slice for sending.
    #[must_use]
    pub fn encode_data(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Boundary => data.to_vec(),
            Self::Tagged => {
                let mut frame = Vec::with_capacity(data.len() + 1);
                frame.push(TAG_DATA);
                frame.extend_from_slice(data);
                frame
            }
        }
    }

    /// Encode the end-of-file marker for sending.
    #[must_use]
    pub fn encode_end_of_file(self, boundary: &BoundaryToken) -> Vec<u8> {
        match self {
            Self::Boundary => boundary.as_bytes().to_vec(),
            Self::Tagged => vec![TAG_END_OF_FILE],
        }
    }
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FramingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "boundary" => Ok(Self::Boundary),
            "tagged" => Ok(Self::Tagged),
            other => Err(Error::MalformedMessage(format!(
                "unknown framing mode '{other}'"
            ))),
        }
    }
}

/// A classified inbound binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFrame<'a> {
    /// File content to append
    Data(&'a [u8]),
    /// End of the current file
    EndOfFile,
}

/// Fields of the `init` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitMessage {
    /// Destination identity; files land under `<root>/<username>/`
    pub username: String,
    /// Security token (carried, never validated)
    pub token: String,
    /// Files to upload, in order
    pub manifest: Manifest,
    /// End-of-file marker for boundary framing
    pub boundary: BoundaryToken,
    /// Chunk framing for this session
    pub framing: FramingMode,
}

/// A decoded control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Start a session
    Init(InitMessage),
    /// End a session
    Exit,
    /// Any other command value
    Other(String),
}

/// JSON shape of a control message. Every field is a string on the wire.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireControl {
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filenames: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sizes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    boundary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    framing: Option<String>,
}

fn parse_wire(payload: &[u8]) -> Result<WireControl> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| Error::MalformedMessage("control message is not UTF-8".to_string()))?;
    serde_json::from_str(text).map_err(|e| Error::MalformedMessage(e.to_string()))
}

fn required(field: Option<String>, key: &str) -> Result<String> {
    match field {
        Some(value) if !value.is_empty() => Ok(value),
        Some(_) => Err(Error::MalformedMessage(format!("'{key}' is empty"))),
        None => Err(Error::MalformedMessage(format!("'{key}' is missing"))),
    }
}

/// Read only the `command` field of a control message.
///
/// # Errors
///
/// Returns [`Error::MalformedMessage`] if the payload is not a JSON object
/// with a non-empty `command`.
pub fn decode_command(payload: &[u8]) -> Result<String> {
    required(parse_wire(payload)?.command, "command")
}

impl ControlMessage {
    /// Command name as sent on the wire.
    #[must_use]
    pub fn command(&self) -> &str {
        match self {
            Self::Init(_) => "init",
            Self::Exit => "exit",
            Self::Other(command) => command,
        }
    }

    /// Decode a control message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMessage`] when the payload is not UTF-8
    /// JSON, or for `init` when a required key is absent or empty, a file
    /// name is empty, a size is not an unsigned integer, or the name and
    /// size counts differ.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let wire = parse_wire(payload)?;
        let command = required(wire.command, "command")?;

        match command.as_str() {
            "init" => {
                let username = required(wire.username, "username")?;
                let token = required(wire.token, "token")?;
                let filenames = required(wire.filenames, "filenames")?;
                let sizes = required(wire.sizes, "sizes")?;
                let boundary = BoundaryToken::parse(&required(wire.boundary, "boundary")?)?;
                let framing = wire
                    .framing
                    .as_deref()
                    .map_or(Ok(FramingMode::Boundary), FramingMode::from_str)?;

                let names: Vec<&str> = filenames.split(FIELD_SEPARATOR).collect();
                let sizes: Vec<&str> = sizes.split(FIELD_SEPARATOR).collect();
                if names.len() != sizes.len() {
                    return Err(Error::MalformedMessage(format!(
                        "{} file names but {} sizes",
                        names.len(),
                        sizes.len()
                    )));
                }

                let mut entries = Vec::with_capacity(names.len());
                for (name, size) in names.into_iter().zip(sizes) {
                    if name.is_empty() {
                        return Err(Error::MalformedMessage("empty file name".to_string()));
                    }
                    let size = size.trim().parse::<u64>().map_err(|_| {
                        Error::MalformedMessage(format!("invalid size '{size}' for '{name}'"))
                    })?;
                    entries.push(ManifestEntry::new(name, size));
                }

                Ok(Self::Init(InitMessage {
                    username,
                    token,
                    manifest: Manifest::new(entries),
                    boundary,
                    framing,
                }))
            }
            "exit" => Ok(Self::Exit),
            _ => Ok(Self::Other(command)),
        }
    }

    /// Encode the message as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let wire = match self {
            Self::Init(init) => {
                let join = |values: Vec<String>| values.join(&FIELD_SEPARATOR.to_string());
                WireControl {
                    command: Some("init".to_string()),
                    username: Some(init.username.clone()),
                    token: Some(init.token.clone()),
                    filenames: Some(join(
                        init.manifest.entries().iter().map(|e| e.name.clone()).collect(),
                    )),
                    sizes: Some(join(
                        init.manifest.entries().iter().map(|e| e.size.to_string()).collect(),
                    )),
                    boundary: Some(init.boundary.as_str().to_string()),
                    framing: match init.framing {
                        FramingMode::Boundary => None,
                        FramingMode::Tagged => Some(init.framing.to_string()),
                    },
                }
            }
            Self::Exit => WireControl {
                command: Some("exit".to_string()),
                ..WireControl::default()
            },
            Self::Other(command) => WireControl {
                command: Some(command.clone()),
                ..WireControl::default()
            },
        };
        serde_json::to_vec(&wire).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// A text reply from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply {
    /// Init accepted, start sending file 0
    Ready,
    /// Init refused
    Reject,
    /// End-of-file received, send the next file
    Next,
    /// Cumulative bytes written for the current file
    Progress(u64),
    /// A reported failure or protocol violation
    Error(String),
}

impl ServerReply {
    /// Encode as reply text.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Ready => "ready".to_string(),
            Self::Reject => "reject".to_string(),
            Self::Next => "next".to_string(),
            Self::Progress(bytes) => format!("progress{FIELD_SEPARATOR}{bytes}"),
            Self::Error(reason) => format!("error{FIELD_SEPARATOR}{reason}"),
        }
    }

    /// Parse reply text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMessage`] for unknown replies or a
    /// non-numeric progress count.
    pub fn parse(text: &str) -> Result<Self> {
        let (head, rest) = match text.split_once(FIELD_SEPARATOR) {
            Some((head, rest)) => (head, Some(rest)),
            None => (text, None),
        };
        match (head, rest) {
            ("ready", None) => Ok(Self::Ready),
            ("reject", None) => Ok(Self::Reject),
            ("next", None) => Ok(Self::Next),
            ("progress", Some(bytes)) => bytes
                .parse()
                .map(Self::Progress)
                .map_err(|_| Error::MalformedMessage(format!("invalid progress '{bytes}'"))),
            ("error", rest) => Ok(Self::Error(rest.unwrap_or_default().to_string())),
            _ => Err(Error::MalformedMessage(format!("unknown reply '{text}'"))),
        }
    }
}

impl fmt::Display for ServerReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
