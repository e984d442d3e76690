//! Fixed-size binary wire protocol.
//!
//! Every message between client and server is exactly [`FRAME_LEN`] bytes:
//!
//! ```text
//! +----------------+--------------------+------------------+
//! | command        | destination        | payload          |
//! | (100 bytes)    | (100 bytes)        | (1024 bytes)     |
//! +----------------+--------------------+------------------+
//! ```
//!
//! Fields are null-padded ASCII with no length prefix or delimiter; framing
//! relies entirely on the fixed size, so receivers must reassemble fragments
//! until a full 1224-byte frame is available. Short numeric replies (result
//! codes, list counts) are little-endian `u32` values.

use thiserror::Error;

/// Width of the command and destination fields, and of one list-response
/// name record.
pub const NAME_LEN: usize = 100;

/// Width of the payload field.
pub const PAYLOAD_LEN: usize = 1024;

/// Total size of one frame on the wire.
pub const FRAME_LEN: usize = NAME_LEN + NAME_LEN + PAYLOAD_LEN;

/// Size of a numeric result-code or list-count reply.
pub const CODE_LEN: usize = 4;

/// Sentinel payload returned by `getmsg` when no message is pending.
pub const NO_MESSAGE: &str = "none";

/// Command prefix tagging room-chat delivery frames (`gpchat <sender>`).
pub const GROUP_TAG: &str = "gpchat ";

/// Errors produced by the codec boundary.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A text field does not fit its fixed-width slot.
    #[error("field `{field}` is {len} bytes, at most {max} allowed")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A byte buffer is not the size the protocol requires.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Result codes for account and room operations.
///
/// Each operation's success/failure pair occupies distinct bit positions.
/// Codes travel as little-endian `u32`.
pub mod result_code {
    pub const SIGN_UP_SUCCESS: u32 = 0x0000_0001;
    pub const SIGN_UP_FAIL: u32 = 0x0000_0002;
    pub const SIGN_IN_SUCCESS: u32 = 0x0000_0004;
    pub const SIGN_IN_ACCOUNT_NOT_EXISTENT: u32 = 0x0000_0008;
    pub const SIGN_IN_PASSWORD_ERROR: u32 = 0x0000_0010;
    pub const MAKE_ROOM_SUCCESS: u32 = 0x0000_0020;
    pub const MAKE_ROOM_FAIL: u32 = 0x0000_0040;
    pub const ENTER_ROOM_SUCCESS: u32 = 0x0000_0080;
    pub const ENTER_ROOM_FAIL: u32 = 0x0000_0100;
    pub const QUIT_ROOM_SUCCESS: u32 = 0x0000_0200;
    pub const QUIT_ROOM_FAIL: u32 = 0x0000_0400;
}

/// The request commands a client may send, matched exactly and
/// case-sensitively against the frame's command field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SignUp,
    SignIn,
    ListUsers,
    SingleChat,
    GroupChat,
    MakeRoom,
    ListRooms,
    EnterRoom,
    QuitRoom,
    GetMessage,
}

impl Command {
    /// Parse a wire command string. Returns `None` for anything unrecognized;
    /// the server silently ignores those.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "signup" => Some(Command::SignUp),
            "signin" => Some(Command::SignIn),
            "lsuser" => Some(Command::ListUsers),
            "sgchat" => Some(Command::SingleChat),
            "gpchat" => Some(Command::GroupChat),
            "mkroom" => Some(Command::MakeRoom),
            "lsroom" => Some(Command::ListRooms),
            "cdroom" => Some(Command::EnterRoom),
            "qtroom" => Some(Command::QuitRoom),
            "getmsg" => Some(Command::GetMessage),
            _ => None,
        }
    }

    /// The exact string sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SignUp => "signup",
            Command::SignIn => "signin",
            Command::ListUsers => "lsuser",
            Command::SingleChat => "sgchat",
            Command::GroupChat => "gpchat",
            Command::MakeRoom => "mkroom",
            Command::ListRooms => "lsroom",
            Command::EnterRoom => "cdroom",
            Command::QuitRoom => "qtroom",
            Command::GetMessage => "getmsg",
        }
    }
}

/// One fixed-layout wire message.
///
/// The fields are stored exactly as they travel: fixed-width, null-padded
/// byte arrays. Accessors trim at the first NUL; construction validates that
/// input fits, so a `Frame` can always be encoded losslessly.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    command: [u8; NAME_LEN],
    destination: [u8; NAME_LEN],
    payload: [u8; PAYLOAD_LEN],
}

impl Frame {
    /// Build a frame from text fields, rejecting anything that does not fit
    /// its fixed-width slot.
    pub fn new(command: &str, destination: &str, payload: &str) -> Result<Self, ProtocolError> {
        Ok(Frame {
            command: pack("command", command)?,
            destination: pack("destination", destination)?,
            payload: pack("payload", payload)?,
        })
    }

    /// Decode a frame from exactly [`FRAME_LEN`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != FRAME_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: FRAME_LEN,
                actual: bytes.len(),
            });
        }

        let mut frame = Frame {
            command: [0; NAME_LEN],
            destination: [0; NAME_LEN],
            payload: [0; PAYLOAD_LEN],
        };
        frame.command.copy_from_slice(&bytes[..NAME_LEN]);
        frame
            .destination
            .copy_from_slice(&bytes[NAME_LEN..2 * NAME_LEN]);
        frame.payload.copy_from_slice(&bytes[2 * NAME_LEN..]);
        Ok(frame)
    }

    /// Encode the frame into its wire representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_LEN);
        bytes.extend_from_slice(&self.command);
        bytes.extend_from_slice(&self.destination);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// The command field, trimmed at the first NUL.
    pub fn command(&self) -> String {
        unpack(&self.command)
    }

    /// The destination field, trimmed at the first NUL.
    pub fn destination(&self) -> String {
        unpack(&self.destination)
    }

    /// The payload field, trimmed at the first NUL.
    pub fn payload(&self) -> String {
        unpack(&self.payload)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("command", &self.command())
            .field("destination", &self.destination())
            .field("payload", &self.payload())
            .finish()
    }
}

/// Copy `src` into a null-padded fixed-width field.
fn pack<const N: usize>(field: &'static str, src: &str) -> Result<[u8; N], ProtocolError> {
    let bytes = src.as_bytes();
    if bytes.len() > N {
        return Err(ProtocolError::FieldTooLong {
            field,
            len: bytes.len(),
            max: N,
        });
    }
    let mut out = [0u8; N];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

/// Read a null-padded field back out, tolerating non-UTF-8 garbage from
/// misbehaving peers.
fn unpack(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Encode a numeric result code or list count.
pub fn encode_code(code: u32) -> [u8; CODE_LEN] {
    code.to_le_bytes()
}

/// Decode a numeric result code or list count.
pub fn decode_code(bytes: &[u8]) -> Result<u32, ProtocolError> {
    let arr: [u8; CODE_LEN] = bytes.try_into().map_err(|_| ProtocolError::InvalidLength {
        expected: CODE_LEN,
        actual: bytes.len(),
    })?;
    Ok(u32::from_le_bytes(arr))
}

/// Encode a list response: a little-endian `u32` count followed by `count`
/// fixed [`NAME_LEN`]-byte name records.
pub fn encode_listing(names: &[String]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(CODE_LEN + names.len() * NAME_LEN);
    bytes.extend_from_slice(&encode_code(names.len() as u32));
    for name in names {
        // Names entered the registry through a NAME_LEN-wide frame field, so
        // they always fit a record.
        let mut record = [0u8; NAME_LEN];
        let n = name.len().min(NAME_LEN);
        record[..n].copy_from_slice(&name.as_bytes()[..n]);
        bytes.extend_from_slice(&record);
    }
    bytes
}

/// Decode the name records of a list response (the count has already been
/// read separately, as the reply is consumed in two steps).
pub fn decode_listing(bytes: &[u8], count: usize) -> Result<Vec<String>, ProtocolError> {
    if bytes.len() != count * NAME_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: count * NAME_LEN,
            actual: bytes.len(),
        });
    }
    Ok(bytes.chunks_exact(NAME_LEN).map(unpack).collect())
}

/// Tag a room-chat delivery frame with its sender: `gpchat <sender>`.
///
/// The result is truncated to fit the command field, so a pathologically
/// long sender name loses its tail rather than corrupting the frame.
pub fn group_command(sender: &str) -> String {
    let mut tagged = format!("{GROUP_TAG}{sender}");
    if tagged.len() > NAME_LEN {
        let mut cut = NAME_LEN;
        while !tagged.is_char_boundary(cut) {
            cut -= 1;
        }
        tagged.truncate(cut);
    }
    tagged
}

/// Extract the sender from a `gpchat <sender>` delivery command.
pub fn group_sender(command: &str) -> Option<&str> {
    command.strip_prefix(GROUP_TAG)
}
