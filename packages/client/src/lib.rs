//! Client library for the Hearth chat server.
//!
//! [`ChatClient`] speaks the fixed-size binary protocol over one blocking
//! TCP connection: each method sends a single frame and, where the protocol
//! answers, reads back the 4-byte result code, the list response, or the
//! reply frame. Asynchronously delivered chat messages are polled with
//! [`ChatClient::get_message`].

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use thiserror::Error;

use hearth_shared::protocol::{
    CODE_LEN, Command, FRAME_LEN, Frame, NAME_LEN, NO_MESSAGE, ProtocolError, decode_code,
    decode_listing, group_sender,
};

/// Client-side errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection to the server failed or broke mid-request.
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    /// The server's reply (or our own request) violated the wire format.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// A blocking connection to a Hearth server.
pub struct ChatClient {
    stream: TcpStream,
}

impl ChatClient {
    /// Connect to the server.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        if let Ok(peer) = stream.peer_addr() {
            tracing::debug!(%peer, "connected");
        }
        Ok(ChatClient { stream })
    }

    fn send(&mut self, command: Command, destination: &str, payload: &str) -> Result<(), ClientError> {
        let frame = Frame::new(command.as_str(), destination, payload)?;
        self.stream.write_all(&frame.to_bytes())?;
        Ok(())
    }

    fn read_code(&mut self) -> Result<u32, ClientError> {
        let mut buf = [0u8; CODE_LEN];
        self.stream.read_exact(&mut buf)?;
        Ok(decode_code(&buf)?)
    }

    /// Register a new account. Returns the server's result code.
    pub fn sign_up(&mut self, name: &str, password: &str) -> Result<u32, ClientError> {
        self.send(Command::SignUp, name, password)?;
        self.read_code()
    }

    /// Sign in to an existing account. Returns the server's result code.
    pub fn sign_in(&mut self, name: &str, password: &str) -> Result<u32, ClientError> {
        self.send(Command::SignIn, name, password)?;
        self.read_code()
    }

    fn list(&mut self, command: Command) -> Result<Vec<String>, ClientError> {
        self.send(command, "", "")?;
        let count = self.read_code()? as usize;
        let mut records = vec![0u8; count * NAME_LEN];
        self.stream.read_exact(&mut records)?;
        Ok(decode_listing(&records, count)?)
    }

    /// Names of all users currently online.
    pub fn list_users(&mut self) -> Result<Vec<String>, ClientError> {
        self.list(Command::ListUsers)
    }

    /// Names of all rooms on the server.
    pub fn list_rooms(&mut self) -> Result<Vec<String>, ClientError> {
        self.list(Command::ListRooms)
    }

    /// Send a direct message. Fire-and-forget: the server does not reply,
    /// and an offline or unknown destination is silently dropped.
    pub fn single_chat(&mut self, to: &str, text: &str) -> Result<(), ClientError> {
        self.send(Command::SingleChat, to, text)
    }

    /// Broadcast to a room. Fire-and-forget, like [`single_chat`](Self::single_chat).
    pub fn group_chat(&mut self, room: &str, text: &str) -> Result<(), ClientError> {
        self.send(Command::GroupChat, room, text)
    }

    fn room_op(&mut self, command: Command, room: &str) -> Result<u32, ClientError> {
        self.send(command, room, "")?;
        self.read_code()
    }

    /// Create a room. Returns the server's result code.
    pub fn make_room(&mut self, room: &str) -> Result<u32, ClientError> {
        self.room_op(Command::MakeRoom, room)
    }

    /// Join a room. Returns the server's result code.
    pub fn enter_room(&mut self, room: &str) -> Result<u32, ClientError> {
        self.room_op(Command::EnterRoom, room)
    }

    /// Leave a room. Returns the server's result code.
    pub fn quit_room(&mut self, room: &str) -> Result<u32, ClientError> {
        self.room_op(Command::QuitRoom, room)
    }

    /// Poll for the oldest queued chat message, if any.
    pub fn get_message(&mut self) -> Result<Option<Frame>, ClientError> {
        self.send(Command::GetMessage, "", "")?;
        let mut buf = vec![0u8; FRAME_LEN];
        self.stream.read_exact(&mut buf)?;
        let frame = Frame::from_bytes(&buf)?;
        if is_sentinel(&frame) {
            Ok(None)
        } else {
            Ok(Some(frame))
        }
    }
}

/// Whether a `getmsg` reply is the empty-mailbox sentinel.
fn is_sentinel(frame: &Frame) -> bool {
    frame.command() == Command::GetMessage.as_str() && frame.payload() == NO_MESSAGE
}

/// Render an incoming chat frame the way the interactive client displays it:
/// `(sender) : text` for direct chat, `(sender, room) : text` for room chat.
pub fn format_incoming(frame: &Frame) -> String {
    match group_sender(&frame.command()) {
        Some(sender) => format!("({}, {}) : {}", sender, frame.destination(), frame.payload()),
        None => format!("({}) : {}", frame.destination(), frame.payload()),
    }
}
