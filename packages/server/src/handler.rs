//! Command dispatch and handlers.
//!
//! Every complete frame decoded off a connection lands here. Handlers are
//! short: they mutate the registries or the mailbox, then reply on the
//! requesting connection through the buffered send path. Registry locks are
//! released before any reply is written.
//!
//! Chat delivery uses the mailbox exclusively — a handler never writes to
//! another connection's socket, so no code path ever holds two connection
//! locks.

use tracing::{debug, info};

use hearth_shared::protocol::{
    Command, Frame, NO_MESSAGE, encode_code, encode_listing, group_command, result_code,
};

use crate::connection::Connection;
use crate::reactor::Core;
use crate::registry::SignInOutcome;

/// Decode the command field and route to its handler.
///
/// Unrecognized commands are logged and silently ignored; a client speaking
/// garbage costs nothing but its own patience.
pub(crate) fn dispatch(core: &Core, conn: &mut Connection, frame: Frame) {
    let command = frame.command();
    let Some(command) = Command::parse(&command) else {
        debug!(token = conn.token, %command, "ignoring unrecognized command");
        return;
    };

    match command {
        Command::SignUp => sign_up(core, conn, &frame),
        Command::SignIn => sign_in(core, conn, &frame),
        Command::ListUsers => list_users(core, conn),
        Command::SingleChat => single_chat(core, conn, &frame),
        Command::GroupChat => group_chat(core, conn, &frame),
        Command::MakeRoom => make_room(core, conn, &frame),
        Command::ListRooms => list_rooms(core, conn),
        Command::EnterRoom => enter_room(core, conn, &frame),
        Command::QuitRoom => quit_room(core, conn, &frame),
        Command::GetMessage => get_message(core, conn),
    }
}

fn reply_code(core: &Core, conn: &mut Connection, code: u32) {
    core.send_bytes(conn, &encode_code(code));
}

fn sign_up(core: &Core, conn: &mut Connection, frame: &Frame) {
    let name = frame.destination();
    let code = if core.directory.sessions.sign_up(&name, &frame.payload()) {
        info!(token = conn.token, %name, "account created");
        result_code::SIGN_UP_SUCCESS
    } else {
        result_code::SIGN_UP_FAIL
    };
    reply_code(core, conn, code);
}

fn sign_in(core: &Core, conn: &mut Connection, frame: &Frame) {
    let name = frame.destination();
    let code = match core
        .directory
        .sessions
        .sign_in(&name, &frame.payload(), conn.token)
    {
        SignInOutcome::Success => {
            info!(token = conn.token, %name, "signed in");
            result_code::SIGN_IN_SUCCESS
        }
        SignInOutcome::UnknownAccount => result_code::SIGN_IN_ACCOUNT_NOT_EXISTENT,
        SignInOutcome::WrongPassword => result_code::SIGN_IN_PASSWORD_ERROR,
    };
    reply_code(core, conn, code);
}

fn list_users(core: &Core, conn: &mut Connection) {
    let names = core.directory.sessions.online_users();
    core.send_bytes(conn, &encode_listing(&names));
}

/// Queue a direct message in the destination's mailbox. Silent no-op when
/// the destination is offline or absent, or the sender is not signed in.
fn single_chat(core: &Core, conn: &mut Connection, frame: &Frame) {
    let Some(sender) = core.directory.sessions.name_of(conn.token) else {
        return;
    };
    let target = frame.destination();
    let Some(target_token) = core.directory.sessions.online_token(&target) else {
        debug!(token = conn.token, %target, "chat target offline or absent");
        return;
    };

    // The delivery frame carries the sender in the destination slot so the
    // recipient knows who is talking.
    match Frame::new(Command::SingleChat.as_str(), &sender, &frame.payload()) {
        Ok(delivery) => core.mailbox.deliver(target_token, delivery),
        Err(e) => debug!(token = conn.token, "dropping undeliverable chat: {e}"),
    }
}

/// Queue a room broadcast for every online member. Silent no-op when the
/// room is missing or the sender is not signed in.
fn group_chat(core: &Core, conn: &mut Connection, frame: &Frame) {
    let room = frame.destination();
    let Some((sender, targets)) = core.directory.group_targets(conn.token, &room) else {
        debug!(token = conn.token, %room, "room missing or sender not signed in");
        return;
    };

    match Frame::new(&group_command(&sender), &room, &frame.payload()) {
        Ok(delivery) => {
            for target in targets {
                core.mailbox.deliver(target, delivery.clone());
            }
        }
        Err(e) => debug!(token = conn.token, "dropping undeliverable broadcast: {e}"),
    }
}

fn make_room(core: &Core, conn: &mut Connection, frame: &Frame) {
    let room = frame.destination();
    let code = if core.directory.rooms.create(&room) {
        info!(token = conn.token, %room, "room created");
        result_code::MAKE_ROOM_SUCCESS
    } else {
        result_code::MAKE_ROOM_FAIL
    };
    reply_code(core, conn, code);
}

fn list_rooms(core: &Core, conn: &mut Connection) {
    let names = core.directory.rooms.names();
    core.send_bytes(conn, &encode_listing(&names));
}

fn enter_room(core: &Core, conn: &mut Connection, frame: &Frame) {
    let code = if core.directory.enter_room(conn.token, &frame.destination()) {
        result_code::ENTER_ROOM_SUCCESS
    } else {
        result_code::ENTER_ROOM_FAIL
    };
    reply_code(core, conn, code);
}

fn quit_room(core: &Core, conn: &mut Connection, frame: &Frame) {
    let code = if core.directory.quit_room(conn.token, &frame.destination()) {
        result_code::QUIT_ROOM_SUCCESS
    } else {
        result_code::QUIT_ROOM_FAIL
    };
    reply_code(core, conn, code);
}

/// Pop the oldest pending frame for this connection, or reply the sentinel.
fn get_message(core: &Core, conn: &mut Connection) {
    let reply = match core.mailbox.collect(conn.token) {
        Some(frame) => frame,
        None => match Frame::new(Command::GetMessage.as_str(), "", NO_MESSAGE) {
            Ok(frame) => frame,
            // Unreachable: the sentinel fields are constants that fit.
            Err(_) => return,
        },
    };
    core.send_bytes(conn, &reply.to_bytes());
}
