//! Interactive Hearth chat client.
//!
//! Connects to a Hearth server, walks through sign-up/sign-in, then reads
//! commands from a prompt. Chat delivery is polled: use `getmsg` to fetch
//! queued messages.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hearth-client
//! cargo run --bin hearth-client -- --host 127.0.0.1 --port 5000
//! ```

use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use hearth_client::{ChatClient, ClientError, format_incoming};
use hearth_shared::logger::setup_logger;
use hearth_shared::protocol::result_code;

#[derive(Parser, Debug)]
#[command(name = "hearth-client")]
#[command(about = "Interactive chat client for the Hearth server", long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to connect to
    #[arg(short = 'p', long, default_value_t = 5000)]
    port: u16,
}

fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "warn");

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("client error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = match ChatClient::connect((args.host.as_str(), args.port)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("can't connect to server at {}:{}: {e}", args.host, args.port);
            std::process::exit(1);
        }
    };
    println!("Connected to {}:{}.", args.host, args.port);

    let mut editor = DefaultEditor::new()?;
    if !get_into_service(&mut client, &mut editor)? {
        return Ok(());
    }
    println!("Type `help` for the command list.\n");

    loop {
        let line = match editor.readline("$ ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            input_error();
            continue;
        }
        let _ = editor.add_history_entry(&line);

        let words: Vec<&str> = line.split_whitespace().collect();
        match words[0] {
            "sgchat" if words.len() >= 3 => {
                client.single_chat(words[1], &words[2..].join(" "))?;
            }
            "gpchat" if words.len() >= 3 => {
                client.group_chat(words[1], &words[2..].join(" "))?;
            }
            "mkroom" if words.len() >= 2 => {
                report_room_op(client.make_room(words[1])?, "room created", "room already exists");
            }
            "cdroom" if words.len() >= 2 => {
                report_room_op(client.enter_room(words[1])?, "entered room", "no such room");
            }
            "qtroom" if words.len() >= 2 => {
                report_room_op(client.quit_room(words[1])?, "left room", "not in that room");
            }
            "getmsg" => get_message(&mut client)?,
            "lsuser" => print_listing("online users", &client.list_users()?),
            "lsroom" => print_listing("rooms", &client.list_rooms()?),
            "help" | "h" => help(),
            "quit" => break,
            _ => input_error(),
        }

        println!();
    }

    Ok(())
}

/// The sign-up/sign-in loop run before the command prompt.
///
/// Returns `false` if the user bailed out (Ctrl+C / Ctrl+D).
fn get_into_service(
    client: &mut ChatClient,
    editor: &mut DefaultEditor,
) -> Result<bool, Box<dyn std::error::Error>> {
    loop {
        let choice = match editor.readline("signup or signin ? ") {
            Ok(line) => line.trim().to_string(),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if choice != "signup" && choice != "signin" {
            input_error();
            continue;
        }

        let name = match editor.readline("Username : ") {
            Ok(line) => line.trim().to_string(),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let password = match editor.readline("Password : ") {
            Ok(line) => line.trim().to_string(),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if name.is_empty() || password.is_empty() {
            input_error();
            continue;
        }

        if choice == "signup" {
            match client.sign_up(&name, &password)? {
                result_code::SIGN_UP_SUCCESS => {
                    client.sign_in(&name, &password)?;
                    println!("Welcome, {name}!\n");
                    return Ok(true);
                }
                _ => println!("that name is already taken"),
            }
        } else {
            match client.sign_in(&name, &password)? {
                result_code::SIGN_IN_SUCCESS => {
                    println!("Welcome back, {name}!\n");
                    return Ok(true);
                }
                result_code::SIGN_IN_ACCOUNT_NOT_EXISTENT => println!("no such account"),
                _ => println!("wrong password"),
            }
        }
    }
}

fn get_message(client: &mut ChatClient) -> Result<(), ClientError> {
    match client.get_message()? {
        Some(frame) => println!("{}", format_incoming(&frame)),
        None => println!("no pending messages"),
    }
    Ok(())
}

fn report_room_op(code: u32, success: &str, failure: &str) {
    let ok = code
        & (result_code::MAKE_ROOM_SUCCESS
            | result_code::ENTER_ROOM_SUCCESS
            | result_code::QUIT_ROOM_SUCCESS)
        != 0;
    println!("{}", if ok { success } else { failure });
}

fn print_listing(what: &str, names: &[String]) {
    println!("{} {}:", names.len(), what);
    for name in names {
        println!("  {name}");
    }
}

fn help() {
    println!("commands:");
    println!("  sgchat <user> <text>   send a direct message");
    println!("  gpchat <room> <text>   send a message to a room");
    println!("  mkroom <room>          create a room");
    println!("  cdroom <room>          join a room");
    println!("  qtroom <room>          leave a room");
    println!("  getmsg                 fetch the next queued message");
    println!("  lsuser                 list online users");
    println!("  lsroom                 list rooms");
    println!("  help                   show this help");
    println!("  quit                   exit");
}

fn input_error() {
    println!("unrecognized input; type `help` for the command list");
}
