//! Framepost client binary.
//!
//! Thin line-oriented front end over the client library. Events print as
//! they arrive; commands are read from stdin:
//!
//! ```text
//! send <to> <subject> <body…>
//! users
//! log
//! unread
//! read <n>
//! reply <n> <body…>
//! quit
//! ```

use clap::Parser;
use framepost_client::{connect, ServerEvent};
use tracing_subscriber::EnvFilter;

/// Framepost messaging client
#[derive(Parser, Debug)]
#[command(name = "framepost-client")]
#[command(about = "Client for the framepost messaging server")]
#[command(version)]
struct Args {
    /// Server IP address
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    /// Server port
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Username to claim
    #[arg(short, long)]
    username: String,

    /// Client log file
    #[arg(long, default_value = "client.log")]
    log_file: String,
}

fn init_logging(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(std::sync::Arc::new(log_file))
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    Ok(())
}

/// Stdin lines over a channel; the reader thread dies with the process.
fn stdin_lines() -> tokio::sync::mpsc::UnboundedReceiver<String> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    std::thread::spawn(move || {
        use std::io::BufRead;
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    rx
}

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::Ok(message) => println!("[ok] {message}"),
        ServerEvent::Error(message) => println!("[error] {message}"),
        ServerEvent::Message(message) => {
            println!("[mail] from {} - {} ({})", message.from, message.subject, message.timestamp_secs);
        },
        ServerEvent::Users(users) => println!("[users] {}", users.join(", ")),
        ServerEvent::Log(text) => println!("[log]\n{text}"),
        ServerEvent::Closed => println!("[closed] connection lost"),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(err) = init_logging(&args.log_file) {
        eprintln!("cannot open log file {}: {err}", args.log_file);
        std::process::exit(1);
    }

    let addr = format!("{}:{}", args.server, args.port);
    let mut connection = match connect(&addr, &args.username).await {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        },
    };

    println!("Connected as {}. Type 'send <to> <subject> <body>' or 'quit'.", connection.username());

    let mut lines = stdin_lines();

    loop {
        tokio::select! {
            event = connection.next_event() => match event {
                Some(event) => {
                    let closed = event == ServerEvent::Closed;
                    print_event(&event);
                    if closed {
                        break;
                    }
                },
                None => break,
            },
            line = lines.recv() => {
                let Some(line) = line else { break };
                let parts: Vec<&str> = line.split_whitespace().collect();

                let result = match parts.as_slice() {
                    [] => Ok(()),
                    ["quit"] => {
                        connection.disconnect().await;
                        break;
                    },
                    ["send", to, subject, body @ ..] if !body.is_empty() => {
                        connection.send_message(to, subject, &body.join(" ")).await
                    },
                    ["users"] => connection.list_users().await,
                    ["log"] => connection.get_log().await,
                    ["unread"] => {
                        for message in connection.unread() {
                            println!("  #{} from {} - {}", message.index, message.from, message.subject);
                        }
                        println!("{} unread message(s)", connection.unread_count());
                        Ok(())
                    },
                    ["read", index] => match index.parse::<u64>().ok().and_then(|i| connection.read_message(i)) {
                        Some(message) => {
                            println!("From:    {}", message.from);
                            println!("Subject: {}", message.subject);
                            println!("Date:    {}", message.timestamp_secs);
                            println!("\n{}", message.body);
                            Ok(())
                        },
                        None => {
                            println!("no message with that index");
                            Ok(())
                        },
                    },
                    ["reply", index, body @ ..] if !body.is_empty() => {
                        match index.parse::<u64>() {
                            Ok(index) => connection.reply(index, &body.join(" ")).await,
                            Err(_) => {
                                println!("usage: reply <n> <body>");
                                Ok(())
                            },
                        }
                    },
                    _ => {
                        println!("commands: send <to> <subject> <body>, users, log, unread, read <n>, reply <n> <body>, quit");
                        Ok(())
                    },
                };

                if let Err(err) = result {
                    println!("[error] {err}");
                }
            },
        }
    }
}
