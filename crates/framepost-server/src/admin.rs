//! Operator console.
//!
//! Reads slash commands from stdin and drives the server through
//! [`ServerHandle`] - the console has no privileged path of its own, so
//! everything here is equally reachable from tests.
//!
//! Stdin is read on a plain OS thread (a blocked read must not pin the
//! async runtime at shutdown); lines cross into the async world over a
//! channel.

use std::io::{BufRead, Write};

use tokio::sync::mpsc;

use crate::ServerHandle;

struct ConsoleCommand {
    name: &'static str,
    usage: &'static str,
    description: &'static str,
    min_args: usize,
}

const COMMANDS: &[ConsoleCommand] = &[
    ConsoleCommand { name: "help", usage: "/help", description: "Show this help", min_args: 0 },
    ConsoleCommand {
        name: "broadcast",
        usage: "/broadcast <message>",
        description: "Send to all clients",
        min_args: 1,
    },
    ConsoleCommand {
        name: "send",
        usage: "/send <user> <message>",
        description: "Send to one client",
        min_args: 2,
    },
    ConsoleCommand { name: "list", usage: "/list", description: "List connected clients", min_args: 0 },
    ConsoleCommand { name: "kick", usage: "/kick <user>", description: "Disconnect a client", min_args: 1 },
    ConsoleCommand { name: "ban", usage: "/ban <user>", description: "Ban a client", min_args: 1 },
    ConsoleCommand { name: "unban", usage: "/unban <user>", description: "Unban a user", min_args: 1 },
    ConsoleCommand { name: "stats", usage: "/stats", description: "Show statistics", min_args: 0 },
    ConsoleCommand {
        name: "set",
        usage: "/set <key> <value>",
        description: "Change a runtime config value",
        min_args: 2,
    },
    ConsoleCommand { name: "config", usage: "/config", description: "List runtime config", min_args: 0 },
    ConsoleCommand { name: "reset", usage: "/reset", description: "Reset runtime config", min_args: 0 },
    ConsoleCommand { name: "stop", usage: "/stop", description: "Stop the server", min_args: 0 },
];

/// Run the console until shutdown or EOF on stdin.
pub(crate) async fn command_loop(handle: ServerHandle) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    tracing::info!("Operator console ready - type /help to see commands");

    let mut shutdown = handle.shutdown.subscribe();

    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => break,
            line = rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        handle_line(&handle, line.trim()).await;

        print!("admin> ");
        let _ = std::io::stdout().flush();
    }
}

async fn handle_line(handle: &ServerHandle, line: &str) {
    if line.is_empty() {
        return;
    }

    if !line.starts_with('/') {
        println!("Commands must start with '/'. Type /help");
        return;
    }

    let parts: Vec<&str> = line[1..].split_whitespace().collect();
    let Some(&name) = parts.first() else {
        return;
    };

    let Some(cmd) = COMMANDS.iter().find(|c| c.name == name) else {
        println!("Unknown command: /{name}");
        return;
    };

    if parts.len() - 1 < cmd.min_args {
        println!("Usage: {}", cmd.usage);
        return;
    }

    match cmd.name {
        "help" => cmd_help(),
        "broadcast" => cmd_broadcast(handle, &parts).await,
        "send" => cmd_send(handle, &parts).await,
        "list" => cmd_list(handle).await,
        "kick" => cmd_kick(handle, parts[1]).await,
        "ban" => cmd_ban(handle, parts[1]).await,
        "unban" => cmd_unban(handle, parts[1]).await,
        "stats" => cmd_stats(handle).await,
        "set" => cmd_set(handle, parts[1], parts[2]).await,
        "config" => cmd_config(handle).await,
        "reset" => cmd_reset(handle).await,
        "stop" => {
            println!("Stopping server...");
            handle.stop();
        },
        _ => unreachable!("command table covers every name"),
    }
}

fn cmd_help() {
    println!("Available commands:");
    for cmd in COMMANDS {
        println!("  {:<24} - {}", cmd.usage, cmd.description);
    }
}

async fn cmd_broadcast(handle: &ServerHandle, parts: &[&str]) {
    let message = parts[1..].join(" ");

    let sent = handle.broadcast(&message).await;
    if sent == 0 {
        println!("[Admin] No clients connected");
    } else {
        println!("[Admin] Broadcast sent to {sent} client(s)");
        tracing::info!("Admin broadcast: {message}");
    }
}

async fn cmd_send(handle: &ServerHandle, parts: &[&str]) {
    let username = parts[1];
    let message = parts[2..].join(" ");

    if handle.send_direct(username, &message).await {
        println!("[Admin] Message sent to {username}");
        tracing::info!("Admin message to {username}: {message}");
    } else {
        println!("[Admin] User '{username}' not found");
    }
}

async fn cmd_list(handle: &ServerHandle) {
    let clients = handle.usernames().await;

    if clients.is_empty() {
        println!("[Admin] No clients connected");
        return;
    }

    println!("\n=== Connected clients ({}) ===", clients.len());
    for username in clients {
        println!("  - {username}");
    }
    println!("================================\n");
}

async fn cmd_kick(handle: &ServerHandle, username: &str) {
    if handle.kick(username).await {
        println!("[Admin] User '{username}' disconnected");
        tracing::info!("Admin kicked user: {username}");
    } else {
        println!("[Admin] User '{username}' not found");
    }
}

async fn cmd_ban(handle: &ServerHandle, username: &str) {
    if handle.ban(username).await {
        println!("[Admin] User '{username}' banned and disconnected");
        tracing::info!("Admin banned user: {username}");
    } else {
        println!("[Admin] User '{username}' not found");
    }
}

async fn cmd_unban(handle: &ServerHandle, username: &str) {
    if handle.unban(username).await {
        println!("[Admin] User '{username}' unbanned");
        tracing::info!("Admin unbanned user: {username}");
    } else {
        println!("[Admin] User '{username}' is not in the banlist");
    }
}

async fn cmd_stats(handle: &ServerHandle) {
    let stats = handle.stats().await;

    let secs = stats.uptime.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    println!("\n========== STATISTICS ==========");
    println!("Port:              {}", stats.port);
    println!("Uptime:            {hours:02}:{minutes:02}:{seconds:02}");
    println!("--------------------------------");
    println!("Clients:           {}", stats.clients.len());
    println!("Messages received: {}", stats.messages_received);
    println!("Messages sent:     {}", stats.messages_sent);
    println!("Queued:            {}", stats.queued);
    println!("Messages/min:      {:.2}", stats.messages_per_minute());
    println!("================================");

    if !stats.clients.is_empty() {
        println!("\nOnline clients:");
        for (i, username) in stats.clients.iter().enumerate() {
            println!("  {}. {username}", i + 1);
        }
    }
    println!();
}

async fn cmd_set(handle: &ServerHandle, key: &str, value: &str) {
    match handle.set_config(key, value).await {
        Ok(()) => {
            println!("[OK] {key} = {value}");
            tracing::info!("Configuration modified: {key} = {value}");
        },
        Err(err) => println!("[FAILED] {err}"),
    }
}

async fn cmd_config(handle: &ServerHandle) {
    println!("\n========== CONFIGURATION ==========");
    for (key, value) in handle.config_entries().await {
        println!("  {key:<28} = {value}");
    }
    println!("===================================\n");
}

async fn cmd_reset(handle: &ServerHandle) {
    handle.reset_config().await;
    println!("[OK] Configuration reset to defaults");
    tracing::info!("Configuration reset to default values");
}
