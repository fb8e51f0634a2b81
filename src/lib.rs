pub mod admin;
pub mod config;
pub mod game;
pub mod net;
pub mod persistence;
pub mod telemetry;

pub use net::packet::{PacketReader, PacketWriter};
pub use net::server::{Network, ServerControl};

use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use admin::commands::{parse_console_command, ConsoleCommand, HELP_TEXT};
use config::{ServerConfig, DEFAULT_CONFIG_FILE};
use game::registry::RoomRegistry;
use persistence::users::UserStore;
use telemetry::logging;

pub fn run(args: &[String]) -> Result<(), String> {
    let config_path = args
        .get(1)
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_FILE);
    let config = ServerConfig::load(Path::new(config_path))?;
    logging::init(&config.log_path(), config.debug_log)?;
    logging::log_info("server starting");

    let users = Arc::new(UserStore::load(&config.data_dir)?);
    println!("petri: {} registered users", users.user_count());

    let registry = RoomRegistry::new();
    registry.start_default_room()?;

    let control = Arc::new(ServerControl::new());
    let client_count = Arc::new(AtomicUsize::new(0));
    let network = Network::bind(
        &config.bind_addr(),
        Arc::clone(&registry),
        Arc::clone(&users),
        Arc::clone(&control),
        Arc::clone(&client_count),
    )?;
    let started = Instant::now();
    let network_handle = std::thread::spawn(move || network.run());

    console_loop(&registry, &client_count, started);

    control.request_shutdown();
    match network_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => eprintln!("petri: network error: {}", err),
        Err(_) => eprintln!("petri: network thread panicked"),
    }
    registry.shutdown();
    logging::log_info("server stopped");
    Ok(())
}

/// Blocks on stdin until a shutdown command or EOF.
fn console_loop(registry: &Arc<RoomRegistry>, client_count: &AtomicUsize, started: Instant) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let Some(command) = parse_console_command(&line) else {
            continue;
        };
        match command {
            ConsoleCommand::Status => {
                let uptime = started.elapsed().as_secs();
                println!(
                    "uptime {}s, {} rooms, {} clients",
                    uptime,
                    registry.room_count(),
                    client_count.load(Ordering::SeqCst)
                );
            }
            ConsoleCommand::Rooms => {
                for room in registry.list() {
                    let (players, capacity) = room.occupancy();
                    println!(
                        "room {} \"{}\" type {}: {}/{}{}",
                        room.id,
                        room.name,
                        room.game_type,
                        players,
                        capacity,
                        if room.is_default { " (default)" } else { "" }
                    );
                }
            }
            ConsoleCommand::Clients => {
                println!("{} clients connected", client_count.load(Ordering::SeqCst));
            }
            ConsoleCommand::Help => println!("{}", HELP_TEXT),
            ConsoleCommand::Shutdown => {
                println!("shutting down");
                break;
            }
            ConsoleCommand::Unknown(word) => {
                println!("unknown command \"{}\", try \"help\"", word);
            }
        }
    }
}
