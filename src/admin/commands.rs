//! Console commands read from stdin by the main thread.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Rooms,
    Clients,
    Shutdown,
    Help,
    Unknown(String),
}

/// Parses one console line. Blank lines parse to `None`.
pub fn parse_console_command(line: &str) -> Option<ConsoleCommand> {
    let mut parts = line.trim().split_whitespace();
    let command = parts.next()?;
    let command = command.to_ascii_lowercase();
    let parsed = match command.as_str() {
        "status" => ConsoleCommand::Status,
        "rooms" => ConsoleCommand::Rooms,
        "clients" => ConsoleCommand::Clients,
        "shutdown" | "quit" | "exit" => ConsoleCommand::Shutdown,
        "help" | "?" => ConsoleCommand::Help,
        _ => ConsoleCommand::Unknown(command),
    };
    Some(parsed)
}

pub const HELP_TEXT: &str = "\
commands:
  status     server uptime and counters
  rooms      list rooms with occupancy
  clients    connected client count
  shutdown   stop the server
  help       this text";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ignores_blank_lines() {
        assert_eq!(parse_console_command(""), None);
        assert_eq!(parse_console_command("   \t "), None);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(parse_console_command("STATUS"), Some(ConsoleCommand::Status));
        assert_eq!(parse_console_command("Rooms"), Some(ConsoleCommand::Rooms));
    }

    #[test]
    fn shutdown_aliases() {
        for alias in ["shutdown", "quit", "exit"] {
            assert_eq!(
                parse_console_command(alias),
                Some(ConsoleCommand::Shutdown)
            );
        }
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert_eq!(
            parse_console_command("frobnicate now"),
            Some(ConsoleCommand::Unknown("frobnicate".to_string()))
        );
    }
}
