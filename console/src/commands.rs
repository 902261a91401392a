//! Line commands typed into the console's stdin

use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{command} needs an argument: {usage}")]
    MissingArgument {
        command: &'static str,
        usage: &'static str,
    },
    #[error("invalid depth {0:?}: expected a non-negative integer")]
    InvalidDepth(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ThroughputSite(String),
    ThroughputCircuit(String),
    RttSite(String),
    RttCircuit(String),
    SiteHeat(String),
    Search(String),
    SiteInfo(String),
    CircuitInfo(String),
    SiteParents(String),
    /// Change the chart window, e.g. `period 1h`
    Period(String),
    /// Re-root the tree view on a node name
    SelectRoot(String),
    /// Back to the global root
    ResetRoot,
    Depth(usize),
    /// Print the rolling series
    History,
    Status,
    Logout,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  site <id>          throughput chart for a site
  circuit <id>       throughput chart for a circuit
  rtt-site <id>      RTT chart for a site
  rtt-circuit <id>   RTT chart for a circuit
  heat <id>          site heatmap
  search <term>      search sites and circuits
  site-info <id>     site details
  circuit-info <id>  circuit details
  parents <id>       site parent chain
  period <window>    chart period, e.g. 5m, 1h
  select <name>      root the tree view on a node
  root               back to the global root
  depth <n>          tree depth limit
  history            print rolling throughput and drops
  status             connection and session state
  logout             forget the stored token
  quit";

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let arg = |command: &'static str, usage: &'static str| -> Result<String, CommandError> {
            if rest.is_empty() {
                Err(CommandError::MissingArgument { command, usage })
            } else {
                Ok(rest.to_string())
            }
        };

        match word {
            "" => Err(CommandError::Empty),
            "site" => arg("site", "site <id>").map(Command::ThroughputSite),
            "circuit" => arg("circuit", "circuit <id>").map(Command::ThroughputCircuit),
            "rtt-site" => arg("rtt-site", "rtt-site <id>").map(Command::RttSite),
            "rtt-circuit" => arg("rtt-circuit", "rtt-circuit <id>").map(Command::RttCircuit),
            "heat" => arg("heat", "heat <id>").map(Command::SiteHeat),
            "search" => arg("search", "search <term>").map(Command::Search),
            "site-info" => arg("site-info", "site-info <id>").map(Command::SiteInfo),
            "circuit-info" => arg("circuit-info", "circuit-info <id>").map(Command::CircuitInfo),
            "parents" => arg("parents", "parents <id>").map(Command::SiteParents),
            "period" => arg("period", "period <window>").map(Command::Period),
            "select" => arg("select", "select <name>").map(Command::SelectRoot),
            "root" => Ok(Command::ResetRoot),
            "depth" => {
                let raw = arg("depth", "depth <n>")?;
                raw.parse()
                    .map(Command::Depth)
                    .map_err(|_| CommandError::InvalidDepth(raw))
            }
            "history" => Ok(Command::History),
            "status" => Ok(Command::Status),
            "logout" => Ok(Command::Logout),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_keeps_inner_spaces() {
        assert_eq!(
            "site   Tower 7 North  ".parse::<Command>(),
            Ok(Command::ThroughputSite("Tower 7 North".to_string()))
        );
        assert_eq!(
            "select Site A".parse::<Command>(),
            Ok(Command::SelectRoot("Site A".to_string()))
        );
    }

    #[test]
    fn test_every_request_command_parses() {
        let cases = [
            ("circuit c1", Command::ThroughputCircuit("c1".into())),
            ("rtt-site s", Command::RttSite("s".into())),
            ("rtt-circuit c", Command::RttCircuit("c".into())),
            ("heat s", Command::SiteHeat("s".into())),
            ("search bob", Command::Search("bob".into())),
            ("site-info s", Command::SiteInfo("s".into())),
            ("circuit-info c", Command::CircuitInfo("c".into())),
            ("parents s", Command::SiteParents("s".into())),
            ("period 1h", Command::Period("1h".into())),
        ];
        for (line, expected) in cases {
            assert_eq!(line.parse::<Command>(), Ok(expected), "{line}");
        }
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!("root".parse::<Command>(), Ok(Command::ResetRoot));
        assert_eq!("history".parse::<Command>(), Ok(Command::History));
        assert_eq!("status".parse::<Command>(), Ok(Command::Status));
        assert_eq!("logout".parse::<Command>(), Ok(Command::Logout));
        assert_eq!("?".parse::<Command>(), Ok(Command::Help));
        assert_eq!(" exit ".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn test_depth() {
        assert_eq!("depth 3".parse::<Command>(), Ok(Command::Depth(3)));
        assert_eq!(
            "depth -1".parse::<Command>(),
            Err(CommandError::InvalidDepth("-1".to_string()))
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!("   ".parse::<Command>(), Err(CommandError::Empty));
        assert_eq!(
            "site".parse::<Command>(),
            Err(CommandError::MissingArgument { command: "site", usage: "site <id>" })
        );
        assert_eq!(
            "reboot now".parse::<Command>(),
            Err(CommandError::Unknown("reboot".to_string()))
        );
    }
}
