//! Line-oriented operator console

use rollcall_util::{AttendanceTypeId, PersonId, RollcallError};
use std::str::FromStr;

pub const HELP: &str = "\
Commands:
  status                          show the current location verdict
  refresh                         discard the current fix and re-acquire
  submit <person> <type> [reason] submit attendance (reason required for leave/sick)
  records <person>                list today's records for a person
  types                           list attendance types
  help                            show this help
  quit                            shut down";

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Refresh,
    Submit {
        person_id: PersonId,
        attendance_type: AttendanceTypeId,
        reason: Option<String>,
    },
    Records {
        person_id: PersonId,
    },
    Types,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = RollcallError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(RollcallError::validation("empty command"));
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "status" => ConsoleCommand::Status,
            "refresh" => ConsoleCommand::Refresh,
            "types" => ConsoleCommand::Types,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            "records" => {
                let person = words
                    .next()
                    .ok_or_else(|| RollcallError::validation("usage: records <person>"))?;
                ConsoleCommand::Records {
                    person_id: PersonId::new(person),
                }
            }
            "submit" => {
                let (Some(person), Some(kind)) = (words.next(), words.next()) else {
                    return Err(RollcallError::validation(
                        "usage: submit <person> <type> [reason...]",
                    ));
                };
                let reason = words.collect::<Vec<_>>().join(" ");
                ConsoleCommand::Submit {
                    person_id: PersonId::new(person),
                    attendance_type: AttendanceTypeId::new(kind),
                    reason: (!reason.is_empty()).then_some(reason),
                }
            }
            other => {
                return Err(RollcallError::validation(format!(
                    "unknown command '{}' (try 'help')",
                    other
                )));
            }
        };

        Ok(command)
    }
}
