// Line-oriented key input. Each stdin line is one key event:
//
//   red | blue          choose a color
//   q w a s             press: left punch, right punch, left block, right block
//   -q -w -a -s         release the same keys
//   ready               start the fight without a coordinator
//   win | lose          declare the outcome
//   reset               back to color selection
//   quit                leave

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::condition::{Color, Condition, Side};
use crate::fields;
use crate::session::InputEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Input(InputEvent),
    Quit,
}

fn key(key: &str) -> Option<(Side, Condition)> {
    match key {
        "q" => Some((Side::Left, Condition::Punch)),
        "w" => Some((Side::Right, Condition::Punch)),
        "a" => Some((Side::Left, Condition::Block)),
        "s" => Some((Side::Right, Condition::Block)),
        _ => None,
    }
}

pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim().to_ascii_lowercase();
    let event = match line.as_str() {
        "red" => InputEvent::SelectColor(Color::Red),
        "blue" => InputEvent::SelectColor(Color::Blue),
        "ready" => InputEvent::PeerReady,
        "win" => InputEvent::DeclareOutcome { local_wins: true },
        "lose" => InputEvent::DeclareOutcome { local_wins: false },
        "reset" => InputEvent::ResetRequested,
        "quit" | "exit" => return Some(Command::Quit),
        other => match other.strip_prefix('-') {
            Some(released) => {
                let (side, condition) = key(released)?;
                InputEvent::Release { side, condition }
            }
            None => {
                let (side, condition) = key(other)?;
                InputEvent::Hand { side, condition }
            }
        },
    };
    Some(Command::Input(event))
}

/// Reads stdin until EOF or `quit`. Dropping `inputs` ends the client loop.
pub async fn read_commands(inputs: mpsc::Sender<InputEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!({ fields::ERROR } = %e, "Failed to read input");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(Command::Input(event)) => {
                if inputs.send(event).await.is_err() {
                    break;
                }
            }
            Some(Command::Quit) => break,
            None => warn!(input = %line.trim(), "Unrecognized input"),
        }
    }
    debug!("Input closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings() {
        assert_eq!(
            parse_command("q"),
            Some(Command::Input(InputEvent::Hand {
                side: Side::Left,
                condition: Condition::Punch
            }))
        );
        assert_eq!(
            parse_command(" S "),
            Some(Command::Input(InputEvent::Hand {
                side: Side::Right,
                condition: Condition::Block
            }))
        );
        assert_eq!(
            parse_command("-w"),
            Some(Command::Input(InputEvent::Release {
                side: Side::Right,
                condition: Condition::Punch
            }))
        );
    }

    #[test]
    fn test_session_commands() {
        assert_eq!(
            parse_command("Blue"),
            Some(Command::Input(InputEvent::SelectColor(Color::Blue)))
        );
        assert_eq!(
            parse_command("lose"),
            Some(Command::Input(InputEvent::DeclareOutcome { local_wins: false }))
        );
        assert_eq!(
            parse_command("reset"),
            Some(Command::Input(InputEvent::ResetRequested))
        );
        assert_eq!(parse_command("quit"), Some(Command::Quit));
    }

    #[test]
    fn test_unknown_input() {
        assert_eq!(parse_command("e"), None);
        assert_eq!(parse_command("-"), None);
        assert_eq!(parse_command("--q"), None);
    }
}
