// Line-oriented operator console.
//
// Reads commands from stdin, forwards them to the engine and prints every
// `UiUpdate` as plain text. Ctrl+C and end-of-input both send `Quit`.

use chrono::{DateTime, Local, Utc};
use leadoff_core::alerts::{AlertKey, AlertRecord};
use leadoff_core::snapshot::GameId;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::RefreshInterval;
use crate::protocol::{CycleReport, UiUpdate, UserCommand};

pub const HELP: &str = "commands: clear | interval <secs> | watch <name> | unwatch <name> | \
resolve <game> <inning> <batter> <outcome> | quit";

#[derive(Debug, Error, PartialEq)]
pub enum CommandParseError {
    #[error("unknown command {0:?}; {help}", help = HELP)]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse one non-empty operator line.
pub fn parse_command(line: &str) -> Result<UserCommand, CommandParseError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "clear" => Ok(UserCommand::ClearAlerts),
        "quit" | "exit" => Ok(UserCommand::Quit),
        "interval" => {
            let secs: u64 = rest
                .parse()
                .map_err(|_| CommandParseError::Usage("interval <secs>"))?;
            let interval = RefreshInterval::from_secs(secs)
                .map_err(|e| CommandParseError::Invalid(e.to_string()))?;
            Ok(UserCommand::SetRefreshInterval(interval))
        }
        "watch" if !rest.is_empty() => Ok(UserCommand::Watch(rest.to_string())),
        "watch" => Err(CommandParseError::Usage("watch <name>")),
        "unwatch" if !rest.is_empty() => Ok(UserCommand::Unwatch(rest.to_string())),
        "unwatch" => Err(CommandParseError::Usage("unwatch <name>")),
        "resolve" => parse_resolve(rest),
        other => Err(CommandParseError::Unknown(other.to_string())),
    }
}

fn parse_resolve(rest: &str) -> Result<UserCommand, CommandParseError> {
    const USAGE: &str = "resolve <game> <inning> <batter> <outcome>";

    let (game, rest) = next_word(rest);
    let (inning, rest) = next_word(rest);
    let (batter, outcome) = next_word(rest);

    let (Ok(game_id), Ok(target_inning), Ok(batter_id)) =
        (game.parse::<u64>(), inning.parse::<u32>(), batter.parse::<u64>())
    else {
        return Err(CommandParseError::Usage(USAGE));
    };
    let outcome = outcome.trim();
    if outcome.is_empty() {
        return Err(CommandParseError::Usage(USAGE));
    }

    Ok(UserCommand::ResolveAlert {
        key: AlertKey {
            game_id: GameId(game_id),
            target_inning,
            batter_id,
        },
        outcome: outcome.to_string(),
    })
}

/// Split off the first whitespace-delimited word.
fn next_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (s, ""),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn alert_line(record: &AlertRecord) -> String {
    format!(
        "{} leads off inning {} for {} (game {}, batter {}, detected {})",
        record.batter_name,
        record.target_inning,
        record.team_name,
        record.game_id,
        record.batter_id,
        local_time(record.detected_at)
    )
}

fn render_cycle(report: &CycleReport, lines: &mut Vec<String>) {
    lines.push(format!(
        "[{}] checked {} live game(s)",
        local_time(report.checked_at),
        report.live_games
    ));
    for alert in &report.new_alerts {
        lines.push(format!("ALERT: {}", alert_line(alert)));
    }
    if !report.pinned.is_empty() {
        lines.push(format!("pinned alerts ({}):", report.pinned.len()));
        for alert in &report.pinned {
            lines.push(format!("  {}", alert_line(alert)));
        }
    }
    for failure in &report.failures {
        match failure.game_id {
            Some(game_id) => lines.push(format!("  game {game_id} failed: {}", failure.reason)),
            None => lines.push(format!("  schedule failed: {}", failure.reason)),
        }
    }
    for line in &report.debug_lines {
        lines.push(format!("  {line}"));
    }
    if let Some(error) = &report.persistence_error {
        lines.push(format!("WARNING: alert log not saved: {error}"));
    }
}

/// Text lines for one engine update.
pub fn render(update: &UiUpdate) -> Vec<String> {
    let mut lines = Vec::new();
    match update {
        UiUpdate::Cycle(report) => render_cycle(report, &mut lines),
        UiUpdate::AlertsCleared => lines.push("alert history cleared".to_string()),
        UiUpdate::AlertResolved(key) => lines.push(format!(
            "resolved alert for game {} inning {} batter {}",
            key.game_id, key.target_inning, key.batter_id
        )),
        UiUpdate::RefreshIntervalChanged(interval) => lines.push(format!(
            "refresh interval set to {}s (from the next cycle)",
            interval.as_secs()
        )),
        UiUpdate::WatchlistChanged(names) if names.is_empty() => {
            lines.push("watchlist is empty".to_string())
        }
        UiUpdate::WatchlistChanged(names) => {
            lines.push(format!("watching: {}", names.join(", ")))
        }
        UiUpdate::CommandRejected(reason) => lines.push(format!("error: {reason}")),
    }
    lines
}

// ---------------------------------------------------------------------------
// Console loop
// ---------------------------------------------------------------------------

/// Run the console until the operator quits. Prints updates from `ui_rx` and
/// sends parsed stdin commands through `cmd_tx`.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()> {
    println!("{HELP}");

    let printer = tokio::spawn(async move {
        while let Some(update) = ui_rx.recv().await {
            for line in render(&update) {
                println!("{line}");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed, quitting");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(UserCommand::Quit) => break,
                    Ok(cmd) => {
                        if cmd_tx.send(cmd).await.is_err() {
                            break;
                        }
                        println!("queued; applies at the next refresh");
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, quitting");
                break;
            }
        }
    }

    let _ = cmd_tx.send(UserCommand::Quit).await;
    drop(cmd_tx);
    let _ = printer.await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::GameFailure;
    use chrono::TimeZone;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("clear"), Ok(UserCommand::ClearAlerts));
        assert_eq!(parse_command("  QUIT "), Ok(UserCommand::Quit));
        assert_eq!(
            parse_command("watch  Jeremy Peña "),
            Ok(UserCommand::Watch("Jeremy Peña".into()))
        );
        assert_eq!(
            parse_command("unwatch Jeremy Peña"),
            Ok(UserCommand::Unwatch("Jeremy Peña".into()))
        );
    }

    #[test]
    fn interval_is_range_checked() {
        assert_eq!(
            parse_command("interval 30"),
            Ok(UserCommand::SetRefreshInterval(
                RefreshInterval::from_secs(30).unwrap()
            ))
        );
        assert!(matches!(
            parse_command("interval 5"),
            Err(CommandParseError::Invalid(_))
        ));
        assert_eq!(
            parse_command("interval soon"),
            Err(CommandParseError::Usage("interval <secs>"))
        );
    }

    #[test]
    fn resolve_takes_key_and_free_text_outcome() {
        assert_eq!(
            parse_command("resolve 745001 5 660271 Home run"),
            Ok(UserCommand::ResolveAlert {
                key: AlertKey {
                    game_id: GameId(745001),
                    target_inning: 5,
                    batter_id: 660271,
                },
                outcome: "Home run".into(),
            })
        );
        assert!(matches!(
            parse_command("resolve 745001 5 660271"),
            Err(CommandParseError::Usage(_))
        ));
        assert!(matches!(
            parse_command("resolve abc 5 1 Out"),
            Err(CommandParseError::Usage(_))
        ));
    }

    #[test]
    fn missing_arguments_and_unknown_words_are_errors() {
        assert!(matches!(parse_command("watch"), Err(CommandParseError::Usage(_))));
        assert!(matches!(parse_command("unwatch   "), Err(CommandParseError::Usage(_))));
        assert_eq!(
            parse_command("refresh now"),
            Err(CommandParseError::Unknown("refresh".into()))
        );
    }

    #[test]
    fn renders_cycle_report() {
        let detected = Utc.with_ymd_and_hms(2026, 6, 14, 23, 5, 0).unwrap();
        let alert = AlertRecord {
            game_id: GameId(1),
            target_inning: 5,
            batter_id: 5,
            batter_name: "E".into(),
            team_name: "Visitors".into(),
            detected_at: detected,
            outcome: None,
        };
        let report = CycleReport {
            checked_at: detected,
            live_games: 2,
            new_alerts: vec![alert.clone()],
            pinned: vec![alert],
            failures: vec![GameFailure {
                game_id: Some(GameId(2)),
                reason: "HTTP 502".into(),
            }],
            debug_lines: vec!["Visitors - Inning 4 (Top), Outs: 3".into()],
            persistence_error: Some("disk full".into()),
        };

        let lines = render(&UiUpdate::Cycle(report));
        assert!(lines[0].ends_with("checked 2 live game(s)"));
        assert!(lines[1].starts_with("ALERT: E leads off inning 5 for Visitors (game 1"));
        assert_eq!(lines[2], "pinned alerts (1):");
        assert!(lines.contains(&"  game 2 failed: HTTP 502".to_string()));
        assert!(lines.contains(&"  Visitors - Inning 4 (Top), Outs: 3".to_string()));
        assert_eq!(
            lines.last().unwrap(),
            "WARNING: alert log not saved: disk full"
        );
    }

    #[test]
    fn renders_command_feedback() {
        assert_eq!(
            render(&UiUpdate::WatchlistChanged(vec![])),
            vec!["watchlist is empty".to_string()]
        );
        assert_eq!(
            render(&UiUpdate::WatchlistChanged(vec!["A".into(), "B".into()])),
            vec!["watching: A, B".to_string()]
        );
        assert_eq!(
            render(&UiUpdate::CommandRejected("A is already in your list".into())),
            vec!["error: A is already in your list".to_string()]
        );
    }
}
