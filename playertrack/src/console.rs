//! Line-oriented console for a running tracker.
//!
//! Control commands (`pause`, `resume`, `frequency <n>`, `distance <n>`) go
//! to the [`Controller`]. The console itself answers `status`,
//! `history <player>`, `help` and `quit`.

use chrono::DateTime;
use playertrack_core::{ControlError, Controller, IntervalStore, SchedulerState, StayInterval};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP: &str = "\
  pause              - Stop recording (the timer keeps running)
  resume             - Start recording again
  frequency <secs>   - Seconds between samples
  distance <blocks>  - Distance that starts a new interval
  status             - Show tracker status
  history <player>   - List a player's stay intervals
  help               - Show this help
  quit               - Stop tracking and exit";

/// Read commands from stdin until `quit`, end of input, or Ctrl-C.
pub async fn run(mut controller: Controller, store: Arc<dyn IntervalStore>) -> io::Result<()> {
    println!("=== playertrack ===");
    println!("{HELP}");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };

        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("quit") | Some("exit") => {
                println!("Goodbye!");
                break;
            }
            Some("help") => {
                println!("[HELP]");
                println!("{HELP}");
            }
            Some("status") => print_status(&controller, store.as_ref()).await,
            Some("history") => match parts.next() {
                Some(player) => print_history(store.as_ref(), player).await,
                None => println!("[ERROR] Usage: history <player>"),
            },
            _ => match controller.execute(line).await {
                Ok(command) => println!("[OK] {command}"),
                Err(ControlError::UnknownCommand(word)) => {
                    println!("[ERROR] Unknown command '{word}'. Type help for help.");
                }
                Err(e) => println!("[ERROR] {e}"),
            },
        }
    }

    Ok(())
}

async fn print_status(controller: &Controller, store: &dyn IntervalStore) {
    let handle = controller.handle();
    let state = match handle.state() {
        SchedulerState::Running => "running",
        SchedulerState::Paused => "paused",
        SchedulerState::Stopped => "stopped",
    };

    println!("[STATUS]");
    println!("  State: {state}");
    println!("  Frequency: {}s", handle.frequency_secs());
    println!("  Min distance: {} blocks", handle.min_distance());
    println!("  Tracked players: {}", handle.tracked_entities());
    match store.count().await {
        Ok(count) => println!("  Stored intervals: {count}"),
        Err(e) => {
            warn!(error = %e, "interval count failed");
            println!("  Stored intervals: unavailable ({e})");
        }
    }
}

async fn print_history(store: &dyn IntervalStore, player: &str) {
    let intervals = match store.intervals_for(player).await {
        Ok(intervals) => intervals,
        Err(e) => {
            println!("[ERROR] History lookup failed: {e}");
            return;
        }
    };

    if intervals.is_empty() {
        println!("[HISTORY] No intervals for {player}");
        return;
    }

    println!("[HISTORY] {player}");
    for interval in &intervals {
        println!("  {}", format_interval(interval));
    }
}

fn format_interval(interval: &StayInterval) -> String {
    format!(
        "{} {} at {} from {} to {} ({}s)",
        interval.id,
        interval.world,
        interval.position,
        format_timestamp(interval.start),
        format_timestamp(interval.stop),
        interval.duration_secs()
    )
}

fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use playertrack_core::{IntervalId, Position};

    #[test]
    fn test_format_interval() {
        let interval = StayInterval {
            id: IntervalId(3),
            entity: "Steve".to_string(),
            world: "world".to_string(),
            position: Position::new(10, 64, -5),
            start: 0,
            stop: 90,
        };
        assert_eq!(
            format_interval(&interval),
            "#3 world at (10, 64, -5) from 1970-01-01 00:00:00 to 1970-01-01 00:01:30 (90s)"
        );
    }
}
