//! Terminal output for a watched session.
//!
//! Text mode prints only what changed between two snapshots. JSON mode
//! prints every published snapshot as one line.

use std::sync::Arc;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use console::style;
use matchpulse_live::{LiveSnapshot, LiveStatus};
use matchpulse_protocol::{MatchEvent, PlayerPosition};

use crate::cli::OutputFormat;

const BAR_WIDTH: usize = 24;

pub struct Printer {
    format: OutputFormat,
    last: Arc<LiveSnapshot>,
}

impl Printer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            last: Arc::new(LiveSnapshot::default()),
        }
    }

    /// Lines to print for `next`, remembering it as the new baseline.
    pub fn update(&mut self, next: Arc<LiveSnapshot>) -> anyhow::Result<Vec<String>> {
        let lines = match self.format {
            OutputFormat::Json => vec![serde_json::to_string(next.as_ref())?],
            OutputFormat::Text => diff_lines(&self.last, &next),
        };
        self.last = next;
        Ok(lines)
    }

    pub fn emit(&mut self, next: Arc<LiveSnapshot>) -> anyhow::Result<()> {
        for line in self.update(next)? {
            println!("{}", line);
        }
        Ok(())
    }

    /// Closing summary; text mode only.
    pub fn finish(&self, snapshot: &LiveSnapshot) {
        if self.format != OutputFormat::Text {
            return;
        }
        println!();
        if snapshot.status == LiveStatus::Completed {
            println!("  {}", style("Analysis complete").green().bold());
        } else {
            println!("  Stopped while {}", snapshot.status.as_str());
        }
        println!(
            "  {} events, {} tracked players",
            snapshot.events.len(),
            snapshot.tracking_data.len()
        );
        if !snapshot.events.is_empty() {
            println!();
            println!("{}", events_table(&snapshot.events));
        }
        if !snapshot.tracking_data.is_empty() {
            println!();
            println!("{}", tracking_table(&snapshot.tracking_data));
        }
        println!();
    }
}

fn diff_lines(prev: &LiveSnapshot, next: &LiveSnapshot) -> Vec<String> {
    let mut lines = Vec::new();

    if prev.is_connected != next.is_connected {
        lines.push(if next.is_connected {
            format!("{} connected", style("●").green())
        } else {
            format!("{} disconnected", style("○").dim())
        });
    }

    if prev.status != next.status {
        let label = match next.status {
            LiveStatus::Completed => style(next.status.as_str()).green().bold(),
            LiveStatus::Error => style(next.status.as_str()).red().bold(),
            LiveStatus::Active => style(next.status.as_str()).cyan(),
            LiveStatus::Connecting | LiveStatus::Idle => style(next.status.as_str()).dim(),
        };
        lines.push(format!("status    {}", label));
    }

    if prev.error != next.error {
        if let Some(error) = &next.error {
            lines.push(format!("error     {}", style(error).red()));
        }
    }

    if prev.progress != next.progress && next.status != LiveStatus::Idle {
        lines.push(format!(
            "progress  {} {:>5.1}%",
            progress_bar(next.progress),
            next.progress
        ));
    }

    for event in &next.events[already_printed(prev, next)..] {
        lines.push(event_line(event));
    }

    if prev.tracking_data.len() != next.tracking_data.len() && !next.tracking_data.is_empty() {
        lines.push(format!(
            "tracking  {} players",
            next.tracking_data.len()
        ));
    }

    lines
}

/// How many of `next.events` were already shown. Events only grow within a
/// session, so a log that is not an extension of the previous one belongs
/// to a new session (possibly seen only after a lagged reset).
fn already_printed(prev: &LiveSnapshot, next: &LiveSnapshot) -> usize {
    let extends = next.events.len() >= prev.events.len()
        && prev
            .events
            .iter()
            .zip(&next.events)
            .all(|(a, b)| a.id == b.id);
    if extends {
        prev.events.len()
    } else {
        0
    }
}

fn progress_bar(progress: f64) -> String {
    let filled = ((progress / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

/// Match clock for a timestamp in seconds
fn match_clock(timestamp: f64) -> String {
    if !timestamp.is_finite() || timestamp < 0.0 {
        return "--:--".to_string();
    }
    let secs = timestamp as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn event_line(event: &MatchEvent) -> String {
    let mut line = format!(
        "{}     {:<10} {}",
        style(match_clock(event.timestamp)).bold(),
        style(event.event_type.to_uppercase()).yellow(),
        event.team
    );
    if let Some(player) = &event.player {
        line.push_str(&format!(" {}", player));
    }
    if !event.description.is_empty() {
        line.push_str(&format!("  {}", style(&event.description).dim()));
    }
    line
}

fn events_table(events: &[MatchEvent]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Clock", "Type", "Team", "Player", "Description"]);
    for event in events {
        table.add_row(vec![
            Cell::new(match_clock(event.timestamp)),
            Cell::new(&event.event_type),
            Cell::new(&event.team),
            Cell::new(event.player.as_deref().unwrap_or("-")),
            Cell::new(&event.description),
        ]);
    }
    table
}

fn tracking_table(players: &[PlayerPosition]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Player", "X", "Y", "Speed"]);
    for p in players {
        table.add_row(vec![
            Cell::new(&p.player_id),
            Cell::new(format!("{:.1}", p.x)),
            Cell::new(format!("{:.1}", p.y)),
            Cell::new(format!("{:.1}", p.speed)),
        ]);
    }
    table
}
