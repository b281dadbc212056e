//! Human-readable rendering of scenario reports
//!
//! Applies ANSI colors using crossterm when requested.

use crossterm::style::{Color, Stylize};

use crate::scenario::{Grant, HappyEyesReport, ObserveEvent, ObserveStep};

/// Color a fragment, or leave it as is when colors are off
fn paint(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        format!("{}", text.with(color))
    } else {
        text.to_string()
    }
}

/// Render a happy-eyes run
///
/// - Start times: Cyan
/// - Winner: Green
/// - Failures and errors: Red
pub fn render_happy_eyes(report: &HappyEyesReport, color: bool) -> String {
    let mut lines = Vec::with_capacity(report.starts.len() + report.failures.len() + 1);

    for start in &report.starts {
        lines.push(format!(
            "started {} at {}",
            start.name,
            paint(&format!("{}ms", start.at_ms), Color::Cyan, color)
        ));
    }
    for failure in &report.failures {
        lines.push(format!("  {}", paint(failure, Color::Red, color)));
    }

    match (&report.winner, &report.error) {
        (Some(winner), _) => lines.push(format!(
            "winner: {} after {}ms",
            paint(winner, Color::Green, color),
            report.elapsed_ms
        )),
        (None, Some(error)) => lines.push(format!(
            "no winner after {}ms: {}",
            report.elapsed_ms,
            paint(error, Color::Red, color)
        )),
        (None, None) => lines.push(format!("no winner after {}ms", report.elapsed_ms)),
    }

    lines.join("\n")
}

/// Render the lock grant order, one task per line
pub fn render_lock(grants: &[Grant], color: bool) -> String {
    grants
        .iter()
        .map(|grant| {
            format!(
                "task {} granted ticket {} at {}",
                paint(&grant.task.to_string(), Color::Yellow, color),
                grant.ticket,
                paint(&format!("{}ms", grant.at_ms), Color::Cyan, color)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render keyed observer changes
///
/// Subscriptions are shown as `+key` in green, unsubscriptions as `-key`
/// in red. Steps without changes show `(unchanged)`.
pub fn render_observe(steps: &[ObserveStep], color: bool) -> String {
    steps
        .iter()
        .map(|step| {
            let label = match step.line {
                Some(line) => format!("line {}", line),
                None => "stop".to_string(),
            };
            let events = if step.events.is_empty() {
                "(unchanged)".to_string()
            } else {
                step.events
                    .iter()
                    .map(|event| match event {
                        ObserveEvent::Subscribe(key) => {
                            paint(&format!("+{}", key), Color::Green, color)
                        }
                        ObserveEvent::Unsubscribe(key) => {
                            paint(&format!("-{}", key), Color::Red, color)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            format!("{}: {}", label, events)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
