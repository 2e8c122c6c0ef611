use anyhow::Result;
use chrono::Utc;

use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub fn run(app: &App, limit: usize, format: &OutputFormat, use_color: bool) -> Result<()> {
    let now = Utc::now();
    let due = app.gateway.due_states(now)?;
    let total = due.len();
    let shown: Vec<_> = due.into_iter().take(limit).collect();

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "total": total,
                "items": shown,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if shown.is_empty() {
                println!("Nothing due.");
                return Ok(());
            }
            for state in &shown {
                println!("{}", terminal::state_line(state, use_color));
            }
            if total > shown.len() {
                println!(
                    "{}",
                    terminal::paint(
                        &format!("... and {} more", total - shown.len()),
                        terminal::Color::DIM,
                        use_color
                    )
                );
            }
        }
    }

    Ok(())
}
