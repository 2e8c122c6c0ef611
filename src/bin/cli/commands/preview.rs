use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use recall_lib::review::{algorithm, CardSchedulingState, Grade};

use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub fn run(app: &App, item: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let item_id = Uuid::parse_str(item).with_context(|| format!("Invalid item id '{}'", item))?;
    let now = Utc::now();
    let state = app
        .gateway
        .get_state(item_id)?
        .unwrap_or_else(|| CardSchedulingState::new(item_id, now));
    let intervals = algorithm::preview_intervals(&state, now);

    match format {
        OutputFormat::Json => {
            let mut days = serde_json::Map::new();
            for (grade, interval) in Grade::ALL.iter().zip(intervals) {
                days.insert(grade.as_str().to_string(), interval.into());
            }
            let output = serde_json::json!({
                "state": state,
                "intervalDays": days,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("{}", terminal::state_line(&state, use_color));
            println!("{}", terminal::preview_line(&intervals, use_color));
        }
    }

    Ok(())
}
