use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use recall_lib::review::{
    algorithm, CardSchedulingState, Grade, ReviewController, ReviewItem, SessionHandle,
};

use crate::app::App;
use crate::render::terminal::{self, Color};
use crate::OutputFormat;

/// How long spawned best-effort writes get before the runtime shuts down
const BEST_EFFORT_GRACE: Duration = Duration::from_millis(200);

pub async fn run(
    app: &App,
    items: Option<&str>,
    limit: usize,
    grades: Option<&str>,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let queue = build_queue(app, items, limit)?;
    if queue.is_empty() {
        match format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "session": null })),
            OutputFormat::Plain => println!("Nothing due."),
        }
        return Ok(());
    }

    let scripted = grades.map(parse_grades).transpose()?;
    let (mut controller, flusher) = app.controller()?;
    let Some(handle) = controller.start_session(queue).await else {
        bail!("Failed to start a review session");
    };

    if matches!(format, OutputFormat::Plain) && handle.is_local() {
        println!(
            "{}",
            terminal::paint(
                "Store unavailable, reviewing offline",
                Color::YELLOW,
                use_color
            )
        );
    }

    match scripted {
        Some(grades) => grade_scripted(&mut controller, &handle, &grades, format, use_color)?,
        None => grade_interactive(&mut controller, &handle, use_color)?,
    }

    match flusher {
        Some(flusher) => flusher.shutdown().await,
        None => tokio::time::sleep(BEST_EFFORT_GRACE).await,
    }

    let stats = controller.stats();
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "session": controller.session(),
                "local": handle.is_local(),
                "stats": stats,
                "events": controller.events(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            let status = if controller.is_complete() { "complete" } else { "unfinished" };
            println!(
                "Session {} {}: {}/{} graded, {} recalled",
                handle.id(),
                status,
                stats.graded,
                stats.total,
                stats.correct
            );
            if let Some(avg) = stats.average_response_ms {
                println!("Average response time: {:.1}s", avg / 1000.0);
            }
        }
    }

    Ok(())
}

/// Explicit ids (new items start fresh) or the due queue
fn build_queue(app: &App, items: Option<&str>, limit: usize) -> Result<Vec<ReviewItem>> {
    match items {
        Some(list) => {
            let mut queue = Vec::new();
            for id in App::parse_item_ids(list)? {
                queue.push(ReviewItem {
                    item_id: id,
                    state: app.gateway.get_state(id)?,
                });
            }
            Ok(queue)
        }
        None => Ok(app
            .gateway
            .due_states(Utc::now())?
            .into_iter()
            .take(limit)
            .map(ReviewItem::with_state)
            .collect()),
    }
}

fn parse_grades(list: &str) -> Result<Vec<Grade>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Grade>().with_context(|| format!("Invalid grade '{}'", s)))
        .collect()
}

fn grade_scripted(
    controller: &mut ReviewController,
    handle: &SessionHandle,
    grades: &[Grade],
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    for grade in grades {
        let Some(item_id) = controller.current_item().map(|i| i.item_id) else {
            log::warn!("More grades than items, ignoring the rest");
            break;
        };
        let outcome = controller.grade(handle, item_id, *grade)?;
        if matches!(format, OutputFormat::Plain) {
            println!(
                "{}  {}  next in {}",
                item_id,
                terminal::paint(grade.as_str(), terminal::grade_color(*grade), use_color),
                algorithm::format_interval(algorithm::interval_days(outcome.state.stability))
            );
        }
    }
    Ok(())
}

fn grade_interactive(
    controller: &mut ReviewController,
    handle: &SessionHandle,
    use_color: bool,
) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    while let Some(item) = controller.current_item().cloned() {
        let now = Utc::now();
        let state = item
            .state
            .clone()
            .unwrap_or_else(|| CardSchedulingState::new(item.item_id, now));
        let stats = controller.stats();

        println!();
        println!(
            "{}",
            terminal::paint(
                &format!("[{}/{}]", stats.graded + 1, stats.total),
                Color::DIM,
                use_color
            )
        );
        println!("{}", terminal::state_line(&state, use_color));
        println!(
            "{}",
            terminal::preview_line(&algorithm::preview_intervals(&state, now), use_color)
        );

        let grade = loop {
            print!("Grade (1-4 or again/hard/good/easy, q to stop): ");
            io::stdout().flush()?;

            let Some(line) = lines.next() else {
                return Ok(());
            };
            let line = line?;
            let input = line.trim();
            if input.eq_ignore_ascii_case("q") {
                return Ok(());
            }
            match input.parse::<Grade>() {
                Ok(grade) => break grade,
                Err(e) => println!("{}", terminal::paint(&e.to_string(), Color::RED, use_color)),
            }
        };

        let outcome = controller.grade(handle, item.item_id, grade)?;
        println!("Next review {}", outcome.state.due_at.format("%Y-%m-%d %H:%M"));
    }

    Ok(())
}
