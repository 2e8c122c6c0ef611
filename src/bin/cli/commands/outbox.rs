use anyhow::Result;

use crate::app::App;
use crate::OutputFormat;

pub fn run_status(app: &App, format: &OutputFormat) -> Result<()> {
    let outbox = app.open_outbox()?;
    let pending = outbox.pending()?;
    let dead = outbox.dead_letters()?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": outbox.path().to_string_lossy(),
                "pending": pending,
                "deadLetters": dead,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Outbox: {}", outbox.path().display());
            println!("  {} pending, {} dead-lettered", pending.len(), dead.len());
            for entry in &pending {
                println!("  #{:<6} {}  {}", entry.seq, entry.enqueued_at.format("%Y-%m-%d %H:%M:%S"), entry.job.describe());
            }
            for letter in &dead {
                println!("  dead    {}: {}", letter.entry.job.describe(), letter.error);
            }
        }
    }

    Ok(())
}

pub async fn run_flush(app: &App, format: &OutputFormat) -> Result<()> {
    let outbox = app.open_outbox()?;
    // Safe alongside a running review: the outbox's flush lock keeps the two
    // from delivering the same entry
    let report = outbox.flush_once(app.gateway.as_ref()).await?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "delivered": report.delivered,
                "deadLettered": report.dead_lettered,
                "remaining": report.remaining,
                "blockedBy": report.blocked_by,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!(
                "Delivered {}, dead-lettered {}, {} remaining",
                report.delivered, report.dead_lettered, report.remaining
            );
            if let Some(reason) = &report.blocked_by {
                println!("Stopped early: {}", reason);
            }
        }
    }

    Ok(())
}
