use std::path::Path;

use anyhow::{Context, Result};

use recall_lib::review::PersistenceGateway;
use recall_lib::{aggregate, KnowledgeProbability, MasteryBucket};

use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub async fn run(
    app: &App,
    scope: &str,
    import: Option<&Path>,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    if let Some(path) = import {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let probabilities: Vec<KnowledgeProbability> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse knowledge probabilities in {}", path.display()))?;
        app.gateway.put_knowledge(scope, &probabilities)?;
        log::info!("Imported {} knowledge probabilities for '{}'", probabilities.len(), scope);
    }

    let probabilities = app.gateway.list_knowledge_probabilities(scope).await?;
    let summary = aggregate(&probabilities);

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "scope": scope,
                "bucket": summary.bucket,
                "value": summary.value,
                "subtopics": probabilities,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            let label = terminal::paint(
                summary.bucket.label(),
                terminal::bucket_color(summary.bucket),
                use_color,
            );
            if summary.bucket == MasteryBucket::Unknown {
                println!("{}: {}", scope, label);
            } else {
                println!("{}: {} ({:.0}%)", scope, label, summary.value * 100.0);
            }
            for p in &probabilities {
                println!(
                    "  {:<24} {:>5.1}%  {}/{} correct",
                    p.subtopic_id,
                    p.p_know * 100.0,
                    p.correct_attempts,
                    p.total_attempts
                );
            }
        }
    }

    Ok(())
}
