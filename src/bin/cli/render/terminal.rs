use recall_lib::review::{algorithm, CardPhase, CardSchedulingState, Grade};
use recall_lib::MasteryBucket;

/// ANSI color codes
#[allow(dead_code)]
pub struct Color;

#[allow(dead_code)]
impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Wrap `text` in `color` when colors are enabled
pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

pub fn bucket_color(bucket: MasteryBucket) -> &'static str {
    match bucket {
        MasteryBucket::Mastered => Color::GREEN,
        MasteryBucket::Learning => Color::YELLOW,
        MasteryBucket::Weak => Color::RED,
        MasteryBucket::Unknown => Color::GRAY,
    }
}

pub fn grade_color(grade: Grade) -> &'static str {
    match grade {
        Grade::Again => Color::RED,
        Grade::Hard => Color::YELLOW,
        Grade::Good => Color::GREEN,
        Grade::Easy => Color::BLUE,
    }
}

pub fn phase_color(phase: CardPhase) -> &'static str {
    match phase {
        CardPhase::New => Color::BLUE,
        CardPhase::Learning | CardPhase::Relearning => Color::YELLOW,
        CardPhase::Review => Color::GREEN,
    }
}

/// One-line summary of a scheduling state
pub fn state_line(state: &CardSchedulingState, use_color: bool) -> String {
    format!(
        "{}  {:<10}  due {}  stab {:.2}  diff {:.2}  reps {}  lapses {}",
        state.item_id,
        paint(state.state.as_str(), phase_color(state.state), use_color),
        state.due_at.format("%Y-%m-%d %H:%M"),
        state.stability,
        state.difficulty,
        state.repetitions,
        state.lapses,
    )
}

/// Grade buttons with their projected intervals, e.g. `again 1d  hard 1d  good 2d  easy 2d`
pub fn preview_line(intervals: &[i64; 4], use_color: bool) -> String {
    Grade::ALL
        .iter()
        .zip(intervals)
        .map(|(grade, days)| {
            format!(
                "{} {}",
                paint(grade.as_str(), grade_color(*grade), use_color),
                algorithm::format_interval(*days)
            )
        })
        .collect::<Vec<_>>()
        .join("  ")
}
