//! Human-readable rendering of engine results

use calc_engine::{
    CompositeResult, CompositeState, EvaluationOutcome, PersistableRecord, Submission, UnitStatus,
};
use colored::*;

fn status_label(status_code: u16) -> ColoredString {
    match status_code {
        200 => status_code.to_string().green(),
        500 => status_code.to_string().red().bold(),
        _ => status_code.to_string().yellow(),
    }
}

pub fn format_outcome(expression: &str, outcome: &EvaluationOutcome) -> String {
    match outcome.error {
        None => format!("{} = {}", expression, outcome.value.to_string().bold()),
        Some(kind) => format!(
            "{} {} {:?} ({})",
            expression,
            "✗".red(),
            kind,
            status_label(outcome.status_code)
        ),
    }
}

fn state_label(state: CompositeState) -> ColoredString {
    match state {
        CompositeState::Completed => "completed".green(),
        CompositeState::TimedOut => "timed out".yellow(),
        CompositeState::Pending => "pending".normal(),
        CompositeState::Running => "running".normal(),
    }
}

pub fn format_composite(result: &CompositeResult) -> String {
    let mut lines = Vec::with_capacity(result.units.len() + 2);
    for unit in &result.units {
        let line = match &unit.status {
            UnitStatus::Evaluated(outcome) => format_outcome(&unit.expression, outcome),
            UnitStatus::Abandoned => format!("{} {}", unit.expression, "abandoned".dimmed()),
        };
        lines.push(format!("  [{}] {}", unit.index, line));
    }

    let error = match result.last_error {
        Some(kind) => format!(", last error {:?}", kind),
        None => String::new(),
    };
    lines.push(format!(
        "Total: {} (status {}, {}{})",
        result.aggregate_value.to_string().bold(),
        status_label(result.status_code),
        state_label(result.state),
        error
    ));
    lines.join("\n")
}

pub fn format_submission(submission: &Submission) -> String {
    format!(
        "{} Saved as expression {}\n{}",
        "✓".green(),
        submission.expression_id.to_string().cyan(),
        format_composite(&submission.result)
    )
}

pub fn format_record(record: &PersistableRecord) -> String {
    format!(
        "#{:<4} {:>12} {}  {}  {}",
        record.expression_id,
        record.result,
        status_label(record.status_code),
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.expression_text
    )
}

pub fn format_records(user_id: i64, records: &[PersistableRecord]) -> String {
    if records.is_empty() {
        return format!("No calculations for user {}", user_id);
    }
    let mut lines = vec![format!(
        "{} calculation(s) for user {}",
        records.len(),
        user_id.to_string().cyan()
    )];
    lines.extend(records.iter().map(format_record));
    lines.join("\n")
}
