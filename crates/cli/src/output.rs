//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use conformance_common::{ExecutionSummary, ModuleResult, TestResult};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

fn result_color(result: TestResult) -> Color {
    match result {
        TestResult::Passed => Color::Green,
        TestResult::Failed => Color::Red,
        TestResult::Warning | TestResult::Review => Color::Yellow,
        TestResult::Skipped | TestResult::Unknown => Color::Grey,
    }
}

fn module_row(module: &ModuleResult) -> Vec<Cell> {
    vec![
        Cell::new(&module.name),
        Cell::new(&module.runner_id),
        Cell::new(module.state.as_str()),
        Cell::new(module.result.as_str()).fg(result_color(module.result)),
        Cell::new(module.error_message.as_deref().unwrap_or("")),
    ]
}

/// Render an execution summary in the requested format
pub fn render_summary(summary: &ExecutionSummary, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(summary)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(summary)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Module", "Runner ID", "State", "Result", "Note"]);
            for module in &summary.modules {
                table.add_row(module_row(module));
            }

            let mut counts = format!(
                "Plan {}: {} total, {} passed, {} failed",
                summary.plan_id, summary.total, summary.passed, summary.failed
            );
            if summary.warning > 0 {
                counts.push_str(&format!(", {} warning", summary.warning));
            }
            counts.push_str(&format!(
                ", {} skipped/interrupted",
                summary.skipped + summary.interrupted
            ));
            if summary.not_run > 0 {
                counts.push_str(&format!(", {} not run", summary.not_run));
            }
            if summary.stopped {
                counts.push_str(" (stopped)");
            }
            Ok(format!("{table}\n{}", counts))
        }
    }
}

/// Print an execution summary to stdout
pub fn print_summary(summary: &ExecutionSummary, format: OutputFormat) -> anyhow::Result<()> {
    let rendered = render_summary(summary, format)?;
    println!("{}", rendered);
    Ok(())
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✔".green(), message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✘".red(), message.red());
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow(), message.yellow());
}

#[cfg(test)]
mod tests {
    use super::*;
    use conformance_common::TestState;

    fn summary() -> ExecutionSummary {
        let mut summary = ExecutionSummary::new("plan-1");
        summary.record(ModuleResult {
            name: "oidcc-server".to_string(),
            runner_id: "r1".to_string(),
            state: TestState::Finished,
            result: TestResult::Passed,
            captured: Default::default(),
            error_message: None,
        });
        summary.record(ModuleResult {
            name: "oidcc-idtoken-unsigned".to_string(),
            runner_id: String::new(),
            state: TestState::Created,
            result: TestResult::Skipped,
            captured: Default::default(),
            error_message: Some("not run".to_string()),
        });
        summary.stopped = true;
        summary
    }

    #[test]
    fn test_table_includes_modules_and_counts() {
        let text = render_summary(&summary(), OutputFormat::Table).unwrap();
        assert!(text.contains("oidcc-server"));
        assert!(text.contains("not run"));
        assert!(text.contains("2 total, 1 passed, 0 failed"));
        assert!(text.contains("(stopped)"));
    }

    #[test]
    fn test_json_and_yaml_use_camel_case() {
        let json = render_summary(&summary(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["planId"], "plan-1");
        assert_eq!(value["modules"][1]["errorMessage"], "not run");

        let yaml = render_summary(&summary(), OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("planId: plan-1"));
        assert!(yaml.contains("stopped: true"));
    }
}
