//! Output formatting for CLI commands.
//!
//! This module renders plans, deployment results, validation results and
//! retrieved resources as colored text or as JSON.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{SchemaHasher, ValidationResult};
use crate::deployer::{DeployResult, DeployStatus};
use crate::planner::{DeploymentPlan, KindPlan, KindReport, KindSummary, ResourceDifference};
use crate::schema::ResourceKind;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan summary row for table display.
#[derive(Tabled)]
struct PlanSummaryRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Create")]
    create: usize,
    #[tabled(rename = "Update")]
    update: usize,
    #[tabled(rename = "Recreate")]
    recreate: usize,
    #[tabled(rename = "Unchanged")]
    unchanged: usize,
    #[tabled(rename = "Skipped")]
    skipped: usize,
    #[tabled(rename = "Existing")]
    existing: usize,
}

/// Deployment outcome row for table display.
#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Created")]
    created: usize,
    #[tabled(rename = "Updated")]
    updated: usize,
    #[tabled(rename = "Deleted")]
    deleted: usize,
    #[tabled(rename = "Forced")]
    forced: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
}

impl From<&KindSummary> for PlanSummaryRow {
    fn from(summary: &KindSummary) -> Self {
        Self {
            kind: summary.kind.to_string(),
            create: summary.create,
            update: summary.update,
            recreate: summary.recreate,
            unchanged: summary.unchanged,
            skipped: summary.skipped,
            existing: summary.existing,
        }
    }
}

impl From<&KindReport> for ReportRow {
    fn from(report: &KindReport) -> Self {
        Self {
            kind: report.kind.clone(),
            created: report.created.len(),
            updated: report.updated.len(),
            deleted: report.deleted.len(),
            forced: report.forced.len(),
            failed: failed_ids(report),
        }
    }
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlanJson::from(plan)),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &DeploymentPlan, detailed: bool) -> String {
        let summaries = plan.summaries();
        if plan.is_noop() && summaries.iter().all(|s| s.existing == 0) {
            return format!("{} No changes required, the schema is up to date.\n", "✓".green());
        }

        let mut output = String::new();
        let _ = writeln!(output, "\nDeployment Plan");
        let _ = writeln!(
            output,
            "   Schema hash: {}",
            SchemaHasher::new().short_hash(&plan.schema_hash)
        );
        let _ = writeln!(
            output,
            "   Policy: existing={}, governance={}\n",
            plan.policy, plan.governance
        );

        let rows: Vec<PlanSummaryRow> = summaries.iter().map(PlanSummaryRow::from).collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            output.push('\n');
            push_planned(&mut output, &plan.spaces);
            push_planned(&mut output, &plan.containers);
            push_planned(&mut output, &plan.views);
            push_planned(&mut output, &plan.data_models);
        }

        let total = |f: fn(&KindSummary) -> usize| summaries.iter().map(f).sum::<usize>();
        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to recreate",
            total(|s| s.create).to_string().green(),
            total(|s| s.update).to_string().yellow(),
            total(|s| s.recreate).to_string().red()
        );

        let existing = total(|s| s.existing);
        if existing > 0 {
            let _ = writeln!(
                output,
                "{} {existing} resource(s) already exist and the policy is 'fail'",
                "⚠".yellow()
            );
        }

        output
    }

    /// Formats the outcome of a deployment.
    #[must_use]
    pub fn format_result(&self, result: &DeployResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(result),
            OutputFormat::Text => Self::format_result_text(result),
        }
    }

    /// Formats a deployment outcome as text.
    fn format_result_text(result: &DeployResult) -> String {
        let status = match result.status {
            DeployStatus::Success => format!("{} Deployment succeeded", "✓".green()),
            DeployStatus::DryRun => format!("{} Dry run, nothing was changed", "○".cyan()),
            DeployStatus::Failure => format!("{} Deployment failed", "✗".red()),
        };

        let mut output = format!("\n{status}\n");
        let _ = writeln!(output, "   Id: {}", result.id);
        let _ = writeln!(
            output,
            "   Duration: {} ms\n",
            (result.finished_at - result.started_at).num_milliseconds()
        );

        let rows: Vec<ReportRow> = result.kinds.iter().map(ReportRow::from).collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        for report in &result.kinds {
            for forced in &report.forced {
                let _ = writeln!(
                    output,
                    "   {} recreated {} {}: {}",
                    "!".yellow(),
                    report.kind,
                    forced.resource_id,
                    forced.reason
                );
            }

            let failures = report
                .failed_created
                .iter()
                .map(|f| ("create", f))
                .chain(report.failed_updated.iter().map(|f| ("update", f)))
                .chain(report.failed_deleted.iter().map(|f| ("delete", f)));
            for (operation, failure) in failures {
                let _ = writeln!(
                    output,
                    "   {} {operation} {} [{}] ({}): {}",
                    "✗".red(),
                    report.kind,
                    failure.resource_ids.join(", "),
                    failure.status_code,
                    failure.error_message
                );
            }
        }

        if result.restored {
            let _ = writeln!(output, "\n{} Changes were restored", "↺".yellow());
        }
        if !result.failed_restored.is_empty() {
            let _ = writeln!(output, "\n{} Restore failed:", "⚠".yellow());
            for failure in &result.failed_restored {
                let _ = writeln!(
                    output,
                    "   - [{}] ({}): {}",
                    failure.resource_ids.join(", "),
                    failure.status_code,
                    failure.error_message
                );
            }
        }

        let _ = writeln!(output, "\n{}", result.message);
        output
    }

    /// Formats a schema validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ValidationJson {
                valid: result.is_valid(),
                errors: result.errors.iter().map(ToString::to_string).collect(),
                warnings: if show_warnings {
                    result.warnings.clone()
                } else {
                    Vec::new()
                },
            }),
            OutputFormat::Text => {
                let mut output = String::new();
                for error in &result.errors {
                    let _ = writeln!(output, "{} {error}", "✗".red());
                }
                if show_warnings {
                    for warning in &result.warnings {
                        let _ = writeln!(output, "{} {warning}", "⚠".yellow());
                    }
                }

                if result.is_valid() {
                    let _ = writeln!(
                        output,
                        "{} Schema is valid ({} warning(s))",
                        "✓".green(),
                        result.warning_count()
                    );
                } else {
                    let _ = writeln!(
                        output,
                        "{} Schema has {} error(s)",
                        "✗".red(),
                        result.error_count()
                    );
                }
                output
            }
        }
    }

    /// Formats retrieved resources: JSON, or YAML for text output.
    #[must_use]
    pub fn format_resources<T: Serialize>(&self, items: &[T]) -> String {
        match self.format {
            OutputFormat::Json => to_json(items),
            OutputFormat::Text => serde_yaml::to_string(items).unwrap_or_default(),
        }
    }

    /// Formats a plain message.
    #[must_use]
    pub fn message(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "message": message })),
            OutputFormat::Text => message.to_string(),
        }
    }
}

/// Lists the planned changes of one kind.
fn push_planned<K: ResourceKind>(output: &mut String, plan: &KindPlan<K>) {
    for id in plan.create_ids() {
        let _ = writeln!(output, "   {} {} {id}", "+".green(), K::NAME);
    }
    for recreate in &plan.to_recreate {
        let _ = writeln!(output, "   {} {} {}", "±".red(), K::NAME, K::write_id(&recreate.item));
    }
    for update in &plan.to_update {
        push_difference(output, K::NAME, &update.difference);
    }
    for id in &plan.existing {
        let _ = writeln!(output, "   {} {} {id}", "!".yellow(), K::NAME);
    }
}

fn push_difference(output: &mut String, kind: &str, difference: &ResourceDifference) {
    let _ = writeln!(output, "   {} {kind} {}", "~".yellow(), difference.resource_id);
    for added in &difference.added {
        let _ = writeln!(output, "       + {}: {}", added.location, added.value_representation);
    }
    for removed in &difference.removed {
        let _ = writeln!(output, "       - {}: {}", removed.location, removed.value_representation);
    }
    for changed in &difference.changed {
        let _ = writeln!(
            output,
            "       ~ {}: {} -> {}",
            changed.location, changed.previous_representation, changed.value_representation
        );
    }
}

/// Number of identities named by failed calls.
fn failed_ids(report: &KindReport) -> usize {
    report
        .failed_created
        .iter()
        .chain(&report.failed_updated)
        .chain(&report.failed_deleted)
        .map(|f| f.resource_ids.len())
        .sum()
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson<'a> {
    schema_hash: &'a str,
    policy: String,
    governance: String,
    noop: bool,
    kinds: Vec<KindSummary>,
    differences: Vec<&'a ResourceDifference>,
}

impl<'a> From<&'a DeploymentPlan> for PlanJson<'a> {
    fn from(plan: &'a DeploymentPlan) -> Self {
        Self {
            schema_hash: &plan.schema_hash,
            policy: plan.policy.to_string(),
            governance: plan.governance.to_string(),
            noop: plan.is_noop(),
            kinds: plan.summaries(),
            differences: plan.differences(),
        }
    }
}

#[derive(Serialize)]
struct ValidationJson {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}
