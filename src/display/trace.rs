use crate::solver::{DiagnosticStatus, FeasibilityResult};
use crate::validation::StructuralReport;
use std::fmt::Write;

const RULE: &str = "--------------------------------------------------";

pub fn format_structural_trace(label: &str, report: &StructuralReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "STRUCTURAL VALIDITY for '{}':", label);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Score: {:.2} (grade {})", report.score, report.grade);
    let _ = writeln!(out, "{}", report.details);
    if report.penalties.is_empty() {
        let _ = writeln!(out, "No penalties.");
    } else {
        let _ = writeln!(out, "Penalties:");
        for p in &report.penalties {
            let _ = writeln!(out, "  - {}", p);
        }
    }
    out
}

pub fn format_feasibility_trace(result: &FeasibilityResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "FEASIBILITY TRACE for run {}:", result.run_id);
    let _ = writeln!(out, "Constraint set: {}", result.constraint_set_id);
    if let Some(year) = result.target_year {
        let _ = writeln!(out, "Target year: {}", year);
    }
    let _ = writeln!(out, "{}", RULE);

    let width = result.sector_codes.iter().map(|c| c.len()).max().unwrap_or(0).max(6);
    let _ = writeln!(
        out,
        "{:<width$} {:>14} {:>14} {:>14}",
        "Sector",
        "Unconstrained",
        "Feasible",
        "Gap",
        width = width
    );
    for (i, code) in result.sector_codes.iter().enumerate() {
        let marker = if result.gap_vs_unconstrained[i] > 0.0 { " *" } else { "" };
        let _ = writeln!(
            out,
            "{:<width$} {:>14.3} {:>14.3} {:>14.3}{}",
            code,
            result.unconstrained_delta[i],
            result.feasible_delta[i],
            result.gap_vs_unconstrained[i],
            marker,
            width = width
        );
    }
    let _ = writeln!(
        out,
        "Total output gap: {:.3} ({:.1}%)",
        result.total_output_gap,
        result.total_output_gap_pct * 100.0
    );

    if !result.binding_constraints.is_empty() {
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "Binding constraints:");
        for b in &result.binding_constraints {
            let _ = writeln!(
                out,
                "  [{}] {} on {}: {:.3} -> {:.3} ({:.1}% cut, {:?})",
                b.constraint_id,
                b.constraint_type,
                b.sector_code,
                b.unconstrained_value,
                b.constrained_value,
                b.gap_pct * 100.0,
                b.confidence
            );
            if !b.rationale.is_empty() {
                let _ = writeln!(out, "      {}", b.rationale);
            }
        }
    }

    if !result.diagnostics.is_empty() {
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "Diagnostics:");
        for d in &result.diagnostics {
            let status = match d.status {
                DiagnosticStatus::Pass => "PASS",
                DiagnosticStatus::Fail => "FAIL",
                DiagnosticStatus::NotEvaluated => "NOT EVALUATED",
            };
            let _ = writeln!(out, "  {} {}: {}", status, d.constraint_type, d.message);
        }
    }
    out
}
