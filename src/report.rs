//! Console output for finished sessions.

use crate::session::{SessionReport, Target};

/// Describes a target for humans.
pub fn describe_target(target: Option<Target>) -> String {
    match target {
        Some(Target::PlanSelected(id)) => format!("test plan #{id}"),
        Some(Target::RunSelected(id)) => format!("test run #{id}"),
        Some(Target::RunCreated(id)) => format!("new test run #{id}"),
        Some(Target::Unresolved) | None => "none".to_string(),
    }
}

/// Prints a summary of a finished session to the console.
pub fn print_summary(report: &SessionReport) {
    let total = report.total();

    println!();
    println!("Publishing Results:");
    println!("  Target:     {}", describe_target(report.target));
    println!("  Runs:       {}", report.published.len());
    println!("  Dispatched: {}", total.dispatched);
    println!("  Accepted:   {}", console::style(total.accepted).green());
    println!("  Rejected:   {}", console::style(total.rejected).red());
    println!("  Failed:     {}", console::style(total.failed).red());

    if total.suppressed > 0 {
        println!("  Not in run: {}", console::style(total.suppressed).yellow());
    }
    if total.excluded_blocked > 0 {
        println!(
            "  Blocked:    {}",
            console::style(total.excluded_blocked).yellow()
        );
    }
    for (run_id, error) in &report.errors {
        println!(
            "  {}",
            console::style(format!("Run #{run_id} not published: {error}")).red()
        );
    }
    match report.closed {
        Some(true) => println!("  Closed:     yes"),
        Some(false) => println!("  Closed:     {}", console::style("failed").red()),
        None => {}
    }

    println!();
    if total.dispatched == 0 {
        println!("{}", console::style("No results were published.").yellow().bold());
    } else if total.rejected == 0 && total.failed == 0 && report.errors.is_empty() {
        println!("{}", console::style("All results published!").green().bold());
    } else {
        println!("{}", console::style("Some results were not published.").red().bold());
    }
}
