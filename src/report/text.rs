use crate::core::dispatcher::JobReport;
use anyhow::Result;
use std::fmt::Write;

/// Plain-text summary of a finished job, saved next to its outputs
pub fn generate_text_report(report: &JobReport) -> Result<String> {
    let mut output = String::new();

    writeln!(&mut output, "UniRep Run Report")?;
    writeln!(&mut output, "=================")?;
    writeln!(&mut output)?;

    writeln!(&mut output, "Run:         {}", report.run_name)?;
    writeln!(&mut output, "Application: {}", report.application)?;
    writeln!(&mut output, "Model:       {}-dimensional", report.model_size)?;
    match report.weights_dim {
        Some(dim) => writeln!(&mut output, "Weights:     custom bundle ({} dims)", dim)?,
        None => writeln!(&mut output, "Weights:     default")?,
    }
    writeln!(&mut output, "State:       {}", report.state)?;
    writeln!(&mut output)?;

    writeln!(&mut output, "Sequences")?;
    writeln!(&mut output, "---------")?;
    writeln!(&mut output, "- Dispatched: {:6}", report.dispatched)?;
    writeln!(&mut output, "- Invalid:    {:6}", report.invalid.len())?;
    writeln!(&mut output)?;

    if !report.invalid.is_empty() {
        writeln!(&mut output, "Invalid Sequences")?;
        writeln!(&mut output, "-----------------")?;
        for entry in &report.invalid {
            writeln!(&mut output, "- {}: {}", entry.name, entry.sequence)?;
        }
        writeln!(&mut output)?;
    }

    writeln!(&mut output, "Outputs ({})", report.run_dir.display())?;
    writeln!(&mut output, "-------")?;
    for path in &report.written {
        let shown = path.strip_prefix(&report.run_dir).unwrap_or(path);
        writeln!(&mut output, "- {}", shown.display())?;
    }

    Ok(output)
}
