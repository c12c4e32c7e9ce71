use std::io::{self, Write};

use super::run::TideRun;

/// Write the dAP tables for one run.
pub(crate) fn write_run_summary(out: &mut dyn Write, run: &TideRun) -> io::Result<()> {
    writeln!(out, "-- {} --", run.name)?;
    writeln!(out)?;
    writeln!(
        out,
        "{} AP @ {:.0}: {:.2}",
        run.mode.name(),
        run.pos_threshold * 100.0,
        run.ap()
    )?;
    writeln!(out)?;

    let main = run.main_errors();
    let mut header = vec!["Type".to_string()];
    let mut row = vec!["dAP".to_string()];
    for (kind, dap) in &main {
        header.push(kind.short_name().to_string());
        row.push(format!("{:.2}", dap));
    }
    write_table(out, "Main Errors", &header, &[row])?;
    writeln!(out)?;

    let special = run.special_errors();
    let mut header = vec!["Type".to_string()];
    let mut row = vec!["dAP".to_string()];
    for (kind, dap) in &special {
        header.push(kind.short_name().to_string());
        row.push(format!("{:.2}", dap));
    }
    write_table(out, "Special Error", &header, &[row])?;
    writeln!(out)
}

fn write_table(
    out: &mut dyn Write,
    title: &str,
    header: &[String],
    rows: &[Vec<String>],
) -> io::Result<()> {
    let widths: Vec<usize> = (0..header.len())
        .map(|col| {
            std::iter::once(&header[col])
                .chain(rows.iter().filter_map(|row| row.get(col)))
                .map(String::len)
                .max()
                .unwrap_or(0)
                + 3
        })
        .collect();
    let total = widths.iter().sum::<usize>() + 2;

    writeln!(out, "{:^width$}", title, width = total)?;
    writeln!(out, "{}", "=".repeat(total))?;
    writeln!(out, "{}", format_row(header, &widths))?;
    writeln!(out, "{}", "-".repeat(total))?;
    for row in rows {
        writeln!(out, "{}", format_row(row, &widths))?;
    }
    writeln!(out, "{}", "=".repeat(total))
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let mut line: String = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:>width$}", cell, width = width))
        .collect();
    line.push_str("  ");
    line
}
