//! Human-readable status lines.
//!
//! One line per session: successes go to stdout, failures to stderr, so a
//! shell redirect of stdout captures only what was produced.
//!
//! ```text
//! OK     session001 -> /media/backup/session001.ctx (2 entries, 4.0 KiB)
//! FAIL   session002: unresolved entry: entry #1 references 'c.dat', ...
//! Built 1 of 2 sessions
//! ```

use std::io::{self, Write};
use std::path::Path;

use bytesize::ByteSize;
use yansi::Paint;

use crate::container::Inspection;
use crate::pipeline::{RunReport, SessionOutcome, SessionStatus};

/// Plain-text rendering of a [`RunReport`].
#[derive(Debug)]
pub struct TextOutput<'a> {
    report: &'a RunReport,
    quiet: bool,
}

impl<'a> TextOutput<'a> {
    /// `quiet` drops the success lines and the summary; failures always print.
    #[must_use]
    pub fn new(report: &'a RunReport, quiet: bool) -> Self {
        Self { report, quiet }
    }

    /// Print to the process's stdout and stderr.
    pub fn print(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let stderr = io::stderr();
        self.write_to(&mut stdout.lock(), &mut stderr.lock())
    }

    /// Write success lines to `out` and failure lines to `err`.
    pub fn write_to<O: Write, E: Write>(&self, out: &mut O, err: &mut E) -> io::Result<()> {
        for outcome in &self.report.sessions {
            if outcome.is_failure() {
                writeln!(err, "{}", status_line(outcome))?;
            } else if !self.quiet {
                writeln!(out, "{}", status_line(outcome))?;
            }
        }

        if !self.quiet {
            writeln!(out, "{}", self.summary())?;
        }
        Ok(())
    }

    fn summary(&self) -> String {
        let total = self.report.sessions.len();
        if total == 0 {
            return format!(
                "No sessions found in {}",
                self.report.input.display()
            );
        }
        let built = self.report.built_count();
        if built > 0 || self.report.failed_count() == total {
            format!("Built {built} of {total} session(s)")
        } else {
            format!(
                "{} of {} session(s) ready",
                total - self.report.failed_count(),
                total
            )
        }
    }
}

/// Format one outcome as a status line.
#[must_use]
pub fn status_line(outcome: &SessionOutcome) -> String {
    match &outcome.status {
        SessionStatus::Built {
            output,
            entries,
            bytes,
            ..
        } => format!(
            "{} {} -> {} ({} entries, {})",
            label("OK").green().bold(),
            outcome.session,
            output.display(),
            entries,
            ByteSize(*bytes)
        ),
        SessionStatus::Ready {
            descriptor,
            entries,
            payload_bytes,
        } => format!(
            "{} {}: {} entries, {} ({})",
            label("READY").cyan().bold(),
            outcome.session,
            entries,
            ByteSize(*payload_bytes),
            file_name(descriptor)
        ),
        SessionStatus::Failed { kind, message } => format!(
            "{} {}: {}: {}",
            label("FAIL").red().bold(),
            outcome.session,
            kind,
            message
        ),
    }
}

/// Write an [`Inspection`] as a small table.
pub fn write_inspection<W: Write>(
    out: &mut W,
    path: &Path,
    inspection: &Inspection,
) -> io::Result<()> {
    match &inspection.session {
        Some(id) => writeln!(
            out,
            "{}: {} container, session '{}'",
            path.display(),
            inspection.format,
            id
        )?,
        None => writeln!(out, "{}: {} container", path.display(), inspection.format)?,
    }

    let width = inspection
        .entries
        .iter()
        .map(|e| e.name.chars().count())
        .max()
        .unwrap_or(0);
    for (index, entry) in inspection.entries.iter().enumerate() {
        writeln!(
            out,
            "  {:>3}  {:<width$}  {}",
            index + 1,
            entry.name,
            ByteSize(entry.size)
        )?;
    }
    Ok(())
}

fn label(text: &str) -> String {
    format!("{text:<6}")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
