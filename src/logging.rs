//! Log output that shares the terminal with the progress bars.
//!
//! Bars redraw on stderr, so log lines go there too, written while the bars
//! are hidden.

use std::io::{self, Write};

use indicatif::{MultiProgress, ProgressDrawTarget};
use tracing_subscriber::EnvFilter;

/// The progress display for a run; hidden when `visible` is false.
pub fn progress_display(visible: bool) -> MultiProgress {
    let target = if visible {
        ProgressDrawTarget::stderr_with_hz(5)
    } else {
        ProgressDrawTarget::hidden()
    };
    MultiProgress::with_draw_target(target)
}

/// Writes to stderr with the bars of `multi` suspended.
#[derive(Clone)]
pub struct ProgressWriter {
    multi: MultiProgress,
}

impl ProgressWriter {
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // One formatted event per call; keep it in one piece.
        self.multi
            .suspend(|| io::stderr().lock().write_all(buf))
            .map(|()| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.multi.suspend(|| io::stderr().flush())
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose` when set.
pub fn init(verbose: bool, multi: &MultiProgress) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("alist_mirror=debug,warn")
        } else {
            EnvFilter::new("alist_mirror=info,warn")
        }
    });

    let multi = multi.clone();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(move || ProgressWriter::new(multi.clone()))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressBar;

    #[test]
    fn writer_reports_whole_buffer() {
        let multi = progress_display(false);
        let bar = multi.add(ProgressBar::new(10));
        bar.inc(3);

        let mut writer = ProgressWriter::new(multi.clone());
        let line = b"2026-01-01T00:00:00Z  INFO Downloading path=A\n";
        assert_eq!(writer.write(line).unwrap(), line.len());
        writer.flush().unwrap();
        assert_eq!(bar.position(), 3);
    }
}
