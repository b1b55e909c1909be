//! Generic producer: read a text file line by line into a stage buffer.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::errors::{Result, ShpError, WorkResult};
use crate::progress::StageProgress;
use crate::queue::{SharedBuffer, StageBuffer};
use crate::task::{CancellationToken, Stage, StageControl};

/// Count the lines of `reader`, including a final line without a terminator.
///
/// # Errors
/// Returns an I/O error if reading fails.
pub fn count_lines<R: BufRead>(mut reader: R) -> std::io::Result<u64> {
    let mut lines = 0;
    let mut buf = Vec::new();
    while reader.read_until(b'\n', &mut buf)? > 0 {
        lines += 1;
        buf.clear();
    }
    Ok(lines)
}

/// Read the next line without its `\n` or `\r\n` terminator, or `None` at end of input.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD rather than failing the read, so
/// every line counted by [`count_lines`] is produced.
///
/// # Errors
/// Returns an I/O error if reading fails.
pub fn read_line_lossy<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| ShpError::InvalidPath {
        description: "input file".to_string(),
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Single-worker stage that pushes each line of a file (without its terminator) to a buffer.
///
/// Before reading, the worker pre-scans the file to learn its line count, which becomes the
/// progress total (excluding the header when it is skipped). Lines are pushed in file order.
pub struct LineProducer {
    path: PathBuf,
    skip_first_line: bool,
    output: SharedBuffer<String>,
    control: StageControl,
    produced: Arc<StageProgress>,
}

impl LineProducer {
    /// Create a producer for `path` feeding `output`, with a token derived from `parent`.
    #[must_use]
    pub fn new(
        name: &str,
        path: impl Into<PathBuf>,
        skip_first_line: bool,
        output: SharedBuffer<String>,
        parent: &CancellationToken,
    ) -> Self {
        let control = StageControl::new(name, parent);
        let produced = Arc::new(StageProgress::new(format!("{name}: lines read"), control.state()));
        Self { path: path.into(), skip_first_line, output, control, produced }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The buffer lines are pushed onto.
    #[must_use]
    pub fn output(&self) -> SharedBuffer<String> {
        Arc::clone(&self.output)
    }

    #[must_use]
    pub fn items_produced(&self) -> u64 {
        self.produced.done()
    }

    /// Lines the producer will push, known once the pre-scan has finished (0 before).
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.produced.total()
    }

    #[must_use]
    pub fn progress(&self) -> &Arc<StageProgress> {
        &self.produced
    }
}

impl Stage for LineProducer {
    fn control(&self) -> &StageControl {
        &self.control
    }

    fn start(&self) -> Result<()> {
        let path = self.path.clone();
        let skip_first_line = self.skip_first_line;
        let output = Arc::clone(&self.output);
        let produced = Arc::clone(&self.produced);
        self.control.launch(1, move |_, token| {
            produce_lines(&path, skip_first_line, output.as_ref(), &produced, token)
        })
    }
}

fn produce_lines(
    path: &Path,
    skip_first_line: bool,
    output: &dyn StageBuffer<String>,
    produced: &StageProgress,
    token: &CancellationToken,
) -> WorkResult {
    let total = count_lines(open(path)?)?;
    let expected = if skip_first_line { total.saturating_sub(1) } else { total };
    produced.set_total(expected);
    debug!("{}: {expected} lines to produce", path.display());

    let mut reader = open(path)?;
    let mut buf = Vec::new();
    if skip_first_line {
        read_line_lossy(&mut reader, &mut buf)?;
    }
    while let Some(line) = read_line_lossy(&mut reader, &mut buf)? {
        token.check()?;
        output.push(line);
        produced.record(1);
    }
    produced.log_final();
    Ok(())
}
