//! This module is in charge of outputting simulation results: per-candidate
//! sinks, and the final run summary

use crate::{
    candidate::Candidate,
    numeric::{floats, Float},
    simulation::RunSummary,
    units::{EEV, MPC},
    Result,
};
use eyre::{eyre, WrapErr};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

// Number of significant digits in file output
const SIG_DIGITS: usize = (floats::DIGITS - 1) as usize;

/// Receiver of candidates, shared by all workers of a run
///
/// The run delivers every candidate exactly once, when it becomes inactive.
/// Observers may also forward detected candidates which remain active.
///
pub trait Sink: Send + Sync {
    /// Record one candidate
    fn receive(&self, candidate: &Candidate);

    /// Flush buffered output, reporting any error which occurred on the way
    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Columns which a `TextOutput` can write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    /// Trajectory length (Mpc)
    TrajectoryLength,
    /// Candidate identifier
    SerialNumber,
    /// Identifier of the parent candidate (-1 for primaries)
    ParentNumber,
    /// Current particle type
    CurrentId,
    /// Current energy (EeV)
    CurrentEnergy,
    /// Current position (Mpc, three columns)
    CurrentPosition,
    /// Current heading (three columns)
    CurrentDirection,
    /// Particle type at the source
    SourceId,
    /// Energy at the source (EeV)
    SourceEnergy,
    /// Position of the source (Mpc, three columns)
    SourcePosition,
    /// Particle type at creation
    CreatedId,
    /// Energy at creation (EeV)
    CreatedEnergy,
    /// Statistical weight
    Weight,
    /// Why the candidate stopped being propagated
    Status,
    /// Number of passes through the module chain
    Passes,
}
//
impl Column {
    /// Default column set, similar to a 3D event output
    pub const EVENTS_3D: &'static [Column] = &[
        Column::TrajectoryLength,
        Column::SerialNumber,
        Column::ParentNumber,
        Column::CurrentId,
        Column::CurrentEnergy,
        Column::CurrentPosition,
        Column::CurrentDirection,
        Column::SourceId,
        Column::SourceEnergy,
        Column::SourcePosition,
        Column::Weight,
        Column::Status,
    ];

    /// Header fields of this column
    fn header(self) -> &'static [&'static str] {
        match self {
            Column::TrajectoryLength => &["D"],
            Column::SerialNumber => &["SN"],
            Column::ParentNumber => &["SN1"],
            Column::CurrentId => &["ID"],
            Column::CurrentEnergy => &["E"],
            Column::CurrentPosition => &["X", "Y", "Z"],
            Column::CurrentDirection => &["Px", "Py", "Pz"],
            Column::SourceId => &["ID0"],
            Column::SourceEnergy => &["E0"],
            Column::SourcePosition => &["X0", "Y0", "Z0"],
            Column::CreatedId => &["ID1"],
            Column::CreatedEnergy => &["E1"],
            Column::Weight => &["W"],
            Column::Status => &["Status"],
            Column::Passes => &["N"],
        }
    }

    /// Write the fields of this column for one candidate
    fn write(self, line: &mut Vec<String>, c: &Candidate) {
        let float = |x: Float| engineering(x, SIG_DIGITS);
        match self {
            Column::TrajectoryLength => line.push(float(c.trajectory_length() / MPC)),
            Column::SerialNumber => line.push(c.id().0.to_string()),
            Column::ParentNumber => line.push(c.parent().map_or("-1".into(), |p| p.0.to_string())),
            Column::CurrentId => line.push(c.current.id().to_string()),
            Column::CurrentEnergy => line.push(float(c.current.energy() / EEV)),
            Column::CurrentPosition => {
                line.extend(c.current.position().iter().map(|&x| float(x / MPC)))
            }
            Column::CurrentDirection => {
                line.extend(c.current.direction().iter().map(|&x| float(x)))
            }
            Column::SourceId => line.push(c.source().id().to_string()),
            Column::SourceEnergy => line.push(float(c.source().energy() / EEV)),
            Column::SourcePosition => {
                line.extend(c.source().position().iter().map(|&x| float(x / MPC)))
            }
            Column::CreatedId => line.push(c.created().id().to_string()),
            Column::CreatedEnergy => line.push(float(c.created().energy() / EEV)),
            Column::Weight => line.push(float(c.weight())),
            Column::Status => line.push(
                c.inactive_reason()
                    .map_or_else(|| "active".into(), |r| r.to_string()),
            ),
            Column::Passes => line.push(c.num_passes().to_string()),
        }
    }
}

/// Text output state, kept behind a mutex
struct TextState<W: Write> {
    writer: W,
    error: Option<io::Error>,
}

/// Tab-separated text output with a selectable set of columns
///
/// Writes are serialized through a mutex. I/O errors cannot be reported from
/// `receive`, so the first one is kept and reported by `finish`, after which
/// nothing more is written.
///
pub struct TextOutput<W: Write + Send = BufWriter<File>> {
    columns: Vec<Column>,
    state: Mutex<TextState<W>>,
    count: AtomicUsize,
}
//
impl TextOutput {
    /// Create a text output file
    pub fn create(path: impl AsRef<Path>, columns: &[Column]) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .wrap_err_with(|| format!("Failed to create output file {}", path.display()))?;
        Self::new(BufWriter::new(file), columns)
    }
}
//
impl<W: Write + Send> TextOutput<W> {
    /// Write to an arbitrary writer, starting with the header line
    pub fn new(mut writer: W, columns: &[Column]) -> Result<Self> {
        let header = columns
            .iter()
            .flat_map(|column| column.header().iter().copied())
            .collect::<Vec<_>>()
            .join("\t");
        writeln!(writer, "# {header}")?;
        Ok(Self {
            columns: columns.to_vec(),
            state: Mutex::new(TextState {
                writer,
                error: None,
            }),
            count: AtomicUsize::new(0),
        })
    }

    /// Number of candidates written so far
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Get back the underlying writer
    pub fn into_inner(self) -> Result<W> {
        let state = self
            .state
            .into_inner()
            .map_err(|_| eyre!("Output writer was poisoned"))?;
        match state.error {
            Some(e) => Err(e.into()),
            None => Ok(state.writer),
        }
    }
}

impl<W: Write + Send> Sink for TextOutput<W> {
    fn receive(&self, candidate: &Candidate) {
        let mut line = Vec::with_capacity(2 * self.columns.len());
        for column in &self.columns {
            column.write(&mut line, candidate);
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.error.is_some() {
            return;
        }
        if let Err(e) = writeln!(state.writer, "{}", line.join("\t")) {
            state.error = Some(e);
            return;
        }
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| eyre!("Output writer was poisoned"))?;
        if let Some(e) = state.error.take() {
            return Err(e).wrap_err("Failed to write candidate output");
        }
        state.writer.flush().wrap_err("Failed to flush candidate output")
    }
}

/// In-memory sink, keeping copies of the received candidates
#[derive(Default)]
pub struct ParticleCollector {
    candidates: Mutex<Vec<Candidate>>,
}
//
impl ParticleCollector {
    /// Start with an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of collected candidates
    pub fn len(&self) -> usize {
        self.candidates.lock().map_or(0, |c| c.len())
    }

    /// Truth that nothing was collected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies of the received candidates, in reception order
    pub fn candidates(&self) -> Vec<Candidate> {
        self.candidates
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Drop all received candidates
    pub fn clear(&self) {
        if let Ok(mut c) = self.candidates.lock() {
            c.clear();
        }
    }
}

impl Sink for ParticleCollector {
    fn receive(&self, candidate: &Candidate) {
        if let Ok(mut c) = self.candidates.lock() {
            let mut copy = candidate.clone();
            // Pending secondaries are delivered on their own
            let _ = copy.take_secondaries();
            c.push(copy);
        }
    }
}

/// Write the run summary to the console and to disk
pub fn dump_summary(
    path: impl AsRef<Path>,
    summary: &RunSummary,
    elapsed_time: Duration,
) -> Result<()> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .wrap_err("Failed to format the run timestamp")?;

    let mut file = BufWriter::new(File::create(path)?);
    let file = &mut file;
    writeln_tp(file, timestamp.as_str())?;
    writeln_tp(file, "---------------------------------------------")?;
    writeln_tp(file, ("Passes", summary.passes))?;
    writeln_tp(file, ("Candidates processed", summary.processed))?;
    writeln_tp(file, ("... of which secondaries", summary.secondaries))?;
    writeln_tp(file, ("Terminated normally", summary.normal))?;
    writeln_tp(file, ("Force-terminated", summary.forced))?;
    writeln_tp(file, ("... of which stopped early", summary.remaining))?;
    writeln_tp(file, ("Degraded accuracy", summary.degraded))?;
    writeln_tp(file, ("Stopped by request", summary.stopped))?;
    writeln_tp(file, "---------------------------------------------")?;
    let elapsed_secs = elapsed_time.as_secs_f64() as Float;
    writeln_tp(file, ("Elapsed time (s)", elapsed_secs))?;
    if summary.processed > 0 {
        let secs_per_candidate = elapsed_secs / (summary.processed as Float);
        writeln_tp(file, ("Elapsed time per candidate (s)", secs_per_candidate))?;
    }
    file.flush()?;
    Ok(())
}

/// Text output facility for key-value summaries
fn writeln_tp(file: &mut impl Write, data: impl WriteTp) -> io::Result<()> {
    write!(file, " ")?;
    data.write(file)?;
    writeln!(file)
}

/// Trait implemented by things which can be written in a summary
trait WriteTp: Sized {
    /// Write down `self` to the output file
    fn write(self, file: &mut impl Write) -> io::Result<()>;
}

impl WriteTp for &str {
    fn write(self, file: &mut impl Write) -> io::Result<()> {
        write!(file, "{self}")
    }
}

impl WriteTp for usize {
    fn write(self, file: &mut impl Write) -> io::Result<()> {
        write!(file, "{self}")
    }
}

impl WriteTp for bool {
    fn write(self, file: &mut impl Write) -> io::Result<()> {
        write!(file, "{}", if self { "yes" } else { "no" })
    }
}

impl WriteTp for Float {
    // %g-like output
    fn write(self, file: &mut impl Write) -> io::Result<()> {
        write!(file, "{}", engineering(self, SIG_DIGITS))
    }
}

impl<T: WriteTp> WriteTp for (&str, T) {
    // Key-value output that uses fixed-size columns for better readability
    fn write(self, file: &mut impl Write) -> io::Result<()> {
        write!(file, "{:<31}: ", self.0)?;
        self.1.write(file)
    }
}

/// Format a floating-point number using "engineering" notation
///
/// Analogous to the %g format of the C printf function, this switches between
/// naive and scientific notation when the number becomes so small that
/// printing leading zeroes could end up larger than the scientific notation,
/// or so large that we would be forced to print more significant digits than
/// requested.
///
fn engineering(x: Float, sig_digits: usize) -> String {
    let mut precision = sig_digits - 1;
    if x == 0. {
        // Zero is special because you can't take its log
        "0".into()
    } else if !x.is_finite() {
        x.to_string()
    } else {
        // Otherwise, use log to evaluate order of magnitude
        let log_x = x.abs().log10();
        if log_x >= -3. && log_x <= (sig_digits as Float) {
            // Rust's precision controls the number of digits after the decimal
            // point, adjust it to keep a constant number of significant digits
            precision = (precision as isize - log_x.trunc() as isize).max(0) as usize;

            // The leading zero of numbers below 1 is not significant
            if log_x < 0. {
                precision += 1
            }

            // No trailing zeros or decimal point, but be careful with integers
            let str_with_zeros = format!("{x:.precision$}");
            if str_with_zeros.contains('.') {
                str_with_zeros
                    .trim_end_matches('0')
                    .trim_end_matches('.')
                    .to_owned()
            } else {
                str_with_zeros
            }
        } else {
            format!("{x:.precision$e}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{candidate::InactiveReason, module::tests::proton};

    #[test]
    fn engineering_notation() {
        assert_eq!(engineering(0., 6), "0");
        assert_eq!(engineering(1.5, 6), "1.5");
        assert_eq!(engineering(100., 6), "100");
        assert_eq!(engineering(1.5e-7, 3), "1.50e-7");
        assert_eq!(engineering(Float::INFINITY, 3), "inf");
    }

    #[test]
    fn text_output_writes_header_and_rows() {
        let output = TextOutput::new(
            Vec::new(),
            &[Column::CurrentId, Column::CurrentEnergy, Column::Status],
        )
        .unwrap();
        let mut c = proton(2. * EEV as f64);
        c.set_inactive(InactiveReason::BelowEnergy);
        output.receive(&c);
        output.finish().unwrap();
        assert_eq!(output.count(), 1);
        let text = String::from_utf8(output.into_inner().unwrap()).unwrap();
        assert_eq!(text, "# ID\tE\tStatus\n2212\t2\tbelow minimum energy\n");
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn io_errors_surface_on_finish() {
        let output = TextOutput {
            columns: vec![Column::CurrentId],
            state: Mutex::new(TextState {
                writer: Broken,
                error: None,
            }),
            count: AtomicUsize::new(0),
        };
        output.receive(&proton(1.));
        assert!(output.finish().is_err());
        assert_eq!(output.count(), 0);
    }

    #[test]
    fn collector_keeps_copies() {
        let collector = ParticleCollector::new();
        assert!(collector.is_empty());
        collector.receive(&proton(1.));
        collector.receive(&proton(2.));
        assert_eq!(collector.len(), 2);
        assert_eq!(collector.candidates()[1].current.energy(), 2.);
        collector.clear();
        assert!(collector.is_empty());
    }
}
