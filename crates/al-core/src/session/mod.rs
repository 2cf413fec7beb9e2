//! Interactive logging session.
//!
//! A [`Session`] owns everything one run needs: the line source, the table
//! writer, the optional manifest, and the running row index. Rounds are
//! strictly sequential: round `k + 1` starts only after row `k` is written.
//!
//! Console I/O is passed in explicitly so the whole loop runs against
//! in-memory readers and writers in tests.

use crate::cancel::CancelToken;
use crate::collect::{collect_with, CollectError, CollectOptions};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::parse::parse_int;
use crate::transport::LineSource;
use al_common::{Row, SessionId};
use al_table::{SessionManifest, SessionState, TableError, TableWriter};
use chrono::Local;
use std::io::{self, BufRead, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use thiserror::Error;

/// Prompt asking for the per-round sample count.
pub const SAMPLE_COUNT_PROMPT: &str = "Enter number of samples per voltage (once): ";

/// Re-prompt message for a bad sample count.
pub const INVALID_COUNT_MESSAGE: &str = "Invalid number, try again";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("failed to assemble row: {0}")]
    Row(#[from] al_common::Error),

    #[error("console I/O failed: {0}")]
    Console(#[source] io::Error),

    #[error("failed to install the interrupt handler: {0}")]
    Signal(#[source] io::Error),
}

/// How an interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// `q` or end of the answer stream.
    Finished,
    /// A round was cancelled with Ctrl-C.
    Interrupted,
    /// The line source ended mid-round.
    Exhausted,
}

impl From<SessionOutcome> for SessionState {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Finished => SessionState::Finished,
            SessionOutcome::Interrupted => SessionState::Interrupted,
            SessionOutcome::Exhausted => SessionState::Exhausted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub rows_written: u64,
    pub outcome: SessionOutcome,
}

/// Ask once for the number of samples per round.
///
/// Re-prompts until a positive integer is entered. Returns `None` when the
/// input ends first.
pub fn prompt_sample_count<R, W>(input: &mut R, output: &mut W) -> io::Result<Option<NonZeroUsize>>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    loop {
        write!(output, "{}", SAMPLE_COUNT_PROMPT)?;
        output.flush()?;

        let Some(answer) = read_answer(input, None)? else {
            return Ok(None);
        };
        let count = parse_int(&answer)
            .and_then(|n| usize::try_from(n).ok())
            .and_then(NonZeroUsize::new);
        match count {
            Some(count) => return Ok(Some(count)),
            None => writeln!(output, "{}", INVALID_COUNT_MESSAGE)?,
        }
    }
}

/// Read one answer line, trimmed. `None` at end of input.
///
/// When `cancel` is given, a read interrupted by a signal that set the token
/// fails with [`io::ErrorKind::Interrupted`] instead of being retried.
fn read_answer<R: BufRead + ?Sized>(
    input: &mut R,
    cancel: Option<&CancelToken>,
) -> io::Result<Option<String>> {
    let mut bytes = Vec::new();
    loop {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }
        let available = match input.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            break;
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                bytes.extend_from_slice(&available[..=pos]);
                input.consume(pos + 1);
                break;
            }
            None => {
                let len = available.len();
                bytes.extend_from_slice(available);
                input.consume(len);
            }
        }
    }
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&bytes).trim().to_string()))
}

fn state_name(state: SessionState) -> &'static str {
    match state {
        SessionState::Active => "active",
        SessionState::Finished => "finished",
        SessionState::Interrupted => "interrupted",
        SessionState::Exhausted => "exhausted",
        SessionState::Failed => "failed",
    }
}

fn is_quit(answer: &str) -> bool {
    answer.eq_ignore_ascii_case("q")
}

/// One logging session.
pub struct Session<S, W: Write> {
    source: S,
    table: TableWriter<W>,
    manifest: Option<(SessionManifest, PathBuf)>,
    next_index: u64,
    quota: NonZeroUsize,
    cancel: CancelToken,
    trap_interrupts: bool,
    ctx: LogContext,
}

impl<S: LineSource, W: Write> Session<S, W> {
    pub fn new(source: S, table: TableWriter<W>, ctx: LogContext) -> Self {
        // The writer's quota comes from a NonZeroUsize.
        let quota = NonZeroUsize::new(table.quota()).unwrap_or(NonZeroUsize::MIN);
        Session {
            source,
            table,
            manifest: None,
            next_index: 1,
            quota,
            cancel: CancelToken::new(),
            trap_interrupts: false,
            ctx,
        }
    }

    /// Write a manifest next to the table and keep it current.
    pub fn with_manifest(mut self, session_id: &SessionId) -> Result<Self, SessionError> {
        let path = SessionManifest::path_for_table(self.table.path());
        let manifest = SessionManifest::new(
            session_id,
            self.table.path(),
            self.source.describe(),
            self.quota.get(),
            self.table.reference_label(),
        );
        manifest.write(&path)?;
        self.manifest = Some((manifest, path));
        Ok(self)
    }

    /// Route SIGINT into the session's cancel token while a round or the
    /// reference prompt waits.
    pub fn trap_interrupts(mut self, enabled: bool) -> Self {
        self.trap_interrupts = enabled;
        self
    }

    /// Cancelling this token aborts the current round or the pending prompt.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn rows_written(&self) -> u64 {
        self.table.rows_written()
    }

    pub fn table(&self) -> &TableWriter<W> {
        &self.table
    }

    pub fn manifest(&self) -> Option<&SessionManifest> {
        self.manifest.as_ref().map(|(m, _)| m)
    }

    /// Collect one round for `reference` and append it as a row.
    ///
    /// On error no row is written and the row index is unchanged.
    pub fn run_round<C>(&mut self, reference: &str, console: &mut C) -> Result<Row, SessionError>
    where
        C: Write + ?Sized,
    {
        self.cancel.reset();
        let _guard = self.route_interrupts()?;
        self.round(reference, console)
    }

    /// While the returned guard lives, SIGINT cancels the session token.
    #[cfg(unix)]
    fn route_interrupts(&self) -> Result<Option<crate::cancel::InterruptGuard>, SessionError> {
        if !self.trap_interrupts {
            return Ok(None);
        }
        crate::cancel::InterruptGuard::install(self.cancel.clone())
            .map(Some)
            .map_err(SessionError::Signal)
    }

    #[cfg(not(unix))]
    fn route_interrupts(&self) -> Result<Option<()>, SessionError> {
        Ok(None)
    }

    fn round<C>(&mut self, reference: &str, console: &mut C) -> Result<Row, SessionError>
    where
        C: Write + ?Sized,
    {
        self.source.discard_pending().map_err(CollectError::Transport)?;

        let quota = self.quota.get();
        writeln!(console, "Logging {} samples...", quota).map_err(SessionError::Console)?;
        log_event!(
            self.ctx,
            INFO,
            event_names::ROUND_STARTED,
            Stage::Collect,
            "Round started",
            index = self.next_index,
            reference = reference,
            quota = quota as u64
        );

        let samples = {
            let options = CollectOptions::new(self.quota).with_cancel(self.cancel.clone());
            let mut echo_error = None;
            let ctx = &self.ctx;
            let result = collect_with(&options, &mut self.source, |i, sample| {
                log_event!(
                    ctx,
                    DEBUG,
                    event_names::SAMPLE_ACCEPTED,
                    Stage::Collect,
                    "Sample accepted",
                    slot = i as u64
                );
                if echo_error.is_none() {
                    if let Err(e) = writeln!(console, "Sample {:03}: {}", i + 1, sample) {
                        echo_error = Some(e);
                    }
                }
            });

            let samples = match result {
                Ok(samples) => samples,
                Err(e) => {
                    let reason = e.to_string();
                    log_event!(
                        self.ctx,
                        WARN,
                        event_names::ROUND_ABORTED,
                        Stage::Collect,
                        "Round ended without a row",
                        index = self.next_index,
                        collected = e.collected() as u64,
                        reason = reason.as_str()
                    );
                    return Err(e.into());
                }
            };
            if let Some(e) = echo_error {
                return Err(SessionError::Console(e));
            }
            samples
        };

        let row = Row::new(
            self.next_index,
            Local::now().naive_local(),
            reference,
            samples,
        )?;
        log_event!(
            self.ctx,
            DEBUG,
            event_names::ROUND_FINISHED,
            Stage::Collect,
            "Round collected",
            index = row.index
        );

        self.table.append(&row)?;
        self.next_index += 1;
        self.update_manifest(|m| m.record_row());

        writeln!(console, "Row {} saved", row.index).map_err(SessionError::Console)?;
        console.flush().map_err(SessionError::Console)?;
        let path = self.table.path().display().to_string();
        log_event!(
            self.ctx,
            INFO,
            event_names::ROW_WRITTEN,
            Stage::Write,
            "Row saved",
            index = row.index,
            path = path.as_str()
        );
        Ok(row)
    }

    /// Prompt for reference values until `q`, end of input, or a round fails.
    ///
    /// The manifest is finalized on every path.
    pub fn run_interactive<R, C>(
        &mut self,
        input: &mut R,
        console: &mut C,
    ) -> Result<SessionSummary, SessionError>
    where
        R: BufRead + ?Sized,
        C: Write + ?Sized,
    {
        let source = self.source.describe();
        let table = self.table.path().display().to_string();
        log_event!(
            self.ctx,
            INFO,
            event_names::SESSION_STARTED,
            Stage::Init,
            "Session started",
            source = source.as_str(),
            table = table.as_str(),
            quota = self.quota.get() as u64
        );

        self.cancel.reset();
        let result = match self.route_interrupts() {
            Ok(_guard) => self.interactive_loop(input, console),
            Err(e) => Err(e),
        };
        match &result {
            Ok(outcome) => {
                if *outcome == SessionOutcome::Interrupted {
                    let _ = writeln!(console, "Stopped by user");
                }
                self.finish(SessionState::from(*outcome), None);
            }
            Err(e) => self.finish(SessionState::Failed, Some(e.to_string())),
        }
        let _ = console.flush();

        result.map(|outcome| SessionSummary {
            rows_written: self.table.rows_written(),
            outcome,
        })
    }

    fn interactive_loop<R, C>(
        &mut self,
        input: &mut R,
        console: &mut C,
    ) -> Result<SessionOutcome, SessionError>
    where
        R: BufRead + ?Sized,
        C: Write + ?Sized,
    {
        let prompt = format!(
            "Enter {} voltage (or 'q' to quit): ",
            self.table.reference_label()
        );
        loop {
            write!(console, "{}", prompt)
                .and_then(|_| console.flush())
                .map_err(SessionError::Console)?;

            let answer = match read_answer(input, Some(&self.cancel)) {
                Ok(Some(answer)) => answer,
                Ok(None) => {
                    // End of answers counts as quitting; end the prompt line.
                    writeln!(console).map_err(SessionError::Console)?;
                    return Ok(SessionOutcome::Finished);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted && self.cancel.is_cancelled() => {
                    writeln!(console).map_err(SessionError::Console)?;
                    return Ok(SessionOutcome::Interrupted);
                }
                Err(e) => return Err(SessionError::Console(e)),
            };
            if is_quit(&answer) {
                return Ok(SessionOutcome::Finished);
            }

            match self.round(&answer, console) {
                Ok(_) => {}
                Err(SessionError::Collect(CollectError::Aborted { .. })) => {
                    return Ok(SessionOutcome::Interrupted)
                }
                Err(SessionError::Collect(CollectError::Exhausted { .. })) => {
                    return Ok(SessionOutcome::Exhausted)
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn finish(&mut self, state: SessionState, error: Option<String>) {
        if self.manifest().is_some_and(|m| m.state.is_terminal()) {
            return;
        }
        self.update_manifest(|m| m.finish(state, error));
        log_event!(
            self.ctx,
            INFO,
            event_names::SESSION_FINISHED,
            Stage::Shutdown,
            "Session finished",
            state = state_name(state),
            rows_written = self.table.rows_written()
        );
    }

    /// Apply `f` and rewrite the manifest. Failures are logged, not fatal:
    /// the table itself is already flushed.
    fn update_manifest(&mut self, f: impl FnOnce(&mut SessionManifest)) {
        let Some((manifest, path)) = self.manifest.as_mut() else {
            return;
        };
        f(manifest);
        if let Err(e) = manifest.write(path) {
            let error = e.to_string();
            log_event!(
                self.ctx,
                WARN,
                event_names::MANIFEST_FAILED,
                Stage::Write,
                "Failed to update session manifest",
                error = error.as_str()
            );
        }
    }

    /// Release the source and flush the table.
    pub fn into_parts(self) -> Result<(S, W), SessionError> {
        let writer = self.table.into_inner()?;
        Ok((self.source, writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{from_lines, FnSource};
    use std::io::{Cursor, Read};

    /// Answer stream that runs `on_end` and reports an interrupted read once
    /// its scripted answers are used up, as a blocking terminal read does
    /// when SIGINT arrives.
    struct InterruptedInput<F: FnMut()> {
        answers: Cursor<Vec<u8>>,
        on_end: F,
    }

    impl<F: FnMut()> InterruptedInput<F> {
        fn new(answers: &str, on_end: F) -> Self {
            InterruptedInput {
                answers: Cursor::new(answers.as_bytes().to_vec()),
                on_end,
            }
        }
    }

    impl<F: FnMut()> Read for InterruptedInput<F> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.answers.read(buf)
        }
    }

    impl<F: FnMut()> BufRead for InterruptedInput<F> {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            if self.answers.position() as usize >= self.answers.get_ref().len() {
                (self.on_end)();
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.answers.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.answers.consume(amt)
        }
    }

    fn n(v: usize) -> NonZeroUsize {
        NonZeroUsize::new(v).unwrap()
    }

    fn ctx() -> LogContext {
        LogContext::new("run-test")
    }

    fn session<S: LineSource>(source: S, quota: usize) -> Session<S, Vec<u8>> {
        let table = TableWriter::new(Vec::new(), n(quota), "UT203").unwrap();
        Session::new(source, table, ctx())
    }

    fn table_lines(session: Session<impl LineSource, Vec<u8>>) -> Vec<String> {
        let (_, bytes) = session.into_parts().unwrap();
        String::from_utf8(bytes)
            .unwrap()
            .split_terminator("\r\n")
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_prompt_sample_count_reprompts() {
        let mut input = Cursor::new("abc\n0\n-3\n 4 \n");
        let mut output = Vec::new();
        let count = prompt_sample_count(&mut input, &mut output).unwrap();
        assert_eq!(count, Some(n(4)));

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches(SAMPLE_COUNT_PROMPT).count(), 4);
        assert_eq!(text.matches(INVALID_COUNT_MESSAGE).count(), 3);
    }

    #[test]
    fn test_prompt_sample_count_eof() {
        let mut input = Cursor::new("x\n");
        let mut output = Vec::new();
        assert_eq!(prompt_sample_count(&mut input, &mut output).unwrap(), None);
    }

    #[test]
    fn test_run_round_writes_row_and_echoes() {
        let src = from_lines(["", "garbage", "A1;E1;D1;", "A2;E2;D2;", "A3;E3;D3;"]);
        let mut s = session(src, 3);
        let mut console = Vec::new();

        let row = s.run_round("3.30", &mut console).unwrap();
        assert_eq!(row.index, 1);
        assert_eq!(row.reference, "3.30");
        assert_eq!(row.samples().ads(), &[Some(1), Some(2), Some(3)]);
        assert_eq!(s.next_index(), 2);
        assert_eq!(s.rows_written(), 1);

        let text = String::from_utf8(console).unwrap();
        assert!(text.starts_with("Logging 3 samples...\n"));
        assert!(text.contains("Sample 001: A:1 | E:1 | D:1\n"));
        assert!(text.contains("Sample 003: A:3 | E:3 | D:3\n"));
        assert!(text.ends_with("Row 1 saved\n"));

        let lines = table_lines(s);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Index,Date,Time,UT203,ADS(0)"));
        let cells: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(cells[0], "1");
        assert_eq!(cells[3], "3.30");
        assert_eq!(&cells[4..], ["1", "2", "3", "1", "2", "3", "1", "2", "3"]);
    }

    #[test]
    fn test_unset_readings_become_empty_cells() {
        let mut s = session(from_lines(["D7;", "A1;"]), 2);
        s.run_round("1.0", &mut Vec::new()).unwrap();
        let lines = table_lines(s);
        let cells: Vec<&str> = lines[1].split(',').collect();
        // ADS(0..2), ARD(0..2), ESP(0..2)
        assert_eq!(&cells[4..], ["7", "", "", "1", "", ""]);
    }

    #[test]
    fn test_exhausted_round_writes_no_row() {
        let mut s = session(from_lines(["A1;"]), 2);
        let err = s.run_round("1.0", &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Collect(CollectError::Exhausted { collected: 1, .. })
        ));
        assert_eq!(s.next_index(), 1);
        assert_eq!(table_lines(s).len(), 1);
    }

    #[test]
    fn test_interactive_sequence_and_quit() {
        let src = from_lines(["A1;", "A2;", "A3;", "A4;"]);
        let mut s = session(src, 2);
        let mut input = Cursor::new("1.5\n2.5\nQ\n3.5\n");
        let mut console = Vec::new();

        let summary = s.run_interactive(&mut input, &mut console).unwrap();
        assert_eq!(
            summary,
            SessionSummary {
                rows_written: 2,
                outcome: SessionOutcome::Finished
            }
        );

        let text = String::from_utf8(console).unwrap();
        assert_eq!(text.matches("Enter UT203 voltage (or 'q' to quit): ").count(), 3);
        assert!(text.contains("Row 1 saved"));
        assert!(text.contains("Row 2 saved"));

        let lines = table_lines(s);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,"));
        assert!(lines[2].starts_with("2,"));
        assert!(lines[2].contains(",2.5,"));
    }

    #[test]
    fn test_interactive_end_of_answers_finishes() {
        let mut s = session(from_lines(Vec::<String>::new()), 1);
        let summary = s
            .run_interactive(&mut Cursor::new(""), &mut Vec::new())
            .unwrap();
        assert_eq!(summary.outcome, SessionOutcome::Finished);
        assert_eq!(summary.rows_written, 0);
    }

    #[test]
    fn test_interactive_exhausted_source() {
        let mut s = session(from_lines(["A1;", "A2;", "A3;"]), 2);
        let summary = s
            .run_interactive(&mut Cursor::new("1\n2\n3\n"), &mut Vec::new())
            .unwrap();
        assert_eq!(summary.outcome, SessionOutcome::Exhausted);
        assert_eq!(summary.rows_written, 1);
    }

    #[test]
    fn test_interactive_abort_discards_partial_round() {
        let token = CancelToken::new();
        let trigger = token.clone();
        let mut reads = 0u32;
        let src = FnSource(move || {
            reads += 1;
            // Second round: cancel after one accepted sample.
            if reads == 3 {
                trigger.cancel();
            }
            Ok(Some(format!("E{};", reads)))
        });
        let mut s = session(src, 2);
        s.cancel = token;

        let mut console = Vec::new();
        let summary = s
            .run_interactive(&mut Cursor::new("1\n2\n3\n"), &mut console)
            .unwrap();
        assert_eq!(summary.outcome, SessionOutcome::Interrupted);
        assert_eq!(summary.rows_written, 1);
        assert!(String::from_utf8(console)
            .unwrap()
            .contains("Stopped by user"));
        assert_eq!(table_lines(s).len(), 2);
    }

    #[test]
    fn test_manifest_tracks_rows_and_final_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = al_table::TableConfig {
            output_dir: dir.path().to_path_buf(),
            prefix: "adc_log".to_string(),
            quota: n(1),
            reference_label: "UT203".to_string(),
        };
        let table = TableWriter::create(&config).unwrap();
        let manifest_path = SessionManifest::path_for_table(table.path());
        let mut s = Session::new(from_lines(["D1;", "D2;"]), table, ctx())
            .with_manifest(&SessionId::new())
            .unwrap();
        assert_eq!(
            SessionManifest::read(&manifest_path).unwrap().state,
            SessionState::Active
        );

        s.run_interactive(&mut Cursor::new("a\nb\nq\n"), &mut Vec::new())
            .unwrap();
        let manifest = SessionManifest::read(&manifest_path).unwrap();
        assert_eq!(manifest.state, SessionState::Finished);
        assert_eq!(manifest.rows_written, 2);
        assert_eq!(manifest.samples_per_round, 1);
        assert_eq!(manifest.source, "closure");
    }

    #[test]
    fn test_interrupt_at_prompt_finalizes_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = al_table::TableConfig {
            output_dir: dir.path().to_path_buf(),
            prefix: "adc_log".to_string(),
            quota: n(1),
            reference_label: "UT203".to_string(),
        };
        let table = TableWriter::create(&config).unwrap();
        let manifest_path = SessionManifest::path_for_table(table.path());
        let mut s = Session::new(from_lines(["D1;", "D2;"]), table, ctx())
            .with_manifest(&SessionId::new())
            .unwrap();
        let trigger = s.cancel_token();

        let mut input = InterruptedInput::new("0.5\n", move || trigger.cancel());
        let mut console = Vec::new();
        let summary = s.run_interactive(&mut input, &mut console).unwrap();
        assert_eq!(
            summary,
            SessionSummary {
                rows_written: 1,
                outcome: SessionOutcome::Interrupted
            }
        );
        let text = String::from_utf8(console).unwrap();
        assert!(text.contains("Row 1 saved"));
        assert!(text.ends_with("Stopped by user\n"));

        let manifest = SessionManifest::read(&manifest_path).unwrap();
        assert_eq!(manifest.state, SessionState::Interrupted);
        assert_eq!(manifest.rows_written, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_sigint_at_prompt_ends_session_as_interrupted() {
        let mut s = session(from_lines(["A1;"]), 1).trap_interrupts(true);
        let mut input = InterruptedInput::new("", || {
            // SAFETY: the session routes SIGINT into its token while the
            // prompt waits.
            unsafe {
                libc::raise(libc::SIGINT);
            }
        });
        let summary = s.run_interactive(&mut input, &mut Vec::new()).unwrap();
        assert_eq!(summary.outcome, SessionOutcome::Interrupted);
        assert_eq!(summary.rows_written, 0);
        assert!(s.cancel_token().is_cancelled());
    }
}
