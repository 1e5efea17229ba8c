//! Sampling coordinator
//!
//! Owns the session storage and the code caches, runs the session state
//! machine and is the entry point of every sample.
//!
//! ## States
//!
//! ```text
//!            start()             stop()
//!   ┌──────┐ ─────────▶ ┌─────────┐ ─────────▶ ┌──────┐
//!   │ Idle │            │ Running │            │ Idle │ ...
//!   └──────┘ ◀───────── └─────────┘            └──────┘
//!       │                    │
//!       └──── shutdown() ────┴──────▶ Terminated (no further start)
//! ```
//!
//! ## Quiescence
//!
//! The session lives behind an `RwLock`. Captures only ever `try_read` it
//! and give up when they cannot; `stop` first marks the session inactive
//! and then takes the write lock once, which waits out every capture that
//! saw the session active. After that nothing writes the session again; it
//! stays readable for dumps until the next `start` replaces it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, TryLockError};

use stackscope_common::Frame;

use super::call_trace_table::hash_call_trace;
use super::os::current_tid;
use super::sample_table::{Outcome, TableConfig};
use super::session::Session;
use super::threads::ThreadRegistry;
use super::trace_buffer::EXTRA_FRAMES;
use super::walker::StackWalker;
use crate::config::{Action, Arguments, Counter, FlameGraphParams};
use crate::domain::{
    EventKind, FailureReason, FrameKind, MethodId, ProfilerError, SampleEvent, Tid,
};
use crate::report::{FrameNamer, ReportGenerator, Snapshot};
use crate::symbolization::{
    current_process_mappings, CodeCache, NameRegistry, NativeCodeCache, NativeLibraries,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Terminated,
}

/// What happened to one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Stored in the call trace table at this slot
    Recorded(usize),
    /// Counted under a failure reason and discarded
    Dropped(FailureReason),
    /// No running session accepts samples of this kind
    Inactive,
}

impl SampleOutcome {
    #[must_use]
    pub fn is_recorded(self) -> bool {
        matches!(self, SampleOutcome::Recorded(_))
    }
}

pub struct Profiler<W: StackWalker> {
    walker: W,
    table_config: TableConfig,
    state: Mutex<State>,
    session: RwLock<Option<Session>>,
    generation: AtomicU64,
    compiled: CodeCache<MethodId>,
    stubs: NativeCodeCache,
    libraries: NativeLibraries,
    threads: ThreadRegistry,
    names: NameRegistry,
}

impl<W: StackWalker> Profiler<W> {
    #[must_use]
    pub fn new(walker: W) -> Self {
        Self::with_table_config(walker, TableConfig::default())
    }

    /// Profiler whose sessions use tables of the given dimensions
    #[must_use]
    pub fn with_table_config(walker: W, table_config: TableConfig) -> Self {
        Self {
            walker,
            table_config,
            state: Mutex::new(State::Idle),
            session: RwLock::new(None),
            generation: AtomicU64::new(0),
            compiled: CodeCache::new(),
            stubs: NativeCodeCache::new("[stubs]"),
            libraries: NativeLibraries::new(),
            threads: ThreadRegistry::new(),
            names: NameRegistry::new(),
        }
    }

    pub fn state(&self) -> State {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start a new session with fresh tables
    ///
    /// The previous session, if any, is released.
    ///
    /// # Errors
    /// [`ProfilerError::AlreadyRunning`] if a session is running,
    /// [`ProfilerError::Terminated`] after shutdown. Neither has side effects.
    pub fn start(&self, args: &Arguments) -> Result<(), ProfilerError> {
        let mut state = self.lock_state();
        match *state {
            State::Running => return Err(ProfilerError::AlreadyRunning),
            State::Terminated => return Err(ProfilerError::Terminated),
            State::Idle => {}
        }

        if args.threads {
            if let Err(e) = self.threads.seed_from_proc() {
                log::warn!("Thread names unavailable: {e:#}");
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let session = Session::new(args.clone(), generation, self.table_config);
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        *state = State::Running;

        log::info!(
            "Started [{}] profiling, interval {}, generation {generation}",
            args.event,
            args.effective_interval()
        );
        Ok(())
    }

    /// Stop the running session and wait for in-flight captures
    ///
    /// # Errors
    /// [`ProfilerError::NotRunning`] if no session is running,
    /// [`ProfilerError::Terminated`] after shutdown.
    pub fn stop(&self) -> Result<(), ProfilerError> {
        let mut state = self.lock_state();
        match *state {
            State::Idle => return Err(ProfilerError::NotRunning),
            State::Terminated => return Err(ProfilerError::Terminated),
            State::Running => {}
        }
        self.quiesce();
        *state = State::Idle;
        Ok(())
    }

    /// Stop if running, write the requested dumps and terminate for good
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    /// Propagates dump errors; the profiler is terminated regardless.
    pub fn shutdown(&self, args: &Arguments, out: &mut dyn Write) -> Result<(), ProfilerError> {
        let mut state = self.lock_state();
        let was_running = *state == State::Running;
        if *state == State::Terminated {
            return Ok(());
        }
        *state = State::Terminated;

        let mut result = Ok(());
        if was_running {
            self.quiesce();
            if args.dump_requested() {
                result = self.write_dump(args, out);
            }
        }
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
        log::info!("Profiler shut down");
        result
    }

    fn quiesce(&self) {
        if let Some(session) = self.read_session().as_ref() {
            session.deactivate();
        }

        // Captures that saw the session active still hold read guards
        let guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = guard.as_ref() else {
            return;
        };

        log::info!(
            "Profiling stopped after {:.1}s: {} samples, {} traces",
            session.uptime().as_secs_f64(),
            session.total_samples(),
            session.traces.len()
        );
        let failed: u64 = session.failures().iter().sum();
        if failed > 0 {
            log::warn!("{failed} of {} samples could not be captured", session.total_samples());
        }
        if session.traces.frame_buffer().overflowed() {
            log::warn!("Frame buffer overflowed, consider increasing framebuf");
        }
    }

    // ------------------------------------------------------------------
    // Sampling path: no blocking, no allocation, no logging
    // ------------------------------------------------------------------

    /// Record a sample of the calling thread
    pub fn record_sample(
        &self,
        context: &W::Context,
        weight: u64,
        event: SampleEvent,
    ) -> SampleOutcome {
        self.record_sample_as(current_tid(), context, weight, event)
    }

    /// Record a sample attributed to thread `tid`
    ///
    /// Events of a kind other than the session's are ignored.
    pub fn record_sample_as(
        &self,
        tid: Tid,
        context: &W::Context,
        weight: u64,
        event: SampleEvent,
    ) -> SampleOutcome {
        let guard = match self.session.try_read() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return SampleOutcome::Inactive,
        };
        let Some(session) = guard.as_ref() else {
            return SampleOutcome::Inactive;
        };
        if !session.is_active() || session.args.event != event.kind {
            return SampleOutcome::Inactive;
        }

        session.count_sample(weight);
        let Some(mut buffer) = session.buffers.acquire(tid) else {
            session.count_failure(FailureReason::Skipped);
            return SampleOutcome::Dropped(FailureReason::Skipped);
        };

        let len = self.capture(session, tid, context, event, &mut buffer);
        let frames = &buffer[..len];
        match session.traces.record(hash_call_trace(frames), frames, weight) {
            Outcome::Recorded(slot) => {
                if let Outcome::Dropped(reason) = session.methods.record(frames[len - 1], weight) {
                    session.count_failure(reason);
                    session.count_dropped_method();
                }
                SampleOutcome::Recorded(slot)
            }
            Outcome::Dropped(reason) => {
                session.count_failure(reason);
                SampleOutcome::Dropped(reason)
            }
        }
    }

    /// Fill `buf` with the trace to record and return its length
    ///
    /// Layout: optional thread frame, walked frames (or one failure frame),
    /// optional event frame.
    fn capture(
        &self,
        session: &Session,
        tid: Tid,
        context: &W::Context,
        event: SampleEvent,
        buf: &mut [Frame],
    ) -> usize {
        let depth = buf.len() - EXTRA_FRAMES;
        let mut len = 0;
        if session.args.threads {
            buf[0] = Frame::thread(tid.0);
            len = 1;
        }

        let walked = self.walker.walk(context, &mut buf[len..len + depth]).min(depth);
        let failure = match walked.checked_sub(1).map(|leaf| FrameKind::of(&buf[len + leaf])) {
            None => Some(FailureReason::NoManagedFrame),
            Some(FrameKind::Failure(reason)) => match self.recover_top_frame(reason, context) {
                Some(frame) => {
                    buf[len + walked - 1] = frame;
                    None
                }
                None => Some(reason),
            },
            Some(FrameKind::Unrecognized(_)) => Some(FailureReason::UnknownState),
            Some(_) => None,
        };

        match failure {
            Some(reason) => {
                session.count_failure(reason);
                buf[len] = Frame::failure(reason.code());
                len += 1;
            }
            None => len += walked,
        }

        if let Some(subject) = event.subject {
            buf[len] = Frame::event(subject);
            len += 1;
        }
        len
    }

    /// Resolve the interrupted PC to a compiled method when the walker
    /// could not identify the top frame
    fn recover_top_frame(&self, reason: FailureReason, context: &W::Context) -> Option<Frame> {
        if !matches!(reason, FailureReason::UnknownManaged | FailureReason::NotWalkable) {
            return None;
        }
        let pc = self.walker.interrupted_pc(context)?;
        if !self.address_in_code(pc) {
            return None;
        }
        self.compiled.lookup(pc).map(|method| Frame::managed(method.0, 0))
    }

    /// Whether `pc` lies within the bounds of all compiled code seen so far
    pub fn address_in_code(&self, pc: u64) -> bool {
        self.compiled.in_bounds(pc)
    }

    // ------------------------------------------------------------------
    // Runtime notifications
    // ------------------------------------------------------------------

    pub fn add_compiled_method(&self, start: u64, length: u64, method: MethodId) {
        self.compiled.add(start, length, method);
    }

    pub fn remove_compiled_method(&self, start: u64, method: MethodId) -> bool {
        self.compiled.remove(start, &method)
    }

    pub fn add_runtime_stub(&self, start: u64, length: u64, name: &str) {
        self.stubs.add(start, length, name);
    }

    /// Returns false when the library limit is reached
    pub fn add_native_library(&self, library: NativeCodeCache) -> bool {
        log::info!("Native library {} ({} symbols)", library.name(), library.len());
        self.libraries.add(library)
    }

    /// Load symbols of every executable mapping not seen before
    ///
    /// Libraries whose symbols cannot be read are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if the process mappings cannot be read
    pub fn refresh_native_libraries(&self) -> anyhow::Result<usize> {
        let mut loaded = 0;
        for mapping in current_process_mappings()? {
            if self.libraries.contains_name(&mapping.path) {
                continue;
            }
            match NativeCodeCache::from_elf(&mapping.path, mapping.load_bias()) {
                Ok(library) => {
                    if !self.add_native_library(library) {
                        break;
                    }
                    loaded += 1;
                }
                Err(e) => log::warn!("Skipping {}: {e:#}", mapping.path),
            }
        }
        Ok(loaded)
    }

    pub fn register_method(&self, method: MethodId, name: &str) {
        self.names.register_method(method, name);
    }

    pub fn register_subject(&self, subject: u64, name: &str) {
        self.names.register_subject(subject, name);
    }

    pub fn on_thread_start(&self, tid: Tid, name: &str) {
        self.threads.on_thread_start(tid, name);
    }

    pub fn on_thread_end(&self, tid: Tid, name: Option<&str>) {
        self.threads.on_thread_end(tid, name);
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    /// Read-only view of the current (or last stopped) session
    ///
    /// Entries are read individually; while running, a snapshot may miss
    /// samples recorded during the copy but never sees a partial entry.
    ///
    /// # Errors
    /// [`ProfilerError::NoProfile`] if no session has been started
    pub fn snapshot(&self) -> Result<Snapshot, ProfilerError> {
        let guard = self.read_session();
        let session = guard.as_ref().ok_or(ProfilerError::NoProfile)?;
        let namer = FrameNamer {
            names: &self.names,
            threads: &self.threads,
            compiled: &self.compiled,
            stubs: &self.stubs,
            libraries: &self.libraries,
            simple: session.args.simple,
            annotate: session.args.annotate,
        };
        Ok(Snapshot::capture(session, &namer))
    }

    /// # Errors
    /// [`ProfilerError::NoProfile`] before the first session, or write errors
    pub fn dump_summary(&self, out: &mut dyn Write) -> Result<(), ProfilerError> {
        Ok(ReportGenerator::new(&self.snapshot()?).summary(out)?)
    }

    /// # Errors
    /// [`ProfilerError::NoProfile`] before the first session, or write errors
    pub fn dump_collapsed(
        &self,
        out: &mut dyn Write,
        counter: Counter,
    ) -> Result<(), ProfilerError> {
        Ok(ReportGenerator::new(&self.snapshot()?).collapsed(out, counter)?)
    }

    /// # Errors
    /// [`ProfilerError::NoProfile`] before the first session, or write errors
    pub fn dump_flame_graph(
        &self,
        out: &mut dyn Write,
        params: &FlameGraphParams,
        counter: Counter,
    ) -> Result<(), ProfilerError> {
        Ok(ReportGenerator::new(&self.snapshot()?).flame_graph(out, params, counter)?)
    }

    /// # Errors
    /// [`ProfilerError::NoProfile`] before the first session, or write errors
    pub fn dump_tree(
        &self,
        out: &mut dyn Write,
        params: &FlameGraphParams,
        counter: Counter,
    ) -> Result<(), ProfilerError> {
        Ok(ReportGenerator::new(&self.snapshot()?).tree(out, params, counter)?)
    }

    /// # Errors
    /// [`ProfilerError::NoProfile`] before the first session, or write errors
    pub fn dump_traces(&self, out: &mut dyn Write, max: usize) -> Result<(), ProfilerError> {
        Ok(ReportGenerator::new(&self.snapshot()?).traces(out, max)?)
    }

    /// # Errors
    /// [`ProfilerError::NoProfile`] before the first session, or write errors
    pub fn dump_flat(&self, out: &mut dyn Write, max: usize) -> Result<(), ProfilerError> {
        Ok(ReportGenerator::new(&self.snapshot()?).flat(out, max)?)
    }

    /// # Errors
    /// [`ProfilerError::NoProfile`] before the first session, or write errors
    pub fn dump_records(&self, out: &mut dyn Write) -> Result<(), ProfilerError> {
        Ok(crate::export::write_records(&self.snapshot()?, out)?)
    }

    /// Write the outputs selected in `args` to `file=` or to `out`
    fn write_dump(&self, args: &Arguments, out: &mut dyn Write) -> Result<(), ProfilerError> {
        let snapshot = self.snapshot()?;
        let report = ReportGenerator::new(&snapshot);
        match &args.file {
            Some(path) => {
                let mut file = BufWriter::new(File::create(path)?);
                report.dump(args, &mut file)?;
                log::info!("Profile written to {}", path.display());
                Ok(())
            }
            None => report.dump(args, out),
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Execute the action of a parsed option string
    ///
    /// `stop` and `dump` without any output selected write the summary and
    /// the top 200 traces and flat entries.
    ///
    /// # Errors
    /// State errors of `start`/`stop`, [`ProfilerError::NoProfile`] for a
    /// dump before any session, and I/O errors.
    pub fn run(&self, args: &Arguments, out: &mut dyn Write) -> Result<(), ProfilerError> {
        match args.action {
            Action::Start => {
                self.start(args)?;
                writeln!(out, "Started [{}] profiling", args.event)?;
            }
            Action::Stop => {
                self.stop()?;
                self.write_dump(&args.or_default_outputs(), out)?;
            }
            Action::Dump => self.write_dump(&args.or_default_outputs(), out)?,
            Action::Status => match self.state() {
                State::Running => {
                    let uptime = self.read_session().as_ref().map_or(0, |s| s.uptime().as_secs());
                    writeln!(out, "Profiling is running for {uptime} seconds")?;
                }
                State::Idle => writeln!(out, "{}", ProfilerError::NotRunning)?,
                State::Terminated => writeln!(out, "{}", ProfilerError::Terminated)?,
            },
            Action::List => {
                writeln!(out, "Basic events:")?;
                for event in EventKind::ALL {
                    writeln!(out, "  {event}")?;
                }
            }
            Action::Version => writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?,
            Action::None => {
                if args.dump_requested() {
                    self.write_dump(args, out)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::walker::{ThreadStack, ThreadStackWalker};
    use stackscope_common::{TICKS_GC_ACTIVE, TICKS_NOT_WALKABLE};

    const CPU: SampleEvent = SampleEvent::tick(EventKind::Cpu);

    fn profiler() -> Profiler<ThreadStackWalker> {
        Profiler::with_table_config(
            ThreadStackWalker,
            TableConfig { capacity: 1024, ..TableConfig::default() },
        )
    }

    fn started(options: &str) -> Profiler<ThreadStackWalker> {
        let profiler = profiler();
        profiler.start(&Arguments::parse(options).unwrap()).unwrap();
        profiler
    }

    fn stack(methods: &[u64]) -> ThreadStack {
        ThreadStack::new(methods.iter().map(|&m| Frame::managed(m, 0)).collect())
    }

    fn collapsed(profiler: &Profiler<ThreadStackWalker>) -> String {
        let mut out = Vec::new();
        profiler.dump_collapsed(&mut out, Counter::Samples).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_state_machine() {
        let profiler = profiler();
        assert_eq!(profiler.state(), State::Idle);
        assert!(matches!(profiler.stop(), Err(ProfilerError::NotRunning)));

        profiler.start(&Arguments::default()).unwrap();
        assert_eq!(profiler.state(), State::Running);
        assert!(matches!(profiler.start(&Arguments::default()), Err(ProfilerError::AlreadyRunning)));

        profiler.stop().unwrap();
        assert_eq!(profiler.state(), State::Idle);

        profiler.shutdown(&Arguments::default(), &mut Vec::new()).unwrap();
        assert_eq!(profiler.state(), State::Terminated);
        assert!(matches!(profiler.start(&Arguments::default()), Err(ProfilerError::Terminated)));
        assert!(matches!(profiler.stop(), Err(ProfilerError::Terminated)));
    }

    #[test]
    fn test_samples_outside_session_are_ignored() {
        let profiler = profiler();
        assert_eq!(profiler.record_sample(&stack(&[1]), 1, CPU), SampleOutcome::Inactive);
        assert!(matches!(profiler.snapshot(), Err(ProfilerError::NoProfile)));

        profiler.start(&Arguments::default()).unwrap();
        profiler.stop().unwrap();
        assert_eq!(profiler.record_sample(&stack(&[1]), 1, CPU), SampleOutcome::Inactive);
        assert_eq!(profiler.snapshot().unwrap().info.total_samples, 0);
    }

    #[test]
    fn test_event_kind_must_match_session() {
        let profiler = started("event=alloc");
        assert_eq!(profiler.record_sample(&stack(&[1]), 1, CPU), SampleOutcome::Inactive);
        assert!(profiler
            .record_sample(&stack(&[1]), 64, SampleEvent::with_subject(EventKind::Alloc, 9))
            .is_recorded());
    }

    #[test]
    fn test_empty_walk_records_failure_frame() {
        let profiler = started("");
        assert!(profiler.record_sample(&stack(&[]), 1, CPU).is_recorded());

        let snapshot = profiler.snapshot().unwrap();
        assert_eq!(snapshot.info.failure_count(FailureReason::NoManagedFrame), 1);
        assert_eq!(collapsed(&profiler), "[no_managed_frame] 1\n");
    }

    #[test]
    fn test_failure_sentinel_collapses_trace() {
        let profiler = started("");
        let mut frames = stack(&[1, 2]);
        frames.frames.push(Frame::failure(TICKS_GC_ACTIVE));
        profiler.record_sample(&frames, 1, CPU);

        let snapshot = profiler.snapshot().unwrap();
        assert_eq!(snapshot.info.failure_count(FailureReason::GcActive), 1);
        assert_eq!(snapshot.traces.len(), 1);
        assert_eq!(snapshot.traces[0].frames.len(), 1);
        assert_eq!(snapshot.traces[0].frames[0].name, "[gc_active]");
    }

    #[test]
    fn test_unrecognized_code_counts_as_unknown_state() {
        let profiler = started("");
        profiler.record_sample(&ThreadStack::new(vec![Frame::failure(-99)]), 1, CPU);
        let snapshot = profiler.snapshot().unwrap();
        assert_eq!(snapshot.info.failure_count(FailureReason::UnknownState), 1);
    }

    #[test]
    fn test_top_frame_recovered_from_compiled_code() {
        let profiler = started("");
        profiler.add_compiled_method(0x7000, 0x100, MethodId(5));
        profiler.register_method(MethodId(5), "app.Hot.loop");
        assert!(profiler.address_in_code(0x7080));
        assert!(!profiler.address_in_code(0x9000));

        let mut frames = stack(&[1]);
        frames.frames.push(Frame::failure(TICKS_NOT_WALKABLE));
        profiler.record_sample(&frames.clone().with_pc(0x7080), 1, CPU);
        // Outside compiled code the failure stands
        profiler.record_sample(&frames.with_pc(0x9000), 1, CPU);

        let snapshot = profiler.snapshot().unwrap();
        assert_eq!(snapshot.info.failure_count(FailureReason::NotWalkable), 1);
        let recovered = &snapshot.traces[0];
        assert_eq!(recovered.frames.last().unwrap().name, "app.Hot.loop");
        assert_eq!(recovered.frames.last().unwrap().frame, Frame::managed(5, 0));
    }

    #[test]
    fn test_removed_method_no_longer_recovers() {
        let profiler = started("");
        profiler.add_compiled_method(0x7000, 0x100, MethodId(5));
        assert!(profiler.remove_compiled_method(0x7000, MethodId(5)));

        let frames =
            ThreadStack::new(vec![Frame::failure(TICKS_NOT_WALKABLE)]).with_pc(0x7010);
        profiler.record_sample(&frames, 1, CPU);
        let snapshot = profiler.snapshot().unwrap();
        assert_eq!(snapshot.info.failure_count(FailureReason::NotWalkable), 1);
    }

    #[test]
    fn test_thread_and_event_frames() {
        let profiler = started("event=lock,threads");
        profiler.on_thread_start(Tid(77), "db-pool-1");
        profiler.register_method(MethodId(1), "Db.query");
        profiler.register_subject(3, "java.lang.Object");

        let event = SampleEvent::with_subject(EventKind::Lock, 3);
        profiler.record_sample_as(Tid(77), &stack(&[1]), 1500, event);

        let mut out = Vec::new();
        profiler.dump_collapsed(&mut out, Counter::Total).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[db-pool-1 tid=77];Db.query;java.lang.Object 1500\n"
        );
    }

    #[test]
    fn test_full_method_table_counts_failure() {
        use crate::profiling::method_table::hash_method;

        let profiler = Profiler::with_table_config(
            ThreadStackWalker,
            TableConfig { capacity: 64, probe_limit: 1, ..TableConfig::default() },
        );
        let home = |hash: u64| hash.max(1) % 64;
        let trace_home = |leaf: u64| home(hash_call_trace(&stack(&[1, leaf]).frames));
        let method_home = |leaf: u64| home(hash_method(&Frame::managed(leaf, 0)));

        // Two leaves sharing a method slot but not a trace slot
        let (a, b) = (2..5000u64)
            .flat_map(|a| (a + 1..a + 200).map(move |b| (a, b)))
            .find(|&(a, b)| method_home(a) == method_home(b) && trace_home(a) != trace_home(b))
            .unwrap();

        profiler.start(&Arguments::default()).unwrap();
        assert!(profiler.record_sample(&stack(&[1, a]), 1, CPU).is_recorded());
        assert!(profiler.record_sample(&stack(&[1, b]), 1, CPU).is_recorded());
        profiler.stop().unwrap();

        let snapshot = profiler.snapshot().unwrap();
        assert_eq!(snapshot.traces.len(), 2);
        assert_eq!(snapshot.methods.len(), 1);
        assert_eq!(snapshot.info.failure_count(FailureReason::CollisionOverflow), 1);
        assert_eq!(snapshot.info.total_failures(), 1);
        assert_eq!(snapshot.info.dropped_methods, 1);
    }

    #[test]
    fn test_busy_buffers_skip_sample() {
        let profiler = started("");
        let tid = Tid(5);
        {
            let guard = profiler.read_session();
            let session = guard.as_ref().unwrap();
            let _held: Vec<_> = (0..3).map(|_| session.buffers.acquire(tid).unwrap()).collect();
            assert_eq!(
                profiler.record_sample_as(tid, &stack(&[1]), 1, CPU),
                SampleOutcome::Dropped(FailureReason::Skipped)
            );
        }
        assert!(profiler.record_sample_as(tid, &stack(&[1]), 1, CPU).is_recorded());
        let snapshot = profiler.snapshot().unwrap();
        assert_eq!(snapshot.info.failure_count(FailureReason::Skipped), 1);
        assert_eq!(snapshot.info.total_samples, 2);
    }

    #[test]
    fn test_deep_stack_truncated_to_depth() {
        let profiler = started("jstackdepth=3");
        profiler.record_sample(&stack(&[1, 2, 3, 4, 5]), 1, CPU);
        let snapshot = profiler.snapshot().unwrap();
        let frames: Vec<_> = snapshot.traces[0].frames.iter().map(|f| f.frame.method).collect();
        assert_eq!(frames, vec![3, 4, 5]);
    }

    #[test]
    fn test_run_actions() {
        let profiler = profiler();
        let mut out = Vec::new();
        profiler.run(&Arguments::parse("status").unwrap(), &mut out).unwrap();
        profiler.run(&Arguments::parse("start").unwrap(), &mut out).unwrap();
        profiler.run(&Arguments::parse("status").unwrap(), &mut out).unwrap();
        profiler.run(&Arguments::parse("list").unwrap(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Profiler is not active\n"));
        assert!(text.contains("Started [cpu] profiling\n"));
        assert!(text.contains("Profiling is running for 0 seconds\n"));
        assert!(text.contains("Basic events:\n  cpu\n  alloc\n"));
    }

    #[test]
    fn test_stop_without_outputs_writes_defaults() {
        let profiler = started("");
        profiler.register_method(MethodId(1), "Main.main");
        profiler.record_sample(&stack(&[1]), 10, CPU);

        let mut out = Vec::new();
        profiler.run(&Arguments::parse("stop").unwrap(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("--- Execution profile ---"));
        assert!(text.contains("  [ 0] Main.main"));
        assert!(text.contains("percent  samples  top"));
    }

    #[test]
    fn test_dump_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.txt");
        let profiler = started("");
        profiler.record_sample(&stack(&[1, 2]), 1, CPU);

        let options = format!("dump,collapsed,file={}", path.display());
        let mut out = Vec::new();
        profiler.run(&Arguments::parse(&options).unwrap(), &mut out).unwrap();

        assert!(out.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "method@0x1;method@0x2 1\n");
    }

    #[test]
    fn test_shutdown_dumps_and_releases() {
        let profiler = started("");
        profiler.record_sample(&stack(&[1]), 1, CPU);

        let mut out = Vec::new();
        profiler.shutdown(&Arguments::parse("collapsed").unwrap(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "method@0x1 1\n");
        assert!(matches!(profiler.snapshot(), Err(ProfilerError::NoProfile)));
        // Idempotent
        profiler.shutdown(&Arguments::default(), &mut Vec::new()).unwrap();
    }
}
