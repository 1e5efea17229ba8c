//! Synthetic workload behind `--demo`
//!
//! Each worker burns CPU for one pacing period inside a stack picked from a
//! small fixed call graph and then samples itself, the way a timer signal
//! handler would. A few samples carry walker failures so the failure
//! counters and top-frame recovery show up in the reports.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, TryRecvError};
use log::debug;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use stackscope::config::Arguments;
use stackscope::domain::{EventKind, MethodId, SampleEvent};
use stackscope::profiling::{current_tid, Profiler, ThreadStack, ThreadStackWalker};
use stackscope_common::{Frame, TICKS_GC_ACTIVE, TICKS_NOT_WALKABLE};

pub type DemoProfiler = Profiler<ThreadStackWalker>;

const MAIN: u64 = 1;
const RUN: u64 = 2;
const PARSE: u64 = 3;
const LEX: u64 = 4;
const ENCODE: u64 = 5;
const CHECKSUM: u64 = 6;
const FLUSH: u64 = 7;

const METHODS: [(u64, &str); 7] = [
    (MAIN, "demo.Main.main"),
    (RUN, "demo.Worker.run"),
    (PARSE, "demo.Parser.parse"),
    (LEX, "demo.Parser.lex"),
    (ENCODE, "demo.Codec.encode"),
    (CHECKSUM, "demo.Codec.checksum"),
    (FLUSH, "demo.Store.flush"),
];

const BYTE_ARRAY: u64 = 0x100;
const RECORD: u64 = 0x200;
const STORE_LOCK: u64 = 0x300;

const SUBJECTS: [(u64, &str); 3] =
    [(BYTE_ARRAY, "byte[]"), (RECORD, "demo.Record"), (STORE_LOCK, "demo.Store$Lock")];

/// Method `m` is "compiled" at `CODE_BASE + m * CODE_SIZE`
const CODE_BASE: u64 = 0x1000_0000;
const CODE_SIZE: u64 = 0x400;
const STUB_BASE: u64 = 0x0f00_0000;
const STUB_SIZE: u64 = 0x100;

const fn code_start(method: u64) -> u64 {
    CODE_BASE + method * CODE_SIZE
}

/// Register names, compiled code and stubs of the demo program
pub fn install(profiler: &DemoProfiler) {
    for (id, name) in METHODS {
        profiler.register_method(MethodId(id), name);
        profiler.add_compiled_method(code_start(id), CODE_SIZE, MethodId(id));
    }
    for (subject, name) in SUBJECTS {
        profiler.register_subject(subject, name);
    }
    profiler.add_runtime_stub(STUB_BASE, STUB_SIZE, "call_stub");
}

/// Time each worker spends between two samples
///
/// Allocation sampling has no time interval; it is paced at 1 ms.
pub fn pacing(args: &Arguments) -> Duration {
    match args.event {
        EventKind::Alloc => Duration::from_millis(1),
        _ => Duration::from_nanos(args.effective_interval().max(100_000)),
    }
}

/// Spawn `count` workers that run until `stop` is disconnected
///
/// Each worker returns the number of samples it got recorded.
///
/// # Errors
/// Returns an error if a thread cannot be spawned
pub fn spawn_workers(
    profiler: &Arc<DemoProfiler>,
    count: u16,
    event: EventKind,
    pacing: Duration,
    stop: &Receiver<()>,
) -> Result<Vec<JoinHandle<u64>>> {
    (0..count)
        .map(|index| {
            let profiler = Arc::clone(profiler);
            let stop = stop.clone();
            let name = format!("demo-worker-{index}");
            std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker(&profiler, &name, index, event, pacing, &stop))
                .context("Failed to spawn demo worker")
        })
        .collect()
}

fn worker(
    profiler: &DemoProfiler,
    name: &str,
    index: u16,
    event: EventKind,
    pacing: Duration,
    stop: &Receiver<()>,
) -> u64 {
    let tid = current_tid();
    profiler.on_thread_start(tid, name);

    let mut rng = XorShift::new(u64::from(index) + 1);
    let mut recorded = 0;
    let mut acc = 0;
    loop {
        match stop.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        let roll = rng.next();
        let stack = pick_stack(roll);
        let started = Instant::now();
        acc = spin(acc, pacing);
        let elapsed = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);

        let (weight, sample) = match event {
            EventKind::Alloc => {
                let subject = if roll & 0x100 == 0 { BYTE_ARRAY } else { RECORD };
                (64 + (roll >> 16) % 4096, SampleEvent::with_subject(event, subject))
            }
            EventKind::Lock => (elapsed, SampleEvent::with_subject(event, STORE_LOCK)),
            _ => (elapsed, SampleEvent::tick(event)),
        };
        if profiler.record_sample(&stack, weight, sample).is_recorded() {
            recorded += 1;
        }
    }

    profiler.on_thread_end(tid, None);
    debug!("{name} finished: {recorded} samples recorded (acc {acc:x})");
    recorded
}

/// Stack of the code a worker is "executing" for this roll
fn pick_stack(roll: u64) -> ThreadStack {
    let managed = |methods: &[u64]| -> Vec<Frame> {
        methods.iter().map(|&m| Frame::managed(m, 0)).collect()
    };

    match roll % 16 {
        0..=5 => ThreadStack::new(managed(&[MAIN, RUN, PARSE, LEX])),
        6..=8 => ThreadStack::new(managed(&[MAIN, RUN, PARSE])),
        9..=12 => ThreadStack::new(managed(&[MAIN, RUN, ENCODE, CHECKSUM])),
        13 | 14 => {
            let mut frames = managed(&[MAIN, RUN]);
            frames.push(Frame::native(STUB_BASE + 0x10));
            frames.push(Frame::managed(FLUSH, 0));
            frames.push(Frame::native(libc::getpid as usize as u64));
            ThreadStack::new(frames)
        }
        _ if roll & 0x10 == 0 => {
            let mut frames = managed(&[MAIN]);
            frames.push(Frame::failure(TICKS_GC_ACTIVE));
            ThreadStack::new(frames)
        }
        _ => {
            // Interrupted in checksum before the walker could see its frame
            let mut frames = managed(&[MAIN, RUN, ENCODE]);
            frames.push(Frame::failure(TICKS_NOT_WALKABLE));
            ThreadStack::new(frames).with_pc(code_start(CHECKSUM) + 0x40)
        }
    }
}

fn spin(mut acc: u64, pacing: Duration) -> u64 {
    let deadline = Instant::now() + pacing;
    while Instant::now() < deadline {
        for i in 0..256u64 {
            acc = acc.rotate_left(5) ^ i.wrapping_mul(0x9e37_79b9);
        }
    }
    std::hint::black_box(acc)
}

struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1)
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackscope::config::Counter;

    #[test]
    fn test_recovered_stack_resolves_checksum() {
        let profiler = DemoProfiler::new(ThreadStackWalker);
        install(&profiler);
        profiler.start(&Arguments::default()).unwrap();

        let stack = pick_stack(31);
        assert_eq!(stack.pc, Some(code_start(CHECKSUM) + 0x40));
        let cpu = SampleEvent::tick(EventKind::Cpu);
        assert!(profiler.record_sample(&stack, 1, cpu).is_recorded());
        profiler.stop().unwrap();

        let mut out = Vec::new();
        profiler.dump_collapsed(&mut out, Counter::Samples).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "demo.Main.main;demo.Worker.run;demo.Codec.encode;demo.Codec.checksum 1\n"
        );
    }

    #[test]
    fn test_workers_stop_on_disconnect() {
        let profiler = Arc::new(DemoProfiler::new(ThreadStackWalker));
        install(&profiler);
        profiler.start(&Arguments::default()).unwrap();

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let workers = spawn_workers(
            &profiler,
            2,
            EventKind::Cpu,
            Duration::from_micros(200),
            &stop_rx,
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        drop(stop_tx);

        let recorded: u64 = workers.into_iter().map(|h| h.join().unwrap()).sum();
        profiler.stop().unwrap();
        assert!(recorded > 0);
        assert!(profiler.snapshot().unwrap().info.total_samples >= recorded);
    }

    #[test]
    fn test_alloc_pacing() {
        let args = Arguments::parse("event=alloc").unwrap();
        assert_eq!(pacing(&args), Duration::from_millis(1));
        let args = Arguments::parse("interval=1ms").unwrap();
        assert_eq!(pacing(&args), Duration::from_millis(1));
    }
}
