//! Agent option string parsing
//!
//! Options arrive as one comma-delimited `key[=value]` string, e.g.
//! `start,event=alloc,interval=512k,collapsed=total,file=out.txt`.
//! Parsing fails fast on the first unknown key or malformed value, before a
//! session is started.

use stackscope_common::{DEFAULT_FRAMEBUF, DEFAULT_INTERVAL, MAX_STACK_FRAMES};
use std::path::PathBuf;

use crate::domain::{ConfigError, EventKind};

/// Top-N of the traces and flat dumps when no output is selected
pub const DEFAULT_DUMP_LIMIT: usize = 200;

/// What the profiler is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    None,
    Start,
    Stop,
    Status,
    List,
    Version,
    Dump,
}

/// Which aggregate weighs a trace in collapsed, tree and flame graph output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Counter {
    /// Number of samples
    #[default]
    Samples,
    /// Sum of sample weights (time, bytes)
    Total,
}

/// Flame graph and call tree rendering parameters
#[derive(Debug, Clone, PartialEq)]
pub struct FlameGraphParams {
    pub title: String,
    /// Canvas width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames narrower than this many pixels are elided
    pub min_width: f64,
    /// Merge stacks from the leaf instead of the root
    pub reverse: bool,
}

impl Default for FlameGraphParams {
    fn default() -> Self {
        Self {
            title: "Flame Graph".to_string(),
            width: 1200,
            height: 16,
            min_width: 1.0,
            reverse: false,
        }
    }
}

/// Immutable profiler configuration, captured when a session starts
#[derive(Debug, Clone, PartialEq)]
pub struct Arguments {
    pub action: Action,
    pub event: EventKind,
    /// Sampling interval; 0 selects the default for the event
    pub interval: u64,
    pub max_stack_depth: usize,
    pub frame_buffer_size: usize,
    pub threads: bool,
    pub simple: bool,
    pub annotate: bool,
    pub file: Option<PathBuf>,
    pub counter: Counter,
    pub dump_collapsed: bool,
    pub dump_flame_graph: bool,
    pub dump_tree: bool,
    pub dump_summary: bool,
    pub dump_records: bool,
    pub dump_traces: usize,
    pub dump_flat: usize,
    pub flame_graph: FlameGraphParams,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            action: Action::None,
            event: EventKind::Cpu,
            interval: 0,
            max_stack_depth: MAX_STACK_FRAMES,
            frame_buffer_size: DEFAULT_FRAMEBUF,
            threads: false,
            simple: false,
            annotate: false,
            file: None,
            counter: Counter::Samples,
            dump_collapsed: false,
            dump_flame_graph: false,
            dump_tree: false,
            dump_summary: false,
            dump_records: false,
            dump_traces: 0,
            dump_flat: 0,
            flame_graph: FlameGraphParams::default(),
        }
    }
}

impl Arguments {
    /// Parse a comma-delimited option string
    ///
    /// # Errors
    /// Returns a [`ConfigError`] naming the first option that is unknown or
    /// carries an invalid value.
    pub fn parse(options: &str) -> Result<Self, ConfigError> {
        let mut args = Self::default();

        for token in options.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (token, None),
            };

            match key {
                "start" => args.action = Action::Start,
                "stop" => args.action = Action::Stop,
                "status" => args.action = Action::Status,
                "list" => args.action = Action::List,
                "version" => args.action = Action::Version,
                "dump" => args.action = Action::Dump,
                "event" => args.event = required(key, value)?.parse()?,
                "interval" => args.interval = parse_units(key, required(key, value)?)?,
                "jstackdepth" => {
                    let raw = required(key, value)?;
                    args.max_stack_depth = parse_number(key, raw)?;
                    if args.max_stack_depth > MAX_STACK_FRAMES {
                        return Err(invalid(key, raw));
                    }
                }
                "framebuf" => {
                    args.frame_buffer_size = parse_number(key, required(key, value)?)?;
                }
                "threads" => args.threads = true,
                "simple" => args.simple = true,
                "annotate" => args.annotate = true,
                "file" => args.file = Some(PathBuf::from(required(key, value)?)),
                "collapsed" | "folded" => {
                    args.dump_collapsed = true;
                    args.counter = parse_counter(key, value)?;
                }
                "flamegraph" | "svg" => {
                    args.dump_flame_graph = true;
                    args.counter = parse_counter(key, value)?;
                }
                "tree" => {
                    args.dump_tree = true;
                    args.counter = parse_counter(key, value)?;
                }
                "summary" => args.dump_summary = true,
                "records" => args.dump_records = true,
                "traces" => args.dump_traces = parse_limit(key, value)?,
                "flat" => args.dump_flat = parse_limit(key, value)?,
                "title" => args.flame_graph.title = required(key, value)?.to_string(),
                "width" => args.flame_graph.width = parse_pixels(key, required(key, value)?)?,
                "height" => args.flame_graph.height = parse_pixels(key, required(key, value)?)?,
                "minwidth" => {
                    let raw = required(key, value)?;
                    args.flame_graph.min_width = raw
                        .parse::<f64>()
                        .ok()
                        .filter(|w| w.is_finite() && *w >= 0.0)
                        .ok_or_else(|| invalid(key, raw))?;
                }
                "reverse" => args.flame_graph.reverse = true,
                _ => return Err(ConfigError::UnknownOption(key.to_string())),
            }
        }

        if args.max_stack_depth == 0 {
            args.max_stack_depth = MAX_STACK_FRAMES;
        }
        if args.frame_buffer_size == 0 {
            return Err(invalid("framebuf", "0"));
        }

        Ok(args)
    }

    /// True if any dump selector is set
    #[must_use]
    pub fn dump_requested(&self) -> bool {
        self.dump_collapsed
            || self.dump_flame_graph
            || self.dump_tree
            || self.dump_summary
            || self.dump_records
            || self.dump_traces > 0
            || self.dump_flat > 0
    }

    /// These arguments, or with summary, traces and flat selected if no
    /// output is
    #[must_use]
    pub fn or_default_outputs(&self) -> Self {
        if self.dump_requested() {
            return self.clone();
        }
        Self {
            dump_summary: true,
            dump_traces: DEFAULT_DUMP_LIMIT,
            dump_flat: DEFAULT_DUMP_LIMIT,
            ..self.clone()
        }
    }

    /// Sampling interval with the event default applied
    #[must_use]
    pub fn effective_interval(&self) -> u64 {
        if self.interval > 0 {
            self.interval
        } else {
            match self.event {
                // Every allocation sample is recorded by default
                EventKind::Alloc => 0,
                _ => DEFAULT_INTERVAL,
            }
        }
    }
}

fn invalid(option: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { option: option.to_string(), value: value.to_string() }
}

fn required<'a>(option: &str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| invalid(option, ""))
}

fn parse_number<T: std::str::FromStr>(option: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(option, value))
}

/// Flame graph dimensions; zero would elide every node
fn parse_pixels(option: &str, value: &str) -> Result<u32, ConfigError> {
    match parse_number(option, value)? {
        0 => Err(invalid(option, value)),
        px => Ok(px),
    }
}

fn parse_counter(option: &str, value: Option<&str>) -> Result<Counter, ConfigError> {
    match value {
        None | Some("samples") => Ok(Counter::Samples),
        Some("total") => Ok(Counter::Total),
        Some(other) => Err(invalid(option, other)),
    }
}

fn parse_limit(option: &str, value: Option<&str>) -> Result<usize, ConfigError> {
    match value {
        None => Ok(usize::MAX),
        Some(raw) => parse_number(option, raw),
    }
}

/// Parse a number with an optional unit suffix.
///
/// Time suffixes (`ns`, `us`, `ms`, `s`) convert to nanoseconds; size
/// multipliers (`k`, `m`, `g`) are powers of 1024.
fn parse_units(option: &str, value: &str) -> Result<u64, ConfigError> {
    let lower = value.to_ascii_lowercase();
    let (digits, multiplier) = [
        ("ns", 1),
        ("us", 1_000),
        ("ms", 1_000_000),
        ("s", 1_000_000_000),
        ("k", 1 << 10),
        ("m", 1 << 20),
        ("g", 1 << 30),
    ]
    .into_iter()
    .find_map(|(suffix, mul)| lower.strip_suffix(suffix).map(|d| (d, mul)))
    .unwrap_or((lower.as_str(), 1));

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| invalid(option, value))
}
