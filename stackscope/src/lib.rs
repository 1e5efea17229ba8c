//! # stackscope - Low-Overhead Sampling Profiler Engine
//!
//! stackscope is the in-process core of a sampling profiler. External
//! triggers (CPU timers, allocation hooks, lock-contention hooks) interrupt a
//! thread and hand its execution context to the engine, which captures the
//! call stack, deduplicates it and aggregates counts in fixed-capacity
//! tables. Everything on that path is bounded, non-blocking and
//! allocation-free, because it may run inside a signal handler.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Managed Runtime (embedder)                   │
//! │  thread start/end, code install/unload, method names, triggers  │
//! └───────────────┬─────────────────────────────────┬───────────────┘
//!                 │ record_sample                   │ notifications
//!                 ▼                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      stackscope (This Crate)                    │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Profiler    │──▶│  CallTrace   │──▶│ FrameBuffer  │         │
//! │  │ (state, walk)│   │  Table       │   │ (frames)     │         │
//! │  └──────┬───────┘   └──────────────┘   └──────────────┘         │
//! │         │           ┌──────────────┐   ┌──────────────┐         │
//! │         ├──────────▶│ MethodSample │   │  CodeCaches  │         │
//! │         │           │  Table       │   │ (symbolize)  │         │
//! │         ▼           └──────────────┘   └──────┬───────┘         │
//! │  ┌──────────────┐                             │                 │
//! │  │  Snapshot    │◀────────────────────────────┘                 │
//! │  └──────┬───────┘                                               │
//! │         ▼                                                       │
//! │  ┌──────────────┐   ┌──────────────┐                            │
//! │  │   Reports    │   │    Export    │                            │
//! │  │ (text, JSON) │   │  (.jsonl)    │                            │
//! │  └──────────────┘   └──────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`profiling`]: the sampling engine and session state machine
//!   - `profiler`: start/stop/shutdown, sample capture, action dispatch
//!   - `call_trace_table` / `method_table`: deduplicating aggregation tables
//!   - `frame_buffer`: append-only frame arena shared by all traces
//!
//! - [`symbolization`]: address to name resolution
//!   - `CodeCache` for compiled code and runtime stubs
//!   - `NativeCodeCache` loaded from ELF symbol tables via `object`
//!
//! - [`report`]: immutable snapshots and the text/JSON reports built on them
//!
//! - [`export`]: raw JSON Lines record dump and its reader
//!
//! - [`config`]: comma-delimited agent option string
//!
//! - [`cli`]: flags of the `stackscope` binary
//!
//! - [`domain`]: core types (`MethodId`, `Tid`, `EventKind`, `FailureReason`)
//!   and errors
//!
//! ## Frame Layout
//!
//! Frames are the `#[repr(C)]` [`stackscope_common::Frame`] shared with the
//! stack walker. Negative locations are sentinels for native, thread and
//! event frames and for capture failures.

pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod profiling;
pub mod report;
pub mod symbolization;
