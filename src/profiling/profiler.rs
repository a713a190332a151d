//! Chrome Trace (flame style) profiling of frames, phases and tasks.
//!
//! Feature-gated with `--features profiling`. Without the feature every
//! function here is an empty inline stub.
//!
//! Usage:
//!   hearth_engine::profiler::init("profile/trace.json");
//!   {
//!     let _span = hearth_engine::profiler::span("frame");
//!     // run a frame...
//!   }
//!   hearth_engine::profiler::shutdown();

use std::path::Path;

#[cfg(feature = "profiling")]
mod enabled {
    use std::fs::File;
    use std::io::BufWriter;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Mutex, OnceLock, PoisonError};
    use std::time::Instant;

    use serde::Serialize;


    /// One Chrome trace event: `ph: "X"` spans and `ph: "M"` thread names.
    #[derive(Debug, Serialize)]
    struct TraceEvent {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cat: Option<&'static str>,
        ph: &'static str,
        ts: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        dur: Option<u64>,
        pid: u32,
        tid: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        args: Option<ThreadNameArgs>,
    }

    #[derive(Debug, Serialize)]
    struct ThreadNameArgs {
        name: String,
    }

    #[derive(Serialize)]
    struct TraceFile {
        #[serde(rename = "traceEvents")]
        trace_events: Vec<TraceEvent>,
    }

    struct ProfilerState {
        start: Instant,
        out_path: PathBuf,
        is_on: AtomicBool,
        events: Mutex<Vec<TraceEvent>>,
    }

    static STATE: OnceLock<ProfilerState> = OnceLock::new();
    static NEXT_TID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
    }

    fn active() -> Option<&'static ProfilerState> {
        STATE.get().filter(|state| state.is_on.load(Ordering::Acquire))
    }

    fn tid() -> u64 {
        TID.with(|tid| *tid)
    }

    fn record(state: &ProfilerState, event: TraceEvent) {
        state
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn init(path: &Path) {
        let fresh = STATE.set(ProfilerState {
            start: Instant::now(),
            out_path: path.to_path_buf(),
            is_on: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
        });
        if fresh.is_err() {
            log::warn!("profiler already initialized, keeping the first output path");
        }
    }

    pub fn shutdown() {
        let Some(state) = STATE.get() else {
            return;
        };
        state.is_on.store(false, Ordering::Release);

        let trace = TraceFile {
            trace_events: std::mem::take(
                &mut *state.events.lock().unwrap_or_else(PoisonError::into_inner),
            ),
        };
        let written = state
            .out_path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| File::create(&state.out_path))
            .map_err(serde_json::Error::io)
            .and_then(|file| serde_json::to_writer(BufWriter::new(file), &trace));

        match written {
            Ok(()) => log::info!(
                "profiler wrote {} events to {}",
                trace.trace_events.len(),
                state.out_path.display()
            ),
            Err(error) => log::error!("profiler failed to write trace: {error}"),
        }
    }

    pub fn set_thread_name(name: &str) {
        if let Some(state) = active() {
            record(
                state,
                TraceEvent {
                    name: "thread_name".to_owned(),
                    cat: None,
                    ph: "M",
                    ts: state.start.elapsed().as_micros() as u64,
                    dur: None,
                    pid: 1,
                    tid: tid(),
                    args: Some(ThreadNameArgs {
                        name: name.to_owned(),
                    }),
                },
            );
        }
    }

    pub struct SpanGuard {
        open: Option<(String, u64)>,
    }

    pub fn span(name: &str) -> SpanGuard {
        SpanGuard {
            open: active().map(|state| (name.to_owned(), state.start.elapsed().as_micros() as u64)),
        }
    }

    impl Drop for SpanGuard {
        fn drop(&mut self) {
            let Some((name, ts)) = self.open.take() else {
                return;
            };
            if let Some(state) = active() {
                let end = state.start.elapsed().as_micros() as u64;
                record(
                    state,
                    TraceEvent {
                        name,
                        cat: Some("engine"),
                        ph: "X",
                        ts,
                        dur: Some(end.saturating_sub(ts)),
                        pid: 1,
                        tid: tid(),
                        args: None,
                    },
                );
            }
        }
    }
}

/// RAII guard recording a span from creation to drop.
#[cfg(feature = "profiling")]
pub struct SpanGuard(#[allow(dead_code)] enabled::SpanGuard);

/// RAII guard recording a span from creation to drop.
#[cfg(not(feature = "profiling"))]
pub struct SpanGuard;

/// Starts recording; the trace is written to `path` on [`shutdown`].
#[inline]
pub fn init<P: AsRef<Path>>(path: P) {
    #[cfg(feature = "profiling")]
    enabled::init(path.as_ref());
    #[cfg(not(feature = "profiling"))]
    let _ = path;
}

/// Stops recording and writes the trace file.
#[inline]
pub fn shutdown() {
    #[cfg(feature = "profiling")]
    enabled::shutdown();
}

/// Opens a span named `name` on the calling thread.
#[inline]
#[must_use = "the span closes when the guard is dropped"]
pub fn span(name: &str) -> SpanGuard {
    #[cfg(feature = "profiling")]
    {
        SpanGuard(enabled::span(name))
    }
    #[cfg(not(feature = "profiling"))]
    {
        let _ = name;
        SpanGuard
    }
}

/// Labels the calling thread in the trace viewer.
#[inline]
pub fn set_thread_name(name: &str) {
    #[cfg(feature = "profiling")]
    enabled::set_thread_name(name);
    #[cfg(not(feature = "profiling"))]
    let _ = name;
}
