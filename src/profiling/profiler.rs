//! Chrome Trace ("flame style") profiling.
//!
//! Feature-gated with `--features profiling`.
//!
//! Usage:
//!   taskstream::profiler::init("profile/trace.json");
//!   {
//!     let _g = taskstream::profiler::span("DriverGraph::begin_frame");
//!     // run a frame...
//!   }
//!   taskstream::profiler::shutdown();

use std::path::Path;

#[cfg(feature = "profiling")]
mod enabled {
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Mutex, OnceLock};
    use std::time::Instant;


    /// A Chrome trace "complete event" (`ph:"X"`).
    struct TraceEvent {
        name: &'static str,
        ts_us: u64,
        dur_us: u64,
        tid: u64,
    }

    struct ProfilerState {
        start: Instant,
        out_path: PathBuf,
        events: Mutex<Vec<TraceEvent>>,
    }

    static STATE: OnceLock<ProfilerState> = OnceLock::new();
    static NEXT_TID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
    }

    fn now_us() -> Option<u64> {
        STATE.get().map(|state| state.start.elapsed().as_micros() as u64)
    }

    /// Initialize the profiler and set the output path.
    pub fn init(path: &Path) {
        let _ = STATE.set(ProfilerState {
            start: Instant::now(),
            out_path: path.to_path_buf(),
            events: Mutex::new(Vec::new()),
        });
    }

    /// RAII span guard; records a complete event on drop.
    pub struct Span {
        name: &'static str,
        begin_us: u64,
        active: bool,
    }

    /// Opens a span. Spans opened before `init` record nothing.
    pub fn span(name: &'static str) -> Span {
        match now_us() {
            Some(begin_us) => Span { name, begin_us, active: true },
            None => Span { name, begin_us: 0, active: false },
        }
    }

    impl Drop for Span {
        fn drop(&mut self) {
            if !self.active {
                return;
            }
            if let (Some(state), Some(end_us)) = (STATE.get(), now_us()) {
                let event = TraceEvent {
                    name: self.name,
                    ts_us: self.begin_us,
                    dur_us: end_us.saturating_sub(self.begin_us),
                    tid: TID.with(|t| *t),
                };
                state.events.lock().unwrap().push(event);
            }
        }
    }

    /// Shut down the profiler and write the Chrome Trace JSON.
    pub fn shutdown() {
        if let Some(state) = STATE.get() {
            if let Err(e) = write_trace_file(state) {
                eprintln!("profiler::shutdown failed to write trace: {e}");
            }
        }
    }

    fn write_trace_file(state: &ProfilerState) -> std::io::Result<()> {
        let events = {
            let mut guard = state.events.lock().unwrap();
            std::mem::take(&mut *guard)
        };

        if let Some(parent) = state.out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&state.out_path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "{{\"traceEvents\":[")?;
        let mut first = true;
        for event in events {
            if !first {
                write!(writer, ",")?;
            }
            first = false;
            // Span names are code literals; no JSON escaping is needed.
            write!(
                writer,
                "{{\"name\":\"{}\",\"cat\":\"sched\",\"ph\":\"X\",\"ts\":{},\"dur\":{},\"pid\":1,\"tid\":{}}}",
                event.name, event.ts_us, event.dur_us, event.tid
            )?;
        }
        write!(writer, "]}}")?;
        writer.flush()
    }
}

#[cfg(feature = "profiling")]
pub use enabled::Span;

/// Initialize the profiler and set the output path.
#[cfg(feature = "profiling")]
pub fn init<P: AsRef<Path>>(path: P) {
    enabled::init(path.as_ref());
}

/// Opens a span covering the current scope.
#[cfg(feature = "profiling")]
#[inline]
pub fn span(name: &'static str) -> Span {
    enabled::span(name)
}

/// Flushes all recorded events to the configured trace file.
#[cfg(feature = "profiling")]
pub fn shutdown() {
    enabled::shutdown();
}

/// RAII span guard; inert without the `profiling` feature.
#[cfg(not(feature = "profiling"))]
pub struct Span {
    _keep: (),
}

/// Initialize the profiler and set the output path.
///
/// No-op unless the `profiling` feature is enabled.
#[cfg(not(feature = "profiling"))]
#[inline]
pub fn init<P: AsRef<Path>>(_path: P) {}

/// Opens a span covering the current scope.
#[cfg(not(feature = "profiling"))]
#[inline]
pub fn span(_name: &'static str) -> Span {
    Span { _keep: () }
}

/// Flushes all recorded events to the configured trace file.
#[cfg(not(feature = "profiling"))]
#[inline]
pub fn shutdown() {}
