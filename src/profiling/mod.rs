/// Chrome Trace (flame-style) execution profiler.
///
/// This module provides a **feature-gated, near-zero-overhead (when
/// disabled)** profiling API for the scheduling layer. When enabled, it
/// records structured execution spans and emits a **Chrome Trace Event
/// JSON** file that can be inspected using:
///
/// - `chrome://tracing`
/// - <https://ui.perfetto.dev>
///
/// ## Feature flag
///
/// Span recording is only compiled when the `profiling` feature is enabled:
///
/// ```bash
/// cargo test --features profiling
/// ```
///
/// When the feature is disabled, all profiling calls compile to no-ops and
/// impose no runtime overhead (no allocations, no atomics, no branches).
///
/// ## Usage
///
/// ```no_run
/// use taskstream::profiler;
///
/// profiler::init("profile/trace.json");
///
/// {
///     let _g = profiler::span("DriverGraph::begin_frame");
///     // run a frame
/// }
///
/// profiler::shutdown();
/// ```
///
/// ## Design notes
///
/// - Spans are recorded using RAII guards ([`profiler::Span`])
/// - Events are timestamped using a monotonic clock
/// - Each OS thread is assigned a stable logical thread ID
/// - Output format follows the Chrome Trace `"X"` (complete event)
///   specification
///
/// This profiler is intended for performance analysis of frame phases:
/// request consolidation, stream consolidation, job stages, and the
/// progress cascade.
pub mod profiler;
