/// Chrome Trace (flame-style) execution profiler.
///
/// When the `profiling` feature is enabled, frames, update phases and every
/// task execution are recorded as spans and written as a **Chrome Trace Event
/// JSON** file that can be inspected with `chrome://tracing` or
/// <https://ui.perfetto.dev>:
///
/// ```bash
/// cargo test --features profiling
/// ```
///
/// When the feature is disabled, all profiling calls compile to no-ops.
///
/// ```no_run
/// use hearth_engine::profiler;
///
/// profiler::init("profile/trace.json");
/// {
///     let _span = profiler::span("load level");
/// }
/// profiler::shutdown();
/// ```
pub mod profiler;
