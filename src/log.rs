/// Trace message that is compiled out on release builds.
///
/// The voice walker and the scatter-gather translator run per sample and per byte, so their tracing must not cost
/// anything outside of debug builds.
#[macro_export]
macro_rules! trace {
	($($arg:tt)+) => {
		#[cfg(debug_assertions)]
		::log::trace!($($arg)+);
	};
}
