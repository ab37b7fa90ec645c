/// Execution classes used to label spawned work in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskClass {
	/// Work a caller is waiting on, such as a request handler.
	Interactive,
	/// Deferred work that may be coalesced, delayed or abandoned.
	#[default]
	Background,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
		}
	}
}
