/// Execution classes used for thread naming and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Work a caller is blocked on, such as blocking providers for a completion request.
	Interactive,
	/// Speculative provider work drained from the scheduler queue.
	Speculative,
	/// Periodic housekeeping such as garbage collection.
	Maintenance,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Speculative => "speculative",
			Self::Maintenance => "maintenance",
		}
	}
}
