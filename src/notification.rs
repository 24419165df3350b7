use std::sync::atomic::{ AtomicBool, Ordering };



/// A one-shot concern tracked per component.
///
/// Every notice starts unset and is set at most once for the life of the
/// record, no matter how many threads race for it or how often a load is retried.
#[derive( Copy, Clone, Debug, PartialEq, Eq, Hash )]
#[repr( u8 )]
pub enum Notice {
	/// Tracing "load finished" delivered.
	TraceFinished,
	/// Profiler "load finished" delivered.
	ProfilerFinished,
	/// The attach-aware listener should hear about this component.
	ShouldNotifyListener,
	/// The attach-aware listener was told about the load.
	ListenerNotified,
	/// The record was published into the registry and attached to its image.
	HostPublished,
	/// The global initializer started; activation checks pass from here on.
	ActivationCheckDisabled,
	/// The attach-aware listener was told about the unload.
	ListenerUnloadStarted,
	/// The asynchronous domain-level loading event was raised.
	LoadingEventRaised,
	/// The component left the domain; no further level may be reached.
	Unloaded,
}

impl Notice {

	/// Every notice, in table order.
	pub const ALL: [Notice; 9] = [
		Self::TraceFinished,
		Self::ProfilerFinished,
		Self::ShouldNotifyListener,
		Self::ListenerNotified,
		Self::HostPublished,
		Self::ActivationCheckDisabled,
		Self::ListenerUnloadStarted,
		Self::LoadingEventRaised,
		Self::Unloaded,
	];

	const fn index( self ) -> usize { self as usize }

}

/// Per-record table of one-shot flags.
///
/// Flags are independent atomics rather than state guarded by the domain
/// lock, so listeners can be invoked without holding it.
#[derive( Debug, Default )]
pub struct NotificationTable {
	flags: [AtomicBool; Notice::ALL.len()],
}

impl NotificationTable {

	/// Sets `notice`, returning `true` only for the one caller that flipped it.
	pub fn try_claim( &self, notice: Notice ) -> bool {
		self.flags[ notice.index() ]
			.compare_exchange( false, true, Ordering::AcqRel, Ordering::Acquire )
			.is_ok()
	}

	/// Whether `notice` has been set.
	pub fn is_set( &self, notice: Notice ) -> bool {
		self.flags[ notice.index() ].load( Ordering::Acquire )
	}

}
