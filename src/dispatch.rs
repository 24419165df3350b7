//! Lifecycle notifications.
//!
//! Four independent classes of observers hear about a component's load:
//! tracing, the profiler, an attach-aware listener (e.g. a debugger) and
//! domain-level loading listeners. Each delivery is gated by its own one-shot
//! [`Notice`], so retries and racing callers never deliver twice. Observers
//! are called without the domain lock held and may re-enter the loader.

use std::sync::Arc ;

use crate::{ DomainLoader, LoadStatus, StickyError };
use crate::image::Image ;
use crate::notification::Notice ;
use crate::record::{ ComponentId, ComponentRecord };



/// Receives the tracing "load finished" event.
pub trait TraceSink: Send + Sync {
	/// Called once per component, at the first of failure or event delivery.
	fn load_finished( &self, component: ComponentId, status: LoadStatus );
}

impl<F: Fn( ComponentId, LoadStatus ) + Send + Sync> TraceSink for F {
	fn load_finished( &self, component: ComponentId, status: LoadStatus ) { self( component, status ) }
}

/// Receives the profiler "load finished" event.
///
/// A successful notification arrives before any type of the component can
/// load, giving the profiler its chance to inject code.
pub trait ProfilerSink: Send + Sync {
	/// Called once per component, at the first of failure,
	/// [`BeforeTypeLoad`]( crate::LoadLevel::BeforeTypeLoad ) or event delivery.
	fn load_finished( &self, component: ComponentId, status: LoadStatus );
}

impl<F: Fn( ComponentId, LoadStatus ) + Send + Sync> ProfilerSink for F {
	fn load_finished( &self, component: ComponentId, status: LoadStatus ) { self( component, status ) }
}

/// An external observer that only hears about components while attached.
///
/// Each component produces at most one load pair
/// ([`component_loaded`]( Self::component_loaded ) then [`module_loaded`]( Self::module_loaded ))
/// and at most one unload pair. An unload may arrive without a prior load if
/// the listener attached late.
pub trait AttachListener: Send + Sync {
	/// Whether the listener is currently attached.
	fn is_attached( &self ) -> bool ;
	fn component_loaded( &self, component: ComponentId );
	fn module_loaded( &self, component: ComponentId );
	fn module_unloaded( &self, component: ComponentId );
	fn component_unloaded( &self, component: ComponentId );
}

/// Called when a component becomes enumerable by introspection tools.
///
/// The component already reports [`Loaded`]( crate::LoadLevel::Loaded ) when
/// the hook runs.
pub trait InspectionHook<I: Image>: Send + Sync {
	fn component_enumerable( &self, record: &ComponentRecord<I> );
}

/// Domain-level listener raised once a component becomes active.
///
/// Runs on the activating thread after the transition finished, so it may
/// run arbitrary code including further loads.
pub trait LoadingListener<I: Image>: Send + Sync {
	fn component_loading( &self, loader: &DomainLoader<I>, record: &Arc<ComponentRecord<I>> );
}

impl<I, F> LoadingListener<I> for F
where
	I: Image,
	F: Fn( &DomainLoader<I>, &Arc<ComponentRecord<I>> ) + Send + Sync,
{
	fn component_loading( &self, loader: &DomainLoader<I>, record: &Arc<ComponentRecord<I>> ) { self( loader, record ) }
}

pub(crate) struct Dispatcher<I: Image> {
	pub trace: Option<Arc<dyn TraceSink>>,
	pub profiler: Option<Arc<dyn ProfilerSink>>,
	pub listener: Option<Arc<dyn AttachListener>>,
	pub inspector: Option<Arc<dyn InspectionHook<I>>>,
	pub loading: Vec<Arc<dyn LoadingListener<I>>>,
}

impl<I: Image> Default for Dispatcher<I> {
	fn default() -> Self {
		Self { trace: None, profiler: None, listener: None, inspector: None, loading: Vec::new() }
	}
}

impl<I: Image> Dispatcher<I> {

	/// Reports a freshly recorded failure to tracing and the profiler.
	pub fn load_failed( &self, record: &ComponentRecord<I>, error: &StickyError ) {
		let status = LoadStatus::Failure( error.kind() );
		self.trace_finished( record, status );
		self.profiler_finished( record, status );
	}

	/// Last chance for the profiler to see the component before types load.
	pub fn ready_for_injection( &self, record: &ComponentRecord<I> ) {
		self.profiler_finished( record, LoadStatus::Success );
	}

	/// Synchronous load-completion events of [`DeliverEvents`]( crate::LoadLevel::DeliverEvents ).
	pub fn deliver_sync_events( &self, record: &ComponentRecord<I> ) {
		self.trace_finished( record, LoadStatus::Success );
		self.profiler_finished( record, LoadStatus::Success );
		if !record.notifications().is_set( Notice::ListenerNotified ) {
			record.notifications().try_claim( Notice::ShouldNotifyListener );
			self.notify_listener_load( record );
		}
	}

	/// Introspection hook of [`Loaded`]( crate::LoadLevel::Loaded ).
	pub fn component_enumerable( &self, record: &ComponentRecord<I> ) {
		if let Some( inspector ) = &self.inspector { inspector.component_enumerable( record ) }
	}

	/// Raises the domain-level loading event once the component is active.
	pub fn raise_loading_event( &self, loader: &DomainLoader<I>, record: &Arc<ComponentRecord<I>> ) {
		if !record.notifications().try_claim( Notice::LoadingEventRaised ) { return }
		tracing::trace!( component = %record.id(), "Raising loading event" );
		self.loading.iter().for_each(| listener | listener.component_loading( loader, record ));
	}

	/// Tells an attached listener about the load. Returns whether it was told.
	///
	/// Components not yet visible are skipped, not queued.
	pub fn notify_listener_load( &self, record: &ComponentRecord<I> ) -> bool {
		let Some( listener ) = self.attached_listener( record ) else { return false };
		if !record.notifications().is_set( Notice::ShouldNotifyListener ) { return false }
		if !record.notifications().try_claim( Notice::ListenerNotified ) { return false }
		listener.component_loaded( record.id() );
		listener.module_loaded( record.id() );
		true
	}

	/// Tells an attached listener the component is going away. Returns whether it was told.
	pub fn notify_listener_unload( &self, record: &ComponentRecord<I> ) -> bool {
		let Some( listener ) = self.attached_listener( record ) else { return false };
		if !record.notifications().try_claim( Notice::ListenerUnloadStarted ) { return false }
		listener.module_unloaded( record.id() );
		listener.component_unloaded( record.id() );
		true
	}

	fn attached_listener( &self, record: &ComponentRecord<I> ) -> Option<&Arc<dyn AttachListener>> {
		if !record.is_visible_to_listener() { return None }
		self.listener.as_ref().filter(| listener | listener.is_attached() )
	}

	fn trace_finished( &self, record: &ComponentRecord<I>, status: LoadStatus ) {
		if !record.notifications().try_claim( Notice::TraceFinished ) { return }
		if let Some( trace ) = &self.trace { trace.load_finished( record.id(), status ) }
	}

	fn profiler_finished( &self, record: &ComponentRecord<I>, status: LoadStatus ) {
		if !record.notifications().try_claim( Notice::ProfilerFinished ) { return }
		if let Some( profiler ) = &self.profiler { profiler.load_finished( record.id(), status ) }
	}

}
