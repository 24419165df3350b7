//! The domain loader.
//!
//! A [`DomainLoader`] owns the registry of one execution domain and is the
//! only place component levels advance. Many threads may drive the same
//! component at once: exactly one of them owns the component and runs its
//! level actions while the rest wait on the domain lock. A thread that
//! re-enters the loader for a component it is already advancing, directly or
//! through a chain of threads waiting on each other, is never blocked; it is
//! handed the level below the one it asked for and must re-issue the request
//! later if it needs the exact level.

use std::collections::{ BTreeMap, HashMap };
use std::panic::{ self, AssertUnwindSafe };
use std::sync::Arc ;
use std::sync::atomic::{ AtomicU64, Ordering };
use std::thread::{ self, ThreadId };
use itertools::Itertools ;
use parking_lot::{ Condvar, Mutex };

use crate::{ ActionError, ActionPanicked, EligibilityError, LoadError, LoadLevel };
use crate::dispatch::{ AttachListener, Dispatcher, InspectionHook, LoadingListener, ProfilerSink, TraceSink };
use crate::engine::CodeEngine ;
use crate::image::{ DEBUGGABLE_ATTRIBUTE, Image, ImageLoader, LoaderAllocator };
use crate::machine ;
use crate::notification::Notice ;
use crate::record::{ ComponentId, ComponentRecord };
use crate::utils::PartialSuccess ;



/// Loader settings.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct LoaderConfig {
	/// Validate every definition of a component when it activates.
	///
	/// Meant for diagnostic builds; off by default.
	pub validate_on_activate: bool,
	/// Attribute the debugging configuration blob is read from.
	pub debuggable_attribute: &'static str,
}

impl Default for LoaderConfig {
	fn default() -> Self {
		Self { validate_on_activate: false, debuggable_attribute: DEBUGGABLE_ATTRIBUTE }
	}
}

#[derive( Copy, Clone, Debug )]
struct Transition {
	owner: ThreadId,
	level: LoadLevel,
}

pub(crate) struct DomainState<I: Image> {
	registry: BTreeMap<ComponentId, Arc<ComponentRecord<I>>>,
	in_progress: HashMap<ComponentId, Transition>,
	waiting: HashMap<ThreadId, ComponentId>,
}

impl<I: Image> DomainState<I> {

	/// Whether blocking `thread` on a transition owned by `owner` would close a wait cycle.
	fn leads_back_to( &self, mut owner: ThreadId, thread: ThreadId ) -> bool {
		for _ in 0..=self.waiting.len() {
			if owner == thread { return true }
			let Some( blocked_on ) = self.waiting.get( &owner ) else { return false };
			let Some( transition ) = self.in_progress.get( blocked_on ) else { return false };
			owner = transition.owner ;
		}
		false
	}

}

/// Gives up a thread's ownership of a component when it stops advancing it,
/// even if a level action panicked.
struct Ownership<'a, I: Image> {
	loader: &'a DomainLoader<I>,
	record: &'a ComponentRecord<I>,
}

impl<I: Image> Drop for Ownership<'_, I> {
	fn drop( &mut self ) {
		self.loader.state.lock().in_progress.remove( &self.record.id() );
		self.loader.progress.notify_all();
	}
}

/// Drives the components of one execution domain through their load levels.
///
/// # Type Parameters
/// - `I`: The [`Image`] type backing the components
///
/// # Example
///
/// ```
/// # use std::sync::Arc ;
/// # use staged_load::{ ActionError, CodeEngine, ComponentRecord, DomainLoader, Image, LoadLevel, LoaderAllocator };
/// # struct Blob ;
/// # impl Image for Blob {
/// # 	fn name( &self ) -> &str { "blob" }
/// # 	fn is_loaded( &self ) -> bool { true }
/// # 	fn read_attribute( &self, _name: &str ) -> Option<&[u8]> { None }
/// # }
/// # struct Engine ;
/// # impl CodeEngine<Blob> for Engine {
/// # 	fn fixup_vtables( &self, _: &ComponentRecord<Blob> ) -> Result<(), ActionError> { Ok(()) }
/// # 	fn has_global_initializer( &self, _: &ComponentRecord<Blob> ) -> bool { false }
/// # 	fn run_global_initializer( &self, _: &DomainLoader<Blob>, _: &Arc<ComponentRecord<Blob>> ) -> Result<(), ActionError> { Ok(()) }
/// # }
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let loader = DomainLoader::<Blob>::new( Arc::new( Engine ));
/// let record = loader.create_component( Arc::new( Blob ), Arc::new( LoaderAllocator::shared() ))?;
///
/// assert_eq!( loader.ensure_level( &record, LoadLevel::Active )?, LoadLevel::Active );
/// assert!( loader.check_level( &record, LoadLevel::Loaded, false ));
/// # Ok(())
/// # }
/// ```
pub struct DomainLoader<I: Image> {
	pub(crate) engine: Arc<dyn CodeEngine<I>>,
	pub(crate) dispatcher: Dispatcher<I>,
	pub(crate) config: LoaderConfig,
	pub(crate) state: Mutex<DomainState<I>>,
	progress: Condvar,
	next_id: AtomicU64,
}

impl<I: Image> DomainLoader<I> {

	/// Creates an empty domain whose components are run by `engine`.
	pub fn new( engine: Arc<dyn CodeEngine<I>> ) -> Self {
		Self {
			engine,
			dispatcher: Dispatcher::default(),
			config: LoaderConfig::default(),
			state: Mutex::new( DomainState {
				registry: BTreeMap::new(),
				in_progress: HashMap::new(),
				waiting: HashMap::new(),
			}),
			progress: Condvar::new(),
			next_id: AtomicU64::new( 0 ),
		}
	}

	/// Replaces the loader settings.
	pub fn with_config( mut self, config: LoaderConfig ) -> Self {
		self.config = config ;
		self
	}

	/// Sets the receiver of tracing "load finished" events.
	pub fn with_trace_sink( mut self, sink: Arc<dyn TraceSink> ) -> Self {
		self.dispatcher.trace = Some( sink );
		self
	}

	/// Sets the receiver of profiler "load finished" events.
	pub fn with_profiler( mut self, profiler: Arc<dyn ProfilerSink> ) -> Self {
		self.dispatcher.profiler = Some( profiler );
		self
	}

	/// Sets the attach-aware listener.
	pub fn with_attach_listener( mut self, listener: Arc<dyn AttachListener> ) -> Self {
		self.dispatcher.listener = Some( listener );
		self
	}

	/// Sets the hook run when components become enumerable.
	pub fn with_inspection_hook( mut self, hook: Arc<dyn InspectionHook<I>> ) -> Self {
		self.dispatcher.inspector = Some( hook );
		self
	}

	/// Adds a listener for the domain-level loading event.
	pub fn with_loading_listener( mut self, listener: Arc<dyn LoadingListener<I>> ) -> Self {
		self.dispatcher.loading.push( listener );
		self
	}

	/// The loader settings.
	#[inline] pub fn config( &self ) -> &LoaderConfig { &self.config }

	/// Builds a component record for `image` at [`LoadLevel::Created`].
	///
	/// The record is not part of the registry until it reaches [`LoadLevel::Begin`].
	///
	/// # Errors
	/// [`LoadError::BadImage`] if the image may not execute or carries a malformed
	/// debuggable attribute.
	pub fn create_component(
		&self,
		image: Arc<I>,
		allocator: Arc<LoaderAllocator>,
	) -> Result<Arc<ComponentRecord<I>>, LoadError> {
		let id = ComponentId::new( self.next_id.fetch_add( 1, Ordering::Relaxed ));
		ComponentRecord::new( id, image, allocator, self.config.debuggable_attribute ).map( Arc::new )
	}

	/// Resolves `reference` through `images` and builds a record for it.
	///
	/// # Errors
	/// [`LoadError::NotFound`] or [`LoadError::BadImage`] from the image loader,
	/// or any error of [`create_component`]( Self::create_component ).
	pub fn load_component<L: ImageLoader<Image = I>>(
		&self,
		images: &L,
		reference: &str,
		allocator: Arc<LoaderAllocator>,
	) -> Result<Arc<ComponentRecord<I>>, LoadError> {
		let image = images.load( reference )?;
		self.create_component( Arc::new( image ), allocator )
	}

	/// Makes sure `record` has reached `target`, driving it there if needed.
	///
	/// Returns the level actually reached. This is `target` or above, except
	/// when the calling thread is itself advancing the component (or waiting on
	/// a thread that waits on it), in which case it may be the level just below
	/// `target`.
	///
	/// # Errors
	/// - [`LoadError::Sticky`] if the component failed at or below `target`,
	///   now or at any earlier time. Every caller gets the same failure.
	/// - [`LoadError::LoadInProgress`] if the caller re-entered the loader while
	///   the component was still more than one level short of `target`.
	/// - [`LoadError::Unloaded`] if the component was unloaded below `target`.
	pub fn ensure_level( &self, record: &Arc<ComponentRecord<I>>, target: LoadLevel ) -> Result<LoadLevel, LoadError> {
		if record.is_loading() { self.drive( record, target ) }
		record.throw_if_below( target )?;
		if record.is_unloaded() && record.level() < target {
			return Err( LoadError::Unloaded { component: record.id(), level: record.level() });
		}
		record.require_level( target.relaxed() )?;
		Ok( record.level() )
	}

	/// Whether `record` is at `target` or above.
	///
	/// Without `deadlock_tolerant` this is a plain comparison. With it the
	/// answer accounts for transitions in flight: the call waits for other
	/// threads' transitions and accepts the level below `target` when the
	/// calling thread is the one advancing the component.
	pub fn check_level( &self, record: &ComponentRecord<I>, target: LoadLevel, deadlock_tolerant: bool ) -> bool {

		if record.level() >= target { return true }
		if !deadlock_tolerant { return false }

		let current = thread::current().id();
		let mut state = self.state.lock();
		loop {
			if record.level() >= target { return true }
			let Some( &Transition { owner, .. }) = state.in_progress.get( &record.id() ) else { return false };
			if owner == current || state.leads_back_to( owner, current ) {
				return record.level() >= target.relaxed();
			}
			state.waiting.insert( current, record.id() );
			self.progress.wait( &mut state );
			state.waiting.remove( &current );
		}

	}

	/// Checks whether `record` is loaded far enough for its types to be used.
	///
	/// The bootstrap image passes as soon as it is loaded.
	///
	/// # Errors
	/// The [`EligibilityError`] describing the first unmet requirement.
	pub fn check_loaded( &self, record: &ComponentRecord<I> ) -> Result<(), EligibilityError> {
		record.throw_if_below( LoadLevel::Loaded ).map_err( EligibilityError::Failed )?;
		if record.level() >= LoadLevel::Loaded { return Ok(()) }
		if !record.image().is_loaded() { return Err( EligibilityError::ImageNotLoaded( record.id() )) }
		match record.image().is_system() {
			true => Ok(()),
			false => Err( EligibilityError::NotLoaded( record.id() )),
		}
	}

	/// Checks whether code of `record` may execute.
	///
	/// Passes for active components, for the bootstrap image once it is loaded,
	/// and for a component whose global initializer is running, so the
	/// initializer can call into its own component.
	///
	/// # Errors
	/// The [`EligibilityError`] describing the first unmet requirement.
	pub fn check_activated( &self, record: &ComponentRecord<I> ) -> Result<(), EligibilityError> {
		record.throw_if_below( LoadLevel::Active ).map_err( EligibilityError::Failed )?;
		if record.level() >= LoadLevel::Active { return Ok(()) }
		if !record.image().is_loaded() { return Err( EligibilityError::ImageNotLoaded( record.id() )) }
		if record.image().is_system() { return Ok(()) }
		if record.level() < LoadLevel::Loaded { return Err( EligibilityError::NotLoaded( record.id() )) }
		match record.notifications().is_set( Notice::ActivationCheckDisabled )
			|| self.check_level( record, LoadLevel::Active, true )
		{
			true => Ok(()),
			false => Err( EligibilityError::NotActivated( record.id() )),
		}
	}

	/// Drives every registered component to `target`.
	///
	/// # Partial Success
	/// Components that fail don't stop the others; their errors are returned
	/// alongside the ids of the components that succeeded.
	pub fn ensure_all( &self, target: LoadLevel ) -> PartialSuccess<Vec<ComponentId>, ( ComponentId, LoadError )> {
		self.components().into_iter()
			.map(| record | match self.ensure_level( &record, target ) {
				Ok( _ ) => Ok( record.id() ),
				Err( err ) => Err(( record.id(), err )),
			})
			.partition_result::<Vec<_>, Vec<_>, _, _>()
	}

	/// Registered components, in creation order.
	pub fn components( &self ) -> Vec<Arc<ComponentRecord<I>>> {
		self.state.lock().registry.values().cloned().collect()
	}

	/// Looks up a registered component.
	pub fn find( &self, id: ComponentId ) -> Option<Arc<ComponentRecord<I>>> {
		self.state.lock().registry.get( &id ).cloned()
	}

	/// Removes a collectible component from the domain.
	///
	/// The attach-aware listener hears about the unload before the loader lets
	/// go of the record. The record, and with it its reference to the
	/// allocator, is destroyed once the last outside handle is dropped.
	/// A component unloaded before activation never advances again;
	/// [`ensure_level`]( Self::ensure_level ) reports [`LoadError::Unloaded`] for it.
	///
	/// # Errors
	/// - [`LoadError::NotFound`] if no such component is registered
	/// - [`LoadError::NotCollectible`] for components living as long as the domain
	/// - [`LoadError::LoadInProgress`] if a transition of the component is running
	pub fn unload( &self, id: ComponentId ) -> Result<(), LoadError> {

		let record = {
			let mut state = self.state.lock();
			let record = state.registry.get( &id ).cloned()
				.ok_or_else(|| LoadError::NotFound( format!( "component {} is not registered", id )))?;
			if !record.is_collectible() { return Err( LoadError::NotCollectible( id )) }
			if state.in_progress.contains_key( &id ) {
				return Err( LoadError::LoadInProgress { component: id, level: record.level() });
			}
			state.registry.remove( &id );
			record.mark_unloaded();
			record
		};

		self.dispatcher.notify_listener_unload( &record );
		self.engine.release( &record );
		tracing::debug!( component = %id, level = %record.level(), "Component unloaded" );
		Ok(())

	}

	/// Unloads every registered component.
	///
	/// Called automatically when the loader is dropped.
	pub fn teardown( &self ) {
		let registry = {
			let mut state = self.state.lock();
			let registry = std::mem::take( &mut state.registry );
			registry.values().for_each(| record | record.mark_unloaded() );
			registry
		};
		tracing::debug!( components = registry.len(), "Tearing down domain" );
		registry.into_values().for_each(| record | {
			self.dispatcher.notify_listener_unload( &record );
			self.engine.release( &record );
		});
	}

	pub(crate) fn publish( &self, record: &Arc<ComponentRecord<I>> ) {
		self.state.lock().registry.insert( record.id(), Arc::clone( record ));
		tracing::debug!( component = %record.id(), image = record.image().name(), "Component published" );
	}

	fn drive( &self, record: &Arc<ComponentRecord<I>>, target: LoadLevel ) {

		let current = thread::current().id();
		let mut state = self.state.lock();

		let first = loop {
			if record.level() >= target || record.error().is_some() || record.is_unloaded() { return }
			let Some( &Transition { owner, level }) = state.in_progress.get( &record.id() ) else {
				let Some( first ) = record.level().next() else { return };
				break first ;
			};
			if owner == current || state.leads_back_to( owner, current ) {
				tracing::trace!(
					component = %record.id(),
					requested = %target,
					in_progress = %level,
					"Relaxing reentrant load request",
				);
				return ;
			}
			tracing::trace!( component = %record.id(), in_progress = %level, "Waiting for transition" );
			state.waiting.insert( current, record.id() );
			self.progress.wait( &mut state );
			state.waiting.remove( &current );
		};

		state.in_progress.insert( record.id(), Transition { owner: current, level: first });
		drop( state );

		let activated = {
			let _ownership = Ownership { loader: self, record: record.as_ref() };
			self.advance_to( record, target )
		};
		if activated { self.dispatcher.raise_loading_event( self, record ) }

	}

	/// Runs each level action up to `target` while the calling thread owns the component.
	/// Returns whether this call made the component active.
	fn advance_to( &self, record: &Arc<ComponentRecord<I>>, target: LoadLevel ) -> bool {

		let mut activated = false ;

		while let Some( level ) = record.level().next().filter(| level | *level <= target ) {

			{
				let mut state = self.state.lock();
				if record.is_unloaded() { return false }
				if let Some( transition ) = state.in_progress.get_mut( &record.id() ) {
					transition.level = level ;
				}
			}
			tracing::debug!( component = %record.id(), %level, "Advancing component" );

			let outcome = panic::catch_unwind( AssertUnwindSafe(|| machine::advance( self, record, level )))
				.unwrap_or_else(| payload | Err( Box::new( ActionPanicked::from_payload( &*payload )) as ActionError ));

			if let Err( err ) = outcome {
				tracing::warn!( component = %record.id(), %level, error = %err, "Level action failed" );
				if let Some( sticky ) = record.set_error( level, &*err ) {
					self.dispatcher.load_failed( record, &sticky );
				}
				return false ;
			}

			{
				let _state = self.state.lock();
				record.store_level( level );
			}
			self.progress.notify_all();
			activated = level == LoadLevel::Active ;

		}

		activated

	}

}

impl<I: Image> Drop for DomainLoader<I> {
	fn drop( &mut self ) { self.teardown() }
}

impl<I: Image> std::fmt::Debug for DomainLoader<I> {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct( "DomainLoader" )
			.field( "config", &self.config )
			.field( "components", &state.registry.keys().collect::<Vec<_>>() )
			.field( "in_progress", &state.in_progress.len() )
			.finish_non_exhaustive()
	}
}
