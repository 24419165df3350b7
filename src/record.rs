//! Component records.
//!
//! A [`ComponentRecord`] is the loader's view of one component: its backing
//! image, the level it has reached, the failure that stopped it (if any) and
//! the one-shot notification table. Records are created only once their image
//! and metadata are fully valid and are advanced only by a
//! [`DomainLoader`]( crate::DomainLoader ).

use std::sync::Arc ;
use std::sync::atomic::{ AtomicBool, AtomicU8, Ordering };
use once_cell::sync::OnceCell ;
use pipe_trait::Pipe ;

use crate::{ LoadLevel, LoadError, StickyError };
use crate::image::{ Image, LoaderAllocator, DebuggerFlags };
use crate::notification::{ Notice, NotificationTable };



/// Unique identifier for a component within its domain.
#[derive( Copy, Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord )]
pub struct ComponentId( u64 );

impl ComponentId {
	/// Creates a new component identifier from a `u64`.
	pub const fn new( id: u64 ) -> Self { Self( id )}
}

impl std::fmt::Display for ComponentId {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> Result<(), std::fmt::Error> {
		std::fmt::Display::fmt( &self.0, f )
	}
}

impl From<ComponentId> for u64 {
	fn from( id: ComponentId ) -> Self { id.0 }
}

/// The loader's state for one component.
///
/// # Invariants
/// - [`level`]( Self::level ) never decreases, and observing level `L` means the
///   actions of every level up to `L` ran exactly once.
/// - Once an error is recorded at level `L`, the level never moves past `L - 1`.
/// - [`is_collectible`]( Self::is_collectible ) is fixed at construction.
///
/// # Type Parameters
/// - `I`: The [`Image`] type backing the component
pub struct ComponentRecord<I: Image> {
	id: ComponentId,
	image: Arc<I>,
	allocator: Arc<LoaderAllocator>,
	collectible: bool,
	level: AtomicU8,
	loading: AtomicBool,
	error: OnceCell<StickyError>,
	notifications: NotificationTable,
	debugger_flags: DebuggerFlags,
}

impl<I: Image> ComponentRecord<I> {

	/// Builds a record at [`LoadLevel::Created`].
	///
	/// # Errors
	/// Fails with [`LoadError::BadImage`] if the image may not execute or its
	/// debuggable attribute is malformed. No record exists in that case.
	pub(crate) fn new(
		id: ComponentId,
		image: Arc<I>,
		allocator: Arc<LoaderAllocator>,
		debuggable_attribute: &str,
	) -> Result<Self, LoadError> {

		image.validate_for_execution()?;
		let debugger_flags = image.read_attribute( debuggable_attribute )
			.pipe( DebuggerFlags::from_attribute )?;

		tracing::debug!(
			component = %id,
			image = image.name(),
			bits = debugger_flags.bits(),
			"Decoded debugger flags",
		);

		Ok( Self {
			id,
			collectible: allocator.is_collectible(),
			image,
			allocator,
			level: AtomicU8::new( LoadLevel::Created as u8 ),
			loading: AtomicBool::new( true ),
			error: OnceCell::new(),
			notifications: NotificationTable::default(),
			debugger_flags,
		})

	}

	/// Identifier of this component within its domain.
	#[inline] pub fn id( &self ) -> ComponentId { self.id }

	/// The backing image.
	#[inline] pub fn image( &self ) -> &Arc<I> { &self.image }

	/// The arena owning this component's runtime data.
	#[inline] pub fn allocator( &self ) -> &Arc<LoaderAllocator> { &self.allocator }

	/// Whether this component may be unloaded before its domain.
	#[inline] pub fn is_collectible( &self ) -> bool { self.collectible }

	/// Debugging configuration decoded from the image at construction.
	#[inline] pub fn debugger_flags( &self ) -> DebuggerFlags { self.debugger_flags }

	/// One-shot notification flags of this component.
	#[inline] pub fn notifications( &self ) -> &NotificationTable { &self.notifications }

	/// Highest level whose action has completed.
	///
	/// Reading the level takes no lock. A concurrent reader may observe
	/// [`LoadLevel::Loaded`] while the enumeration hooks of that level still run.
	#[inline] pub fn level( &self ) -> LoadLevel { LoadLevel::from_u8( self.level.load( Ordering::Acquire ))}

	/// `false` once the component is [`Active`]( LoadLevel::Active ), has failed
	/// or has been unloaded.
	#[inline] pub fn is_loading( &self ) -> bool { self.loading.load( Ordering::Acquire ) }

	/// Whether the record left its domain.
	#[inline] pub fn is_unloaded( &self ) -> bool { self.notifications.is_set( Notice::Unloaded ) }

	/// The failure that stopped this component, if any.
	#[inline] pub fn error( &self ) -> Option<&StickyError> { self.error.get() }

	/// Whether the attach-aware listener may hear about this component.
	///
	/// A record becomes visible once it has been published at
	/// [`LoadLevel::Begin`] and never becomes invisible again.
	#[inline] pub fn is_visible_to_listener( &self ) -> bool { self.notifications.is_set( Notice::HostPublished ) }

	/// Replays the recorded failure if the component is below `target`.
	///
	/// # Errors
	/// The recorded [`StickyError`] when `level < target`. Components that failed
	/// at a higher level than requested still satisfy lower requirements.
	pub fn throw_if_below( &self, target: LoadLevel ) -> Result<(), StickyError> {
		match ( self.level() < target, self.error.get() ) {
			( true, Some( error )) => Err( error.clone() ),
			_ => Ok(()),
		}
	}

	/// Requires the component to be at `target` or above.
	///
	/// # Errors
	/// The recorded failure if there is one, otherwise [`LoadError::LoadInProgress`].
	pub fn require_level( &self, target: LoadLevel ) -> Result<(), LoadError> {
		if self.level() >= target { return Ok(()) }
		self.throw_if_below( target )?;
		Err( LoadError::LoadInProgress { component: self.id, level: self.level() })
	}

	/// Raises the level. Callers hold the domain lock and own the transition.
	pub(crate) fn store_level( &self, level: LoadLevel ) {
		debug_assert!( self.error.get().is_none(), "level advanced past a recorded failure" );
		let previous = self.level.fetch_max( level as u8, Ordering::AcqRel );
		debug_assert!( previous <= level as u8, "load level moved backwards" );
		if level == LoadLevel::Active { self.loading.store( false, Ordering::Release ); }
	}

	/// Retires the record from loading. Callers hold the domain lock and have
	/// checked that no transition is running.
	pub(crate) fn mark_unloaded( &self ) {
		self.notifications.try_claim( Notice::Unloaded );
		self.loading.store( false, Ordering::Release );
	}

	/// Records the failure of `level`'s action.
	///
	/// Returns the recorded error only to the caller that recorded it; later
	/// calls leave the first failure in place and return `None`.
	pub(crate) fn set_error(
		&self,
		level: LoadLevel,
		error: &( dyn std::error::Error + 'static ),
	) -> Option<StickyError> {
		let sticky = StickyError::capture( self.id, level, error );
		match self.error.set( sticky.clone() ) {
			Ok(()) => {
				self.loading.store( false, Ordering::Release );
				Some( sticky )
			}
			Err( _ ) => None,
		}
	}

}

impl<I: Image> Drop for ComponentRecord<I> {
	fn drop( &mut self ) {
		if self.notifications.is_set( Notice::HostPublished ) {
			self.image.detach_back_reference();
		}
		tracing::debug!( component = %self.id, image = self.image.name(), "Component destroyed" );
	}
}

impl<I: Image> std::fmt::Debug for ComponentRecord<I> {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "ComponentRecord" )
			.field( "id", &self.id )
			.field( "image", &self.image.name() )
			.field( "collectible", &self.collectible )
			.field( "level", &self.level() )
			.field( "loading", &self.is_loading() )
			.field( "error", &self.error.get() )
			.field( "debugger_flags", &self.debugger_flags )
			.finish_non_exhaustive()
	}
}
