//! Load levels.
//!
//! A component climbs these levels strictly in order. Reaching a level means
//! every action of that level and of all the levels below it has run exactly
//! once for the component.



/// A stage in the initialisation order of a component.
///
/// Levels are totally ordered; comparing two levels tells which one is further
/// along. A component's recorded level is the highest level whose action has
/// completed, and it never decreases.
#[derive( Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash )]
#[repr( u8 )]
pub enum LoadLevel {
	/// The record exists but has not been published anywhere.
	Created = 0,
	/// Published into the domain registry and attached to its image.
	Begin = 1,
	/// Last point before any type from the component may resolve.
	BeforeTypeLoad = 2,
	/// Precomputed relocations applied for ahead-of-time images.
	EagerFixups = 3,
	/// Load-completion notifications delivered.
	DeliverEvents = 4,
	/// Dispatch tables referencing the component's exports patched.
	VtableFixups = 5,
	/// Fully loaded and enumerable by introspection.
	Loaded = 6,
	/// Global initializer has run; code may execute.
	Active = 7,
}

impl LoadLevel {

	/// Every level, lowest first.
	pub const ALL: [LoadLevel; 8] = [
		Self::Created,
		Self::Begin,
		Self::BeforeTypeLoad,
		Self::EagerFixups,
		Self::DeliverEvents,
		Self::VtableFixups,
		Self::Loaded,
		Self::Active,
	];

	/// The level directly above this one, or `None` at [`Active`]( Self::Active ).
	pub const fn next( self ) -> Option<Self> {
		match self {
			Self::Created => Some( Self::Begin ),
			Self::Begin => Some( Self::BeforeTypeLoad ),
			Self::BeforeTypeLoad => Some( Self::EagerFixups ),
			Self::EagerFixups => Some( Self::DeliverEvents ),
			Self::DeliverEvents => Some( Self::VtableFixups ),
			Self::VtableFixups => Some( Self::Loaded ),
			Self::Loaded => Some( Self::Active ),
			Self::Active => None,
		}
	}

	/// The level directly below this one, or `None` at [`Created`]( Self::Created ).
	pub const fn previous( self ) -> Option<Self> {
		match self {
			Self::Created => None,
			Self::Begin => Some( Self::Created ),
			Self::BeforeTypeLoad => Some( Self::Begin ),
			Self::EagerFixups => Some( Self::BeforeTypeLoad ),
			Self::DeliverEvents => Some( Self::EagerFixups ),
			Self::VtableFixups => Some( Self::DeliverEvents ),
			Self::Loaded => Some( Self::VtableFixups ),
			Self::Active => Some( Self::Loaded ),
		}
	}

	/// The level a reentrant caller is guaranteed to observe when it asked for `self`.
	///
	/// A thread that is itself advancing a component can't wait for its own
	/// transition, so it is only promised the level below the one it requested.
	pub const fn relaxed( self ) -> Self {
		match self.previous() {
			Some( level ) => level,
			None => self,
		}
	}

	pub(crate) const fn from_u8( raw: u8 ) -> Self {
		match raw {
			0 => Self::Created,
			1 => Self::Begin,
			2 => Self::BeforeTypeLoad,
			3 => Self::EagerFixups,
			4 => Self::DeliverEvents,
			5 => Self::VtableFixups,
			6 => Self::Loaded,
			_ => Self::Active,
		}
	}

}

impl std::fmt::Display for LoadLevel {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result { write!( f, "{:?}", self )}
}
