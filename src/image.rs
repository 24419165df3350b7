//! Backing images and their metadata.
//!
//! An image is the parsed binary a component is built from. Parsing and
//! layout are owned elsewhere; the loader only needs the handful of queries
//! in [`Image`] plus the debuggable attribute decoded by [`DebuggerFlags`].

use std::sync::Weak ;
use bitflags::bitflags ;

use crate::ImageError ;
use crate::record::ComponentRecord ;



/// Name of the attribute holding the debugging configuration blob.
pub const DEBUGGABLE_ATTRIBUTE: &str = "debuggable" ;

/// The two leading bytes every debuggable blob starts with.
const DEBUGGABLE_MARKER: [u8; 2] = [ 1, 0 ];

/// A loaded binary image backing a component.
///
/// Implementations are shared behind an `Arc` by every record built from
/// them, so all queries take `&self`.
pub trait Image: Send + Sync + Sized + 'static {

	/// Human readable name used in diagnostics.
	fn name( &self ) -> &str ;

	/// Whether the image has been mapped and is ready for use.
	fn is_loaded( &self ) -> bool ;

	/// Whether this is the dependency-free bootstrap image.
	///
	/// The bootstrap image may execute code as soon as it is loaded, without
	/// its component climbing through every level first.
	fn is_system( &self ) -> bool { false }

	/// Whether the image carries ahead-of-time compiled code with eager fixups.
	fn is_precompiled( &self ) -> bool { false }

	/// Verifies the image may be executed in this host at all.
	///
	/// # Errors
	/// Implementations return [`ImageError::BadImage`] for images that must never run.
	fn validate_for_execution( &self ) -> Result<(), ImageError> { Ok(()) }

	/// Returns the raw value of the named attribute, if present.
	fn read_attribute( &self, name: &str ) -> Option<&[u8]> ;

	/// Lets the image find the component built from it.
	fn attach_back_reference( &self, _record: Weak<ComponentRecord<Self>> ) {}

	/// Clears a reference previously set by [`attach_back_reference`]( Self::attach_back_reference ).
	fn detach_back_reference( &self ) {}

}

/// Resolves image references into loaded images.
pub trait ImageLoader {

	/// The image type produced.
	type Image: Image ;

	/// Loads the image named by `reference`.
	///
	/// # Errors
	/// [`ImageError::NotFound`] if the reference doesn't resolve and
	/// [`ImageError::BadImage`] if the bytes are malformed.
	fn load( &self, reference: &str ) -> Result<Self::Image, ImageError> ;

}

/// The allocation arena owning a component's runtime data.
///
/// Shared behind an `Arc`; every record holds one reference, released when
/// the record is dropped. Collectible arenas may be unloaded before their
/// domain is torn down.
#[derive( Debug )]
pub struct LoaderAllocator {
	collectible: bool,
}

impl LoaderAllocator {

	/// An arena living as long as its domain.
	pub fn shared() -> Self { Self { collectible: false }}

	/// An arena that may be unloaded individually.
	pub fn collectible() -> Self { Self { collectible: true }}

	/// Whether components in this arena may be unloaded individually.
	#[inline] pub fn is_collectible( &self ) -> bool { self.collectible }

}

bitflags! {
	/// Debugging configuration of a component, decoded once at construction.
	#[derive( Copy, Clone, Debug, PartialEq, Eq, Hash )]
	pub struct DebuggerFlags: u32 {
		/// Code generation tracks extra information for debuggers.
		const TRACK_JIT_INFO = 0x1 ;
		/// Symbol files for the image are ignored.
		const IGNORE_SYMBOLS = 0x2 ;
		/// Code generation may optimise.
		const ALLOW_OPTIMIZATIONS = 0x4 ;
	}
}

impl DebuggerFlags {

	/// Decodes the debuggable attribute blob.
	///
	/// The blob is 6 or 8 bytes: the marker `[1, 0]`, a flags byte (bit 0 enables
	/// tracking, bit 1 ignores symbols), a "disable optimisations" byte and padding.
	/// Optimisations stay allowed unless tracking is enabled *and* the disable byte
	/// is non-zero. A missing attribute allows optimisations and nothing else.
	///
	/// # Errors
	/// [`ImageError::BadImage`] if the blob has the wrong size or marker.
	pub fn from_attribute( blob: Option<&[u8]> ) -> Result<Self, ImageError> {

		let Some( blob ) = blob else { return Ok( Self::ALLOW_OPTIMIZATIONS )};

		if blob.len() != 6 && blob.len() != 8 {
			return Err( ImageError::BadImage( format!(
				"debuggable attribute blob must be 6 or 8 bytes, found {}", blob.len(),
			)));
		}
		if blob[ ..2 ] != DEBUGGABLE_MARKER {
			return Err( ImageError::BadImage( "invalid debuggable attribute marker".to_string() ));
		}

		let tracking = blob[ 2 ] & 0x1 != 0 ;
		let mut flags = Self::empty();
		flags.set( Self::TRACK_JIT_INFO, tracking );
		flags.set( Self::IGNORE_SYMBOLS, blob[ 2 ] & 0x2 != 0 );
		flags.set( Self::ALLOW_OPTIMIZATIONS, !tracking || blob[ 3 ] == 0 );
		Ok( flags )

	}

}
