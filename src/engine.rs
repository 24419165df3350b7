use std::sync::Arc ;

use crate::{ ActionError, DomainLoader };
use crate::image::Image ;
use crate::record::ComponentRecord ;



/// The type and code engine the loader drives at specific levels.
///
/// The loader treats the engine as opaque: it only decides *when* each hook
/// runs and guarantees every hook runs at most once per component. Any error
/// returned becomes the component's sticky failure.
///
/// Hooks run without the domain lock held, so they may call back into the
/// loader, including for the component they are working on.
pub trait CodeEngine<I: Image>: Send + Sync {

	/// Applies the precomputed relocation tables of an ahead-of-time image.
	///
	/// Only called for images reporting [`Image::is_precompiled`].
	///
	/// # Errors
	/// Implementations fail if a relocation can't be resolved.
	fn run_eager_fixups( &self, _record: &ComponentRecord<I> ) -> Result<(), ActionError> { Ok(()) }

	/// Patches the dispatch tables that reference the component's exports.
	///
	/// # Errors
	/// Implementations fail if an export can't be bound.
	fn fixup_vtables( &self, record: &ComponentRecord<I> ) -> Result<(), ActionError> ;

	/// Resolves the exception-wrapping policy the component's code runs under.
	///
	/// No code of the component executes before this succeeds.
	///
	/// # Errors
	/// Implementations fail if the policy can't be determined.
	fn verify_exception_policy( &self, _record: &ComponentRecord<I> ) -> Result<(), ActionError> { Ok(()) }

	/// Whether the component has a global initializer to run on activation.
	fn has_global_initializer( &self, record: &ComponentRecord<I> ) -> bool ;

	/// Runs the component's one-time global initializer.
	///
	/// The initializer may itself require the component to be active; such a
	/// nested [`DomainLoader::ensure_level`] call returns the level below
	/// [`Active`]( crate::LoadLevel::Active ) instead of deadlocking.
	///
	/// # Errors
	/// Whatever the initializer fails with.
	fn run_global_initializer(
		&self,
		loader: &DomainLoader<I>,
		record: &Arc<ComponentRecord<I>>,
	) -> Result<(), ActionError> ;

	/// Eagerly validates every definition in the component.
	///
	/// Only called when [`LoaderConfig::validate_on_activate`]( crate::LoaderConfig::validate_on_activate ) is set.
	///
	/// # Errors
	/// Implementations fail on the first invalid definition.
	fn validate_definitions( &self, _record: &ComponentRecord<I> ) -> Result<(), ActionError> { Ok(()) }

	/// Drops whatever the engine holds for a component leaving the domain.
	fn release( &self, _record: &ComponentRecord<I> ) {}

}
