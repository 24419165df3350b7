//! The level state machine.
//!
//! [`advance`] runs the action of exactly one level for one record. The caller
//! owns the record's transition while it runs, so every action runs at most
//! once per record; the domain mutex itself is only taken for the brief
//! registry and level updates.

use std::sync::Arc ;

use crate::{ ActionError, DomainLoader, LoadError, LoadLevel };
use crate::image::Image ;
use crate::notification::Notice ;
use crate::record::ComponentRecord ;



/// Runs the action that takes `record` from the level below `level` to `level`.
pub(crate) fn advance<I: Image>(
	loader: &DomainLoader<I>,
	record: &Arc<ComponentRecord<I>>,
	level: LoadLevel,
) -> Result<(), ActionError> {
	match level {
		LoadLevel::Created => Ok(()),
		LoadLevel::Begin => begin( loader, record ),
		LoadLevel::BeforeTypeLoad => before_type_load( loader, record ),
		LoadLevel::EagerFixups => eager_fixups( loader, record ),
		LoadLevel::DeliverEvents => {
			loader.dispatcher.deliver_sync_events( record );
			Ok(())
		}
		LoadLevel::VtableFixups => loader.engine.fixup_vtables( record ),
		LoadLevel::Loaded => finish_load( loader, record ),
		LoadLevel::Active => activate( loader, record ),
	}
}

fn begin<I: Image>( loader: &DomainLoader<I>, record: &Arc<ComponentRecord<I>> ) -> Result<(), ActionError> {
	loader.publish( record );
	record.image().attach_back_reference( Arc::downgrade( record ));
	record.notifications().try_claim( Notice::HostPublished );
	Ok(())
}

fn before_type_load<I: Image>( loader: &DomainLoader<I>, record: &ComponentRecord<I> ) -> Result<(), ActionError> {
	// The image must be mapped before this point, outside of any lock.
	if !record.image().is_loaded() {
		return Err( LoadError::BadImage( format!( "image {} has not been loaded", record.image().name() )).into() );
	}
	loader.dispatcher.ready_for_injection( record );
	Ok(())
}

fn eager_fixups<I: Image>( loader: &DomainLoader<I>, record: &ComponentRecord<I> ) -> Result<(), ActionError> {
	match record.image().is_precompiled() {
		true => loader.engine.run_eager_fixups( record ),
		false => Ok(()),
	}
}

fn finish_load<I: Image>( loader: &DomainLoader<I>, record: &ComponentRecord<I> ) -> Result<(), ActionError> {
	// Published before the hooks run so introspection finds a consistent record.
	{
		let _state = loader.state.lock();
		record.store_level( LoadLevel::Loaded );
	}
	loader.dispatcher.component_enumerable( record );
	Ok(())
}

fn activate<I: Image>( loader: &DomainLoader<I>, record: &Arc<ComponentRecord<I>> ) -> Result<(), ActionError> {

	loader.engine.verify_exception_policy( record )?;

	if loader.engine.has_global_initializer( record ) {
		record.notifications().try_claim( Notice::ActivationCheckDisabled );
		loader.engine.run_global_initializer( loader, record )?;
	}

	if loader.config.validate_on_activate {
		loader.engine.validate_definitions( record )?;
	}

	Ok(())

}
