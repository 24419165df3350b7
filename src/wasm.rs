//! wasmtime-backed collaborators.
//!
//! [`WasmImage`] wraps a compiled component, [`WasmImageLoader`] resolves
//! images from a directory and [`WasmCodeEngine`] links and runs them:
//!
//! - eager fixups pre-instantiate precompiled images against the linker,
//! - vtable fixups instantiate the component into its own [`Store`],
//! - the global initializer is a top-level function export (`initialize` by default).

use std::collections::HashMap ;
use std::path::PathBuf ;
use std::sync::{ Arc, Weak };
use parking_lot::Mutex ;
use thiserror::Error ;
use wasmtime::{ Engine, Store };
use wasmtime::component::{ Component, Instance, InstancePre, Linker };

use crate::{ ActionError, DomainLoader, ImageError };
use crate::engine::CodeEngine ;
use crate::image::{ Image, ImageLoader };
use crate::record::{ ComponentId, ComponentRecord };



/// Default name of the export run as a component's global initializer.
pub const INITIALIZER_EXPORT: &str = "initialize" ;

/// A compiled WASM component used as a backing image.
pub struct WasmImage {
	name: String,
	component: Component,
	attributes: HashMap<String, Vec<u8>>,
	system: bool,
	precompiled: bool,
	back_reference: Mutex<Option<Weak<ComponentRecord<WasmImage>>>>,
}

impl WasmImage {

	/// Wraps a compiled component.
	pub fn new( name: impl Into<String>, component: Component ) -> Self {
		Self {
			name: name.into(),
			component,
			attributes: HashMap::with_capacity( 0 ),
			system: false,
			precompiled: false,
			back_reference: Mutex::new( None ),
		}
	}

	/// Adds a metadata attribute, e.g. the debuggable blob.
	pub fn with_attribute( mut self, name: impl Into<String>, value: impl Into<Vec<u8>> ) -> Self {
		self.attributes.insert( name.into(), value.into() );
		self
	}

	/// Marks this image as the dependency-free bootstrap image.
	pub fn with_system( mut self, system: bool ) -> Self {
		self.system = system ;
		self
	}

	/// Marks this image as precompiled, so eager fixups pre-instantiate it.
	pub fn with_precompiled( mut self, precompiled: bool ) -> Self {
		self.precompiled = precompiled ;
		self
	}

	/// The compiled component.
	#[inline] pub fn component( &self ) -> &Component { &self.component }

	/// The component record built from this image, while it is published.
	pub fn component_record( &self ) -> Option<Arc<ComponentRecord<WasmImage>>> {
		self.back_reference.lock().as_ref().and_then( Weak::upgrade )
	}

}

impl Image for WasmImage {

	fn name( &self ) -> &str { &self.name }

	fn is_loaded( &self ) -> bool { true }

	fn is_system( &self ) -> bool { self.system }

	fn is_precompiled( &self ) -> bool { self.precompiled }

	fn read_attribute( &self, name: &str ) -> Option<&[u8]> {
		self.attributes.get( name ).map( Vec::as_slice )
	}

	fn attach_back_reference( &self, record: Weak<ComponentRecord<Self>> ) {
		*self.back_reference.lock() = Some( record );
	}

	fn detach_back_reference( &self ) {
		*self.back_reference.lock() = None ;
	}

}

impl std::fmt::Debug for WasmImage {
	fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
		f.debug_struct( "WasmImage" )
			.field( "name", &self.name )
			.field( "component", &"<Component>" )
			.field( "attributes", &self.attributes.keys().collect::<Vec<_>>() )
			.field( "system", &self.system )
			.field( "precompiled", &self.precompiled )
			.finish_non_exhaustive()
	}
}

/// Loads `<root>/<reference>.wasm`, falling back to `<root>/<reference>.wat`.
#[derive( Clone )]
pub struct WasmImageLoader {
	engine: Engine,
	root: PathBuf,
}

impl WasmImageLoader {
	pub fn new( engine: &Engine, root: impl Into<PathBuf> ) -> Self {
		Self { engine: engine.clone(), root: root.into() }
	}
}

impl ImageLoader for WasmImageLoader {

	type Image = WasmImage ;

	fn load( &self, reference: &str ) -> Result<WasmImage, ImageError> {
		let path = [ "wasm", "wat" ].iter()
			.map(| extension | self.root.join( format!( "{}.{}", reference, extension )))
			.find(| path | path.exists() )
			.ok_or_else(|| ImageError::NotFound( format!( "{} in {}", reference, self.root.display() )))?;
		let component = Component::from_file( &self.engine, &path )
			.map_err(| err | ImageError::BadImage( format!( "{}: {}", path.display(), err )))?;
		Ok( WasmImage::new( reference, component ))
	}

}

/// Failures of the wasmtime collaborators, captured as sticky errors.
#[derive( Debug, Error )]
pub enum WasmEngineError {
	/// Resolving the component's imports ahead of time failed.
	#[error( "Pre-instantiation failed: {0}" )] Preinstantiation( wasmtime::Error ),
	/// Instantiating the component failed.
	#[error( "Instantiation failed: {0}" )] Instantiation( wasmtime::Error ),
	/// No instance exists for the component; vtable fixups did not run.
	#[error( "Component {0} has not been instantiated" )] MissingInstance( ComponentId ),
	/// The initializer export is not a function.
	#[error( "Invalid initializer export: {0}" )] InvalidInitializer( String ),
	/// The initializer trapped.
	#[error( "Initializer trapped: {0}" )] InitializerTrap( wasmtime::Error ),
}

struct Instantiated<Ctx: 'static> {
	store: Store<Ctx>,
	instance: Instance,
}

/// Links and runs [`WasmImage`]s.
///
/// Every component gets its own [`Store`], whose data is produced by the
/// context factory passed to [`new`]( Self::new ).
///
/// # Type Parameters
/// - `Ctx`: User context type stored in each component's `Store`
pub struct WasmCodeEngine<Ctx: 'static> {
	engine: Engine,
	linker: Linker<Ctx>,
	#[allow( clippy::type_complexity )]
	context: Box<dyn Fn( &ComponentRecord<WasmImage> ) -> Ctx + Send + Sync>,
	initializer_export: String,
	prepared: Mutex<HashMap<ComponentId, InstancePre<Ctx>>>,
	instances: Mutex<HashMap<ComponentId, Instantiated<Ctx>>>,
}

impl<Ctx: Send + 'static> WasmCodeEngine<Ctx> {

	/// Creates an engine instantiating components against `linker`.
	///
	/// Any host functions the components import must already be in `linker`.
	pub fn new(
		engine: &Engine,
		linker: Linker<Ctx>,
		context: impl Fn( &ComponentRecord<WasmImage> ) -> Ctx + Send + Sync + 'static,
	) -> Self {
		Self {
			engine: engine.clone(),
			linker,
			context: Box::new( context ),
			initializer_export: INITIALIZER_EXPORT.to_string(),
			prepared: Mutex::new( HashMap::new() ),
			instances: Mutex::new( HashMap::new() ),
		}
	}

	/// Sets the name of the export run as the global initializer.
	pub fn with_initializer_export( mut self, name: impl Into<String> ) -> Self {
		self.initializer_export = name.into();
		self
	}

	/// Whether the component has been instantiated.
	pub fn is_instantiated( &self, id: ComponentId ) -> bool {
		self.instances.lock().contains_key( &id )
	}

	/// Runs `with` against the component's store and instance.
	///
	/// Returns `None` if the component has not been instantiated. The engine's
	/// instance table is locked for the duration of the call.
	pub fn with_instance<R>( &self, id: ComponentId, with: impl FnOnce( &mut Store<Ctx>, &Instance ) -> R ) -> Option<R> {
		let mut instances = self.instances.lock();
		let Instantiated { store, instance } = instances.get_mut( &id )?;
		Some( with( store, instance ))
	}

	fn call_initializer( &self, instantiated: &mut Instantiated<Ctx> ) -> Result<(), WasmEngineError> {
		let Instantiated { store, instance } = instantiated ;
		let index = instance
			.get_export_index( &mut *store, None, &self.initializer_export )
			.ok_or_else(|| WasmEngineError::InvalidInitializer( self.initializer_export.clone() ))?;
		let func = instance
			.get_func( &mut *store, index )
			.ok_or_else(|| WasmEngineError::InvalidInitializer( self.initializer_export.clone() ))?;
		func.call( &mut *store, &[], &mut [] ).map_err( WasmEngineError::InitializerTrap )?;
		let _ = func.post_return( &mut *store );
		Ok(())
	}

}

impl<Ctx: Send + 'static> CodeEngine<WasmImage> for WasmCodeEngine<Ctx> {

	fn run_eager_fixups( &self, record: &ComponentRecord<WasmImage> ) -> Result<(), ActionError> {
		let prepared = self.linker
			.instantiate_pre( record.image().component() )
			.map_err( WasmEngineError::Preinstantiation )?;
		self.prepared.lock().insert( record.id(), prepared );
		Ok(())
	}

	fn fixup_vtables( &self, record: &ComponentRecord<WasmImage> ) -> Result<(), ActionError> {
		let mut store = Store::new( &self.engine, ( self.context )( record ));
		let prepared = self.prepared.lock().remove( &record.id() );
		let instance = match prepared {
			Some( prepared ) => prepared.instantiate( &mut store ),
			None => self.linker.instantiate( &mut store, record.image().component() ),
		}.map_err( WasmEngineError::Instantiation )?;
		self.instances.lock().insert( record.id(), Instantiated { store, instance });
		Ok(())
	}

	fn has_global_initializer( &self, record: &ComponentRecord<WasmImage> ) -> bool {
		self.with_instance( record.id(), | store, instance | {
			instance.get_export_index( &mut *store, None, &self.initializer_export ).is_some()
		}).unwrap_or( false )
	}

	fn run_global_initializer(
		&self,
		_loader: &DomainLoader<WasmImage>,
		record: &Arc<ComponentRecord<WasmImage>>,
	) -> Result<(), ActionError> {
		// Taken out of the table so host functions called by the initializer
		// can reach this engine again.
		let mut instantiated = self.instances.lock()
			.remove( &record.id() )
			.ok_or( WasmEngineError::MissingInstance( record.id() ))?;
		let result = self.call_initializer( &mut instantiated );
		self.instances.lock().insert( record.id(), instantiated );
		result.map_err( Into::into )
	}

	fn release( &self, record: &ComponentRecord<WasmImage> ) {
		self.prepared.lock().remove( &record.id() );
		self.instances.lock().remove( &record.id() );
	}

}
