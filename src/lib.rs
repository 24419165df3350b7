//! Level-gated, reentrancy-tolerant loading of deployable components.
//!
//! A component moves through a fixed sequence of [`LoadLevel`]s, from
//! [`Created`]( LoadLevel::Created ) to [`Active`]( LoadLevel::Active ). Each
//! level runs one action: publishing the component, giving a profiler its
//! injection point, applying fixups, delivering notifications, running the
//! global initializer. A [`DomainLoader`] guarantees each action runs exactly
//! once per component no matter how many threads ask for it.
//!
//! # Core Concepts
//!
//! - [`ComponentRecord`]: The loader's state for one component: backing image,
//! 	reached level, sticky failure and one-shot notification flags.
//!
//! - [`DomainLoader`]: Owns the registry of one execution domain and advances
//! 	components through [`ensure_level`]( DomainLoader::ensure_level ).
//!
//! - [`Image`] and [`CodeEngine`]: The collaborators the loader drives. The
//! 	[`wasm`] module provides wasmtime-backed implementations of both.
//!
//! - **Sticky failure**: The first failed action is captured as a [`StickyError`]
//! 	and replayed, unchanged, to every later caller that needs the failed level.
//!
//! - **Relaxed requirement**: A thread that re-enters the loader for a component
//! 	it is already advancing is never blocked. It receives the level just below
//! 	the one it asked for.
//!
//! # Re-exports
//!
//! `staged_load` re-exports a small set of types from `wasmtime` for convenience
//! (`Engine`, `Component`, `Linker`). These types are defined by wasmtime; see the
//! [wasmtime docs](https://docs.rs/wasmtime/latest/wasmtime/) for details.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc ;
//! use staged_load::{
//! 	DomainLoader, LoadLevel, LoaderAllocator,
//! 	WasmCodeEngine, WasmImage, Engine, Component, Linker,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::default();
//!
//! // Host functions the components import go into the linker up front.
//! // Every component gets its own store, whose data the closure builds.
//! let code = WasmCodeEngine::new( &engine, Linker::<()>::new( &engine ), | _record | ());
//! let loader = DomainLoader::<WasmImage>::new( Arc::new( code ));
//!
//! let image = WasmImage::new( "greeter", Component::new( &engine, r#"(component
//! 	(core module $m (func (export "f")))
//! 	(core instance $i (instantiate $m))
//! 	(func $f (export "initialize") (canon lift (core func $i "f")))
//! )"# )?);
//! let record = loader.create_component( Arc::new( image ), Arc::new( LoaderAllocator::shared() ))?;
//!
//! // Runs every level action, the `initialize` export included.
//! assert_eq!( loader.ensure_level( &record, LoadLevel::Active )?, LoadLevel::Active );
//! assert!( loader.check_activated( &record ).is_ok() );
//! # Ok(())
//! # }
//! ```
//!
//! # Failures
//!
//! Failures are permanent. Asking again for the failed level, or any level
//! above it, returns the same error; lower levels keep succeeding.
//!
//! ```
//! # use std::sync::Arc ;
//! # use staged_load::{ DomainLoader, LoadError, LoadLevel, LoaderAllocator, WasmCodeEngine, WasmImage, Engine, Component, Linker };
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let engine = Engine::default();
//! # let code = WasmCodeEngine::new( &engine, Linker::<()>::new( &engine ), | _record | ());
//! # let loader = DomainLoader::<WasmImage>::new( Arc::new( code ));
//! let image = WasmImage::new( "trapping", Component::new( &engine, r#"(component
//! 	(core module $m (func (export "f") unreachable))
//! 	(core instance $i (instantiate $m))
//! 	(func $f (export "initialize") (canon lift (core func $i "f")))
//! )"# )?);
//! let record = loader.create_component( Arc::new( image ), Arc::new( LoaderAllocator::shared() ))?;
//!
//! let first = loader.ensure_level( &record, LoadLevel::Active ).unwrap_err();
//! let second = loader.ensure_level( &record, LoadLevel::Active ).unwrap_err();
//! assert!( matches!( first, LoadError::Sticky( _ )));
//! assert_eq!( first, second );
//! assert_eq!( loader.ensure_level( &record, LoadLevel::Loaded )?, LoadLevel::Loaded );
//! # Ok(())
//! # }
//! ```

mod level ;
mod error ;
mod image ;
mod record ;
mod notification ;
mod dispatch ;
mod engine ;
mod machine ;
mod loader ;
mod utils ;
pub mod wasm ;

pub use level::LoadLevel ;
pub use error::{ ActionError, ActionPanicked, EligibilityError, FailureKind, ImageError, LoadError, LoadStatus, StickyError };
pub use image::{ DEBUGGABLE_ATTRIBUTE, DebuggerFlags, Image, ImageLoader, LoaderAllocator };
pub use record::{ ComponentId, ComponentRecord };
pub use notification::{ Notice, NotificationTable };
pub use dispatch::{ AttachListener, InspectionHook, LoadingListener, ProfilerSink, TraceSink };
pub use engine::CodeEngine ;
pub use loader::{ DomainLoader, LoaderConfig };
pub use utils::PartialSuccess ;
pub use wasm::{ WasmCodeEngine, WasmEngineError, WasmImage, WasmImageLoader };

pub use wasmtime::Engine ;
pub use wasmtime::component::{ Component, Linker };
