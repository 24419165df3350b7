use std::sync::Arc ;
use pipe_trait::Pipe ;
use thiserror::Error ;

use crate::LoadLevel ;
use crate::record::ComponentId ;



/// Error type returned by collaborator actions run at a level transition.
///
/// Anything implementing [`std::error::Error`] converts into it with `?`,
/// including `wasmtime::Error`.
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while resolving a backing image.
#[derive( Error, Debug, Clone, PartialEq, Eq )]
pub enum ImageError {
	/// The image or one of its metadata blobs is malformed.
	#[error( "Bad Image: {0}" )] BadImage( String ),
	/// The image reference could not be resolved.
	#[error( "Not Found: {0}" )] NotFound( String ),
}

/// Errors returned by the [`DomainLoader`]( crate::DomainLoader ).
#[derive( Error, Debug, Clone, PartialEq, Eq )]
pub enum LoadError {
	/// The image or one of its metadata blobs is malformed.
	#[error( "Bad Image: {0}" )] BadImage( String ),
	/// A dependency or image could not be resolved.
	#[error( "Not Found: {0}" )] NotFound( String ),
	/// Another transition of the component is still running and this caller
	/// could not wait for it. No failure has been recorded; retry later.
	#[error( "Load In Progress: component {component} is at {level}" )]
	LoadInProgress { component: ComponentId, level: LoadLevel },
	/// The component failed permanently at some level.
	#[error( "{0}" )] Sticky( StickyError ),
	/// Only collectible components may be unloaded individually.
	#[error( "Component {0} is not collectible" )] NotCollectible( ComponentId ),
	/// The component left the domain before reaching the requested level.
	#[error( "Component {component} was unloaded at {level}" )]
	Unloaded { component: ComponentId, level: LoadLevel },
}

impl From<ImageError> for LoadError {
	fn from( error: ImageError ) -> Self { match error {
		ImageError::BadImage( message ) => Self::BadImage( message ),
		ImageError::NotFound( message ) => Self::NotFound( message ),
	}}
}

impl From<StickyError> for LoadError {
	fn from( error: StickyError ) -> Self { Self::Sticky( error ) }
}

/// A level action panicked. The panic is kept as the component's failure
/// instead of unwinding through the loader.
#[derive( Error, Debug, Clone, PartialEq, Eq )]
#[error( "Level action panicked: {0}" )]
pub struct ActionPanicked( pub String );

impl ActionPanicked {
	pub(crate) fn from_payload( payload: &( dyn std::any::Any + Send )) -> Self {
		payload.downcast_ref::<&str>().map(| message | ( *message ).to_string() )
			.or_else(|| payload.downcast_ref::<String>().cloned() )
			.unwrap_or_else(|| "non-string panic payload".to_string() )
			.pipe( Self )
	}
}

/// Broad classification of a captured failure, reported as the status of
/// failure notifications.
#[derive( Copy, Clone, Debug, PartialEq, Eq, Hash )]
pub enum FailureKind {
	/// Malformed image or metadata.
	BadImage,
	/// Unresolvable dependency.
	NotFound,
	/// A level action failed for any other reason.
	Action,
}

impl FailureKind {

	fn of( error: &( dyn std::error::Error + 'static )) -> Self {
		if let Some( error ) = error.downcast_ref::<LoadError>() {
			return match error {
				LoadError::BadImage( _ ) => Self::BadImage,
				LoadError::NotFound( _ ) => Self::NotFound,
				LoadError::Sticky( sticky ) => sticky.kind(),
				LoadError::LoadInProgress { .. }
					| LoadError::NotCollectible( _ )
					| LoadError::Unloaded { .. } => Self::Action,
			};
		}
		match error.downcast_ref::<ImageError>() {
			Some( ImageError::BadImage( _ )) => Self::BadImage,
			Some( ImageError::NotFound( _ )) => Self::NotFound,
			None => Self::Action,
		}
	}

}

/// Status carried by "load finished" notifications.
#[derive( Copy, Clone, Debug, PartialEq, Eq, Hash )]
pub enum LoadStatus {
	Success,
	Failure( FailureKind ),
}

/// A permanently recorded failure of one component.
///
/// The failure is flattened into owned data when captured, so the value can be
/// cloned, sent to other threads and returned to any number of callers. Two
/// replays of the same failure compare equal.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct StickyError( Arc<Failure> );

#[derive( Debug, PartialEq, Eq )]
struct Failure {
	component: ComponentId,
	level: LoadLevel,
	kind: FailureKind,
	message: String,
	causes: Vec<String>,
}

impl StickyError {

	/// Captures `error` as the failure of `component` while advancing to `level`.
	pub fn capture(
		component: ComponentId,
		level: LoadLevel,
		error: &( dyn std::error::Error + 'static ),
	) -> Self {
		let causes = std::iter::successors( error.source(), | cause | cause.source() )
			.map( ToString::to_string )
			.collect();
		Self( Arc::new( Failure {
			component,
			level,
			kind: FailureKind::of( error ),
			message: error.to_string(),
			causes,
		}))
	}

	/// The component that failed.
	#[inline] pub fn component( &self ) -> ComponentId { self.0.component }

	/// The level whose action failed. The component never gets past the level below it.
	#[inline] pub fn level( &self ) -> LoadLevel { self.0.level }

	/// Classification of the original error.
	#[inline] pub fn kind( &self ) -> FailureKind { self.0.kind }

	/// Display text of the original error.
	#[inline] pub fn message( &self ) -> &str { &self.0.message }

	/// Display text of each error in the original `source()` chain, outermost first.
	#[inline] pub fn causes( &self ) -> &[String] { &self.0.causes }

}

impl std::fmt::Display for StickyError {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result {
		write!( f, "Component {} failed at {}: {}", self.0.component, self.0.level, self.0.message )?;
		self.0.causes.iter().try_for_each(| cause | write!( f, ": {}", cause ))
	}
}

impl std::error::Error for StickyError {}

/// Why a component may not execute code yet.
///
/// Returned by [`DomainLoader::check_loaded`]( crate::DomainLoader::check_loaded )
/// and [`DomainLoader::check_activated`]( crate::DomainLoader::check_activated ).
#[derive( Error, Debug, Clone, PartialEq, Eq )]
pub enum EligibilityError {
	/// Loading failed below the required level.
	#[error( "Load resulted in an error: {0}" )] Failed( StickyError ),
	/// The backing image has not been loaded.
	#[error( "Image of component {0} has not been loaded" )] ImageNotLoaded( ComponentId ),
	/// The component has not reached [`LoadLevel::Loaded`].
	#[error( "Component {0} has not been fully loaded" )] NotLoaded( ComponentId ),
	/// The component has not had execution verified.
	#[error( "Component {0} has not been activated" )] NotActivated( ComponentId ),
}
