use std::sync::Arc ;
use staged_load::{ DEBUGGABLE_ATTRIBUTE, DebuggerFlags, LoadError, LoadLevel, LoaderAllocator, LoaderConfig };
use crate::mock_host::{ self, MockEngine, MockImage };

#[test]
fn flags_are_decoded_once_at_construction() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let record = mock_host::component( &loader, MockImage::new( "app" )
		.with_attribute( DEBUGGABLE_ATTRIBUTE, &[ 1, 0, 0x1, 1, 0, 0 ] ));

	assert_eq!( record.debugger_flags(), DebuggerFlags::TRACK_JIT_INFO );

}

#[test]
fn malformed_blob_prevents_the_record() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let image = MockImage::new( "app" ).with_attribute( DEBUGGABLE_ATTRIBUTE, &[ 1, 0, 0, 0, 0, 0, 0 ] );

	match loader.create_component( Arc::new( image ), Arc::new( LoaderAllocator::shared() )) {
		Err( LoadError::BadImage( _ )) => {}
		value => panic!( "Expected BadImage, found: {:#?}", value ),
	}
	assert!( loader.components().is_empty() );

}

#[test]
fn attribute_name_is_configurable() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine )
		.with_config( LoaderConfig { debuggable_attribute: "debug-config", ..LoaderConfig::default() });
	let record = mock_host::component( &loader, MockImage::new( "app" )
		.with_attribute( "debug-config", &[ 1, 0, 0x2, 0, 0, 0, 0, 0 ] )
		.with_attribute( DEBUGGABLE_ATTRIBUTE, &[ 0xff ] ));

	assert_eq!( record.debugger_flags(), DebuggerFlags::IGNORE_SYMBOLS | DebuggerFlags::ALLOW_OPTIMIZATIONS );
	assert_eq!( loader.ensure_level( &record, LoadLevel::Active ), Ok( LoadLevel::Active ));

}
