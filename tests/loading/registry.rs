use std::sync::Arc ;
use staged_load::{ Image, LoadError, LoadLevel, LoaderAllocator };
use crate::mock_host::{ self, Hook, MockEngine, MockImage, MockImageLoader };

#[test]
fn components_are_published_at_begin() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let record = mock_host::component( &loader, MockImage::new( "app" ));

	assert!( loader.components().is_empty() );
	assert!( loader.find( record.id() ).is_none() );
	assert!( !record.is_visible_to_listener() );

	loader.ensure_level( &record, LoadLevel::Begin ).expect( "failed to begin" );

	assert_eq!( loader.components().len(), 1 );
	assert!( loader.find( record.id() ).is_some_and(| found | Arc::ptr_eq( &found, &record )));
	assert!( record.is_visible_to_listener() );
	assert!( record.image().attached().is_some_and(| attached | Arc::ptr_eq( &attached, &record )));

}

#[test]
fn components_are_listed_in_creation_order() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let first = mock_host::component( &loader, MockImage::new( "first" ));
	let second = mock_host::component( &loader, MockImage::new( "second" ));

	loader.ensure_level( &second, LoadLevel::Begin ).expect( "failed to begin second" );
	loader.ensure_level( &first, LoadLevel::Begin ).expect( "failed to begin first" );

	let ids = loader.components().iter().map(| record | record.id() ).collect::<Vec<_>>();
	assert_eq!( ids, vec![ first.id(), second.id() ]);
	assert_eq!( u64::from( first.id() ) + 1, u64::from( second.id() ));

}

#[test]
fn load_component_resolves_through_the_image_loader() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let images = MockImageLoader( vec![ "core", "app" ]);

	let record = loader
		.load_component( &images, "app", Arc::new( LoaderAllocator::shared() ))
		.expect( "failed to load app" );
	assert_eq!( record.image().name(), "app" );

	match loader.load_component( &images, "missing", Arc::new( LoaderAllocator::shared() )) {
		Err( LoadError::NotFound( reference )) if reference == "missing" => {}
		value => panic!( "Expected NotFound, found: {:#?}", value ),
	}

}

#[test]
fn images_that_may_not_execute_are_rejected() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );

	match loader.create_component( Arc::new( MockImage::new( "blocked" ).not_executable() ), Arc::new( LoaderAllocator::shared() )) {
		Err( LoadError::BadImage( _ )) => {}
		value => panic!( "Expected BadImage, found: {:#?}", value ),
	}

}

#[test]
fn ensure_all_reports_partial_success() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let good = mock_host::component( &loader, MockImage::new( "good" ));
	let bad = mock_host::component( &loader, MockImage::new( "bad" ).unloaded() );
	let other = mock_host::component( &loader, MockImage::new( "other" ));

	for record in [ &good, &bad, &other ] {
		loader.ensure_level( record, LoadLevel::Begin ).expect( "failed to begin" );
	}

	let ( loaded, failed ) = loader.ensure_all( LoadLevel::Active );

	assert_eq!( loaded, vec![ good.id(), other.id() ]);
	match failed.as_slice() {
		[( id, LoadError::Sticky( error ))] if *id == bad.id() && error.level() == LoadLevel::BeforeTypeLoad => {}
		value => panic!( "Expected a single sticky failure, found: {:#?}", value ),
	}
	assert_eq!( good.level(), LoadLevel::Active );
	assert_eq!( other.level(), LoadLevel::Active );

}

#[test]
fn unload_removes_collectible_components() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let record = mock_host::collectible( &loader, MockImage::new( "plugin" ));
	let allocator = Arc::clone( record.allocator() );

	loader.ensure_level( &record, LoadLevel::Active ).expect( "failed to activate" );
	assert!( record.is_collectible() );
	assert_eq!( Arc::strong_count( &allocator ), 2 );

	loader.unload( record.id() ).expect( "failed to unload" );
	assert!( loader.find( record.id() ).is_none() );
	assert_eq!( engine.count_for( record.id(), Hook::Release ), 1 );

	match loader.unload( record.id() ) {
		Err( LoadError::NotFound( _ )) => {}
		value => panic!( "Expected NotFound on second unload, found: {:#?}", value ),
	}

	let image = Arc::clone( record.image() );
	drop( record );
	assert_eq!( Arc::strong_count( &allocator ), 1 );
	assert!( image.was_detached() );
	assert!( image.attached().is_none() );

}

#[test]
fn unloaded_components_stop_loading() {

	let engine = Arc::new( MockEngine::new().with_initializer(| _, _ | Ok(()) ));
	let loader = mock_host::loader( &engine );
	let record = mock_host::collectible( &loader, MockImage::new( "plugin" ));

	loader.ensure_level( &record, LoadLevel::Loaded ).expect( "failed to load" );
	loader.unload( record.id() ).expect( "failed to unload" );
	assert!( record.is_unloaded() );
	assert!( !record.is_loading() );

	assert_eq!(
		loader.ensure_level( &record, LoadLevel::Active ),
		Err( LoadError::Unloaded { component: record.id(), level: LoadLevel::Loaded }),
	);
	assert_eq!( loader.ensure_level( &record, LoadLevel::Loaded ), Ok( LoadLevel::Loaded ));
	assert!( !loader.check_level( &record, LoadLevel::Active, true ));
	assert_eq!( engine.count( Hook::Initializer ), 0 );
	assert_eq!( record.level(), LoadLevel::Loaded );

}

#[test]
fn teardown_stops_components_still_loading() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let record = mock_host::component( &loader, MockImage::new( "core" ));

	loader.ensure_level( &record, LoadLevel::Begin ).expect( "failed to begin" );
	loader.teardown();

	match loader.ensure_level( &record, LoadLevel::Active ) {
		Err( LoadError::Unloaded { component, level: LoadLevel::Begin }) if component == record.id() => {}
		value => panic!( "Expected Unloaded at Begin, found: {:#?}", value ),
	}
	assert_eq!( engine.count( Hook::VtableFixups ), 0 );

}

#[test]
fn shared_components_are_not_collectible() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let record = mock_host::component( &loader, MockImage::new( "core" ));

	loader.ensure_level( &record, LoadLevel::Begin ).expect( "failed to begin" );

	assert_eq!( loader.unload( record.id() ), Err( LoadError::NotCollectible( record.id() )));
	assert!( loader.find( record.id() ).is_some() );

}

#[test]
fn unpublished_records_are_never_detached() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let record = mock_host::component( &loader, MockImage::new( "app" ));
	let image = Arc::clone( record.image() );

	drop( record );
	assert!( !image.was_detached() );

}

#[test]
fn teardown_releases_every_component() {

	let engine = Arc::new( MockEngine::new() );
	let loader = mock_host::loader( &engine );
	let core = mock_host::component( &loader, MockImage::new( "core" ));
	let plugin = mock_host::collectible( &loader, MockImage::new( "plugin" ));

	loader.ensure_level( &core, LoadLevel::Active ).expect( "failed to activate core" );
	loader.ensure_level( &plugin, LoadLevel::Active ).expect( "failed to activate plugin" );

	loader.teardown();

	assert!( loader.components().is_empty() );
	assert_eq!( engine.count( Hook::Release ), 2 );

	drop( loader );
	assert_eq!( engine.count( Hook::Release ), 2 );

}
