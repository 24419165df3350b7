use std::sync::Arc ;
use std::thread ;
use std::time::Duration ;
use staged_load::LoadLevel ;
use crate::mock_host::{ self, Hook, MockEngine, MockImage };

fn wait_for_hook( engine: &MockEngine, hook: Hook ) {
	while engine.count( hook ) == 0 { thread::yield_now() }
}

#[test]
fn tolerant_check_waits_for_another_threads_transition() {

	let engine = Arc::new( MockEngine::new().with_delay( Duration::from_millis( 200 )));
	let loader = mock_host::loader( &engine );
	let record = mock_host::component( &loader, MockImage::new( "app" ));

	thread::scope(| scope | {

		let owner = scope.spawn(|| loader.ensure_level( &record, LoadLevel::Loaded ));
		wait_for_hook( &engine, Hook::VtableFixups );

		assert!( !loader.check_level( &record, LoadLevel::Loaded, false ));
		assert!( loader.check_level( &record, LoadLevel::Loaded, true ));
		assert_eq!( owner.join().expect( "owner panicked" ), Ok( LoadLevel::Loaded ));

	});

}

#[test]
fn tolerant_check_of_a_failing_transition_is_false() {

	let engine = Arc::new( MockEngine::new()
		.failing_on( Hook::VtableFixups )
		.with_delay( Duration::from_millis( 100 )));
	let loader = mock_host::loader( &engine );
	let record = mock_host::component( &loader, MockImage::new( "app" ));

	thread::scope(| scope | {

		let owner = scope.spawn(|| loader.ensure_level( &record, LoadLevel::Loaded ));
		wait_for_hook( &engine, Hook::VtableFixups );

		assert!( !loader.check_level( &record, LoadLevel::Loaded, true ));
		assert!( owner.join().expect( "owner panicked" ).is_err() );

	});

}

#[test]
fn waiter_gets_the_exact_level_it_asked_for() {

	let engine = Arc::new( MockEngine::new().with_delay( Duration::from_millis( 100 )));
	let loader = mock_host::loader( &engine );
	let record = mock_host::component( &loader, MockImage::new( "app" ));

	thread::scope(| scope | {

		let owner = scope.spawn(|| loader.ensure_level( &record, LoadLevel::Active ));
		wait_for_hook( &engine, Hook::VtableFixups );

		// Not relaxed: this thread owns nothing, so it waits for Active itself.
		assert_eq!( loader.ensure_level( &record, LoadLevel::Active ), Ok( LoadLevel::Active ));
		assert_eq!( owner.join().expect( "owner panicked" ), Ok( LoadLevel::Active ));

	});

	assert_eq!( engine.count( Hook::VtableFixups ), 1 );
	assert_eq!( engine.count( Hook::ExceptionPolicy ), 1 );

}
