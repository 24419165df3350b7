use std::sync::{ Arc, Barrier };
use std::thread ;
use std::time::Duration ;
use staged_load::{ LoadError, LoadLevel, LoadStatus };
use crate::mock_host::{ self, Event, Hook, MockEngine, MockImage, Recorder };

const THREADS: usize = 8 ;

#[test]
fn racing_threads_run_each_level_once() {

	mock_host::init_tracing();

	let engine = Arc::new( MockEngine::new()
		.with_initializer(| _, _ | Ok(()) )
		.with_delay( Duration::from_millis( 5 )));
	let recorder = Recorder::attached();
	let loader = mock_host::observed_loader( &engine, &recorder );
	let record = mock_host::component( &loader, MockImage::new( "app" ).precompiled() );
	let barrier = Barrier::new( THREADS );

	let results = thread::scope(| scope | {
		let handles = ( 0..THREADS ).map(| _ | scope.spawn(|| {
			barrier.wait();
			let result = loader.ensure_level( &record, LoadLevel::Active );
			( result, record.level() )
		})).collect::<Vec<_>>();
		handles.into_iter().map(| handle | handle.join().expect( "loader thread panicked" )).collect::<Vec<_>>()
	});

	for ( result, observed ) in results {
		assert_eq!( result, Ok( LoadLevel::Active ));
		assert_eq!( observed, LoadLevel::Active );
	}

	for hook in [ Hook::EagerFixups, Hook::VtableFixups, Hook::ExceptionPolicy, Hook::Initializer ] {
		assert_eq!( engine.count( hook ), 1, "{:?} did not run exactly once", hook );
	}
	assert_eq!( recorder.count(| event | matches!( event, Event::Trace( .. ))), 1 );
	assert_eq!( recorder.count(| event | matches!( event, Event::Profiler( .. ))), 1 );
	assert_eq!( recorder.count(| event | matches!( event, Event::ComponentLoaded( _ ))), 1 );
	assert_eq!( recorder.count(| event | matches!( event, Event::Enumerable( .. ))), 1 );
	assert_eq!( recorder.count(| event | matches!( event, Event::Loading( .. ))), 1 );

}

#[test]
fn racing_threads_share_one_failure() {

	let engine = Arc::new( MockEngine::new()
		.failing_on( Hook::VtableFixups )
		.with_delay( Duration::from_millis( 5 )));
	let recorder = Recorder::detached();
	let loader = mock_host::observed_loader( &engine, &recorder );
	let record = mock_host::component( &loader, MockImage::new( "app" ));
	let barrier = Barrier::new( THREADS );

	let errors = thread::scope(| scope | {
		let handles = ( 0..THREADS ).map(| _ | scope.spawn(|| {
			barrier.wait();
			loader.ensure_level( &record, LoadLevel::Active )
		})).collect::<Vec<_>>();
		handles.into_iter().map(| handle | match handle.join().expect( "loader thread panicked" ) {
			Err( LoadError::Sticky( error )) => error,
			value => panic!( "Expected Sticky error, found: {:#?}", value ),
		}).collect::<Vec<_>>()
	});

	assert!( errors.windows( 2 ).all(| pair | pair[ 0 ] == pair[ 1 ] ));
	assert_eq!( engine.count( Hook::VtableFixups ), 1 );
	assert_eq!( record.level(), LoadLevel::DeliverEvents );

	// Tracing already reported success at DeliverEvents; the later failure is not reported again.
	assert_eq!( recorder.count(| event | matches!( event, Event::Trace( _, LoadStatus::Success ))), 1 );
	assert_eq!( recorder.count(| event | matches!( event, Event::Trace( .. ))), 1 );

}

#[test]
fn racing_threads_with_different_targets() {

	let engine = Arc::new( MockEngine::new().with_delay( Duration::from_millis( 2 )));
	let loader = mock_host::loader( &engine );
	let record = mock_host::component( &loader, MockImage::new( "app" ));
	let barrier = Barrier::new( LoadLevel::ALL.len() );

	thread::scope(| scope | {
		for target in LoadLevel::ALL {
			let ( loader, record, barrier ) = ( &loader, &record, &barrier );
			scope.spawn( move || {
				barrier.wait();
				let reached = loader.ensure_level( record, target ).expect( "failed to advance" );
				assert!( reached >= target, "asked for {}, got {}", target, reached );
			});
		}
	});

	assert_eq!( record.level(), LoadLevel::Active );
	assert_eq!( engine.count( Hook::VtableFixups ), 1 );
	assert_eq!( engine.count( Hook::ExceptionPolicy ), 1 );

}
