use std::sync::Barrier ;
use std::thread ;
use staged_load::{ Notice, NotificationTable };

#[test]
fn each_notice_is_claimed_exactly_once_across_threads() {

	const THREADS: usize = 8 ;
	let table = NotificationTable::default();
	let barrier = Barrier::new( THREADS );

	let claims = thread::scope(| scope | {
		let handles = ( 0..THREADS ).map(| _ | scope.spawn(|| {
			barrier.wait();
			Notice::ALL.iter().filter(| notice | table.try_claim( **notice )).count()
		})).collect::<Vec<_>>();
		handles.into_iter().map(| handle | handle.join().expect( "claiming thread panicked" )).sum::<usize>()
	});

	assert_eq!( claims, Notice::ALL.len() );
	assert!( Notice::ALL.iter().all(| notice | table.is_set( *notice )));

}

#[test]
fn notices_are_independent() {

	let table = NotificationTable::default();

	assert!( table.try_claim( Notice::ProfilerFinished ));
	assert!( !table.try_claim( Notice::ProfilerFinished ));

	assert!( table.is_set( Notice::ProfilerFinished ));
	assert!( !table.is_set( Notice::TraceFinished ));
	assert!( table.try_claim( Notice::TraceFinished ));

}
