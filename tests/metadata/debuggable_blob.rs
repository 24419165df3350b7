use staged_load::{ DebuggerFlags, ImageError };

#[test]
fn missing_attribute_allows_optimizations() {
	assert_eq!( DebuggerFlags::from_attribute( None ), Ok( DebuggerFlags::ALLOW_OPTIMIZATIONS ));
}

#[test]
fn blob_of_wrong_size_is_a_bad_image() {
	for size in [ 0, 2, 5, 7, 9 ] {
		let blob = [ 1, 0, 0, 0, 0, 0, 0, 0, 0 ];
		match DebuggerFlags::from_attribute( Some( &blob[ ..size ] )) {
			Err( ImageError::BadImage( _ )) => {}
			value => panic!( "Expected BadImage for {} bytes, found: {:#?}", size, value ),
		}
	}
}

#[test]
fn blob_with_wrong_marker_is_a_bad_image() {
	match DebuggerFlags::from_attribute( Some( &[ 0, 1, 0, 0, 0, 0 ] )) {
		Err( ImageError::BadImage( _ )) => {}
		value => panic!( "Expected BadImage, found: {:#?}", value ),
	}
}

#[test]
fn tracking_with_zero_disable_byte_still_allows_optimizations() {
	assert_eq!(
		DebuggerFlags::from_attribute( Some( &[ 1, 0, 0x3, 0, 0, 0 ] )),
		Ok( DebuggerFlags::TRACK_JIT_INFO | DebuggerFlags::IGNORE_SYMBOLS | DebuggerFlags::ALLOW_OPTIMIZATIONS ),
	);
}

#[test]
fn tracking_with_disable_byte_forbids_optimizations() {
	assert_eq!(
		DebuggerFlags::from_attribute( Some( &[ 1, 0, 0x1, 1, 0, 0, 0, 0 ] )),
		Ok( DebuggerFlags::TRACK_JIT_INFO ),
	);
}

#[test]
fn disable_byte_is_ignored_without_tracking() {
	assert_eq!(
		DebuggerFlags::from_attribute( Some( &[ 1, 0, 0x2, 1, 0, 0 ] )),
		Ok( DebuggerFlags::IGNORE_SYMBOLS | DebuggerFlags::ALLOW_OPTIMIZATIONS ),
	);
}
