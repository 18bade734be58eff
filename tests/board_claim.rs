//! the board claim is process-wide, so it gets its own test binary with a
//! single test that walks the whole sequence.
#![cfg(not(feature = "hardware"))]

mod common;

use bikesense::hal::Board;
use bikesense::storage::MemoryStorage;
use bikesense::{BikeSenseError, RuntimeBuilder, TripState};
use common::StubGps;

#[tokio::test]
async fn test_board_is_claimed_once_per_process() {
    // first wifi runtime claims the (mock) board and joins through it
    let mut runtime = RuntimeBuilder::new(StubGps::new(), MemoryStorage::default())
        .wifi("bikenet", "Bike123!")
        .build()
        .unwrap();
    runtime.cycle().await;
    assert_eq!(runtime.state(), TripState::ConnectedNotUploaded);

    assert!(matches!(Board::take(25), Err(BikeSenseError::Reuse)));

    let second = RuntimeBuilder::new(StubGps::new(), MemoryStorage::default())
        .wifi("bikenet", "Bike123!")
        .build();
    assert!(matches!(second, Err(BikeSenseError::Reuse)));

    // offline runtimes never touch the board
    let offline = RuntimeBuilder::new(StubGps::new(), MemoryStorage::default()).build().unwrap();
    assert_eq!(offline.state(), TripState::Disconnected);
}
