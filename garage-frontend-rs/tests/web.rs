//! Browser tests, run with `wasm-pack test --headless --firefox`.

#![cfg(target_arch = "wasm32")]

use garage_frontend_rs::{Garage, car_key};
use garage_utils::TrackingPatch;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn tracking_survives_a_new_garage() {
    let key = car_key("Bugatti", "Chiron");
    let first = Garage::new();
    first.set_car_tracking_data(&key, TrackingPatch::stars(3), None);

    // a second instance reads the same localStorage
    let second = Garage::new();
    assert_eq!(second.get_car_tracking_data(&key).stars, 3);
}

#[wasm_bindgen_test]
fn every_garage_shares_one_logger() {
    let _first = Garage::new();
    let _second = Garage::new();
    assert_eq!(log::max_level(), log::LevelFilter::Debug);
    log::info!("still logging after a second garage");
}
