//! Run with `wasm-pack test --headless --firefox -- --features web`.
#![cfg(all(target_arch = "wasm32", feature = "web"))]

use std::rc::Rc;

use depot::{Depot, web::LocalStorage};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn local_storage_round_trip() {
    let storage = LocalStorage::open().unwrap();
    let mut depot = Depot::new(Rc::new(storage));
    depot.write("depot-test", "hello").unwrap();
    assert_eq!(depot.read("depot-test").as_deref(), Some("hello"));
    depot.remove("depot-test").unwrap();
    assert_eq!(depot.read("depot-test"), None);
}
