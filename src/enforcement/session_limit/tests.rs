use super::*;
use crate::storage::{InMemoryStore, KeyValueStore};

fn driver() -> Driver<InMemoryStore> {
    Driver::new(InMemoryStore::new(), "testsite")
}

#[test]
fn chronological_arrivals_admitted_up_to_limit() {
    let driver = driver();
    let room = SessionLimiter::new(&driver, 4, 300);
    let tickets: Vec<SessionTicket> = (1..=5)
        .map(|i| room.admit(&format!("s{}", i), "1.1.1.1", 100 + i).unwrap())
        .collect();

    for (i, t) in tickets.iter().enumerate() {
        assert_eq!(t.order, i as u64 + 1);
        assert_eq!(t.position, t.order);
    }
    assert!(tickets[..4].iter().all(|t| t.admitted));
    assert!(!tickets[4].admitted);
    assert_eq!(tickets[4].wait_number, 1);
    assert_eq!(tickets[3].wait_number, 0);
}

#[test]
fn returning_session_keeps_its_order() {
    let driver = driver();
    let room = SessionLimiter::new(&driver, 1, 300);
    let first = room.admit("a", "1.1.1.1", 10).unwrap();
    room.admit("b", "1.1.1.2", 11).unwrap();
    let again = room.admit("a", "1.1.1.1", 12).unwrap();
    assert_eq!(first.order, again.order);
    assert!(again.admitted);
    assert_eq!(again.active, 2);
}

#[test]
fn held_session_is_found_without_the_index() {
    let driver = driver();
    let room = SessionLimiter::new(&driver, 2, 300);
    let first = room.admit("a", "1.1.1.1", 10).unwrap();
    driver
        .store()
        .set("testsite:index:session", b"[]")
        .unwrap();

    let again = room.admit("a", "1.1.1.1", 11).unwrap();
    assert_eq!(again.order, first.order);
    assert_eq!(again.position, 1);
    assert_eq!(room.active_count(11).unwrap(), 1);
}

#[test]
fn waiting_session_moves_up_after_sweep() {
    let driver = driver();
    let room = SessionLimiter::new(&driver, 4, 300);
    for i in 1..=4 {
        room.admit(&format!("s{}", i), "1.1.1.1", 0).unwrap();
    }
    let waiting = room.admit("s5", "1.1.1.1", 10).unwrap();
    assert!(!waiting.admitted);

    // s1..s4 go idle; s5 keeps polling until they lapse.
    let later = room.admit("s5", "1.1.1.1", 301).unwrap();
    assert_eq!(later.order, 5);
    assert_eq!(later.position, 1);
    assert!(later.admitted);
    assert_eq!(room.active_count(301).unwrap(), 1);
}

#[test]
fn expired_session_draws_new_ticket() {
    let driver = driver();
    let room = SessionLimiter::new(&driver, 2, 30);
    let first = room.admit("a", "1.1.1.1", 0).unwrap();
    let second = room.admit("a", "1.1.1.1", 31).unwrap();
    assert!(second.order > first.order);
}

#[test]
fn orders_are_unique_and_increasing() {
    let driver = driver();
    let room = SessionLimiter::new(&driver, 100, 300);
    let mut last = 0;
    for i in 0..20 {
        let t = room.admit(&format!("s{}", i), "1.1.1.1", i).unwrap();
        assert!(t.order > last);
        last = t.order;
    }
}

#[test]
fn release_frees_a_slot() {
    let driver = driver();
    let room = SessionLimiter::new(&driver, 1, 300);
    room.admit("a", "1.1.1.1", 0).unwrap();
    assert!(!room.admit("b", "1.1.1.2", 1).unwrap().admitted);
    assert!(room.release("a").unwrap());
    assert!(!room.release("a").unwrap());
    assert!(room.admit("b", "1.1.1.2", 2).unwrap().admitted);
}

#[test]
fn status_is_read_only() {
    let driver = driver();
    let room = SessionLimiter::new(&driver, 1, 30);
    room.admit("a", "1.1.1.1", 0).unwrap();
    room.admit("b", "1.1.1.2", 5).unwrap();

    let b = room.status("b", 6).unwrap().unwrap();
    assert_eq!(b.position, 2);
    assert!(!b.admitted);

    // a lapsed but status does not reclaim it.
    assert!(room.status("a", 40).unwrap().is_none());
    assert!(driver.has(RecordKind::Session, "a").unwrap());
    assert!(room.status("zzz", 6).unwrap().is_none());
}

#[test]
fn sweep_is_idempotent_and_keeps_counter() {
    let driver = driver();
    let room = SessionLimiter::new(&driver, 2, 10);
    room.admit("a", "1.1.1.1", 0).unwrap();
    room.admit("b", "1.1.1.1", 0).unwrap();
    assert_eq!(room.sweep(100).unwrap(), 0);
    assert_eq!(room.sweep(100).unwrap(), 0);
    let c = room.admit("c", "1.1.1.1", 100).unwrap();
    assert_eq!(c.order, 3);
    assert_eq!(c.position, 1);
}
