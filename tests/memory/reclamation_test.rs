/*!
 * Reclamation Tests
 * Release, coalescing, page return and misuse handling
 */

use crate::common::{manager, PAGE};
use pretty_assertions::assert_eq;
use std::ptr::NonNull;
use typed_mm::{BlockInfo, MemoryError};

fn layout(mm: &typed_mm::MemoryManager, name: &str) -> Vec<(usize, usize, bool)> {
    mm.blocks(name)
        .unwrap()
        .into_iter()
        .map(|BlockInfo { offset, size, is_free, .. }| (offset, size, is_free))
        .collect()
}

#[test]
fn test_page_returned_once_empty() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();

    let a = mm.allocate("Rec", 1).unwrap();
    let b = mm.allocate("Rec", 1).unwrap();
    let c = mm.allocate("Rec", 1).unwrap();
    assert_eq!(mm.source_pages_outstanding(), 1);

    mm.release(b).unwrap();
    mm.release(a).unwrap();
    assert_eq!(mm.family_stats("Rec").unwrap().pages, 1);
    mm.release(c).unwrap();

    let stats = mm.family_stats("Rec").unwrap();
    assert_eq!(stats.pages, 0);
    assert_eq!(stats.free_blocks, 0);
    assert_eq!(stats.largest_free, None);
    assert_eq!(mm.pages_held(), 0);
    assert_eq!(mm.source_pages_outstanding(), 0);
}

#[test]
fn test_release_merges_with_both_neighbors() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();

    let a = mm.allocate("Rec", 1).unwrap();
    let b = mm.allocate("Rec", 1).unwrap();
    let c = mm.allocate("Rec", 1).unwrap();
    let _d = mm.allocate("Rec", 1).unwrap();

    mm.release(a).unwrap();
    mm.release(c).unwrap();
    assert_eq!(
        layout(&mm, "Rec"),
        vec![
            (32, 64, true),
            (128, 64, false),
            (224, 64, true),
            (320, 64, false),
            (416, PAGE - 416 - 32, true),
        ]
    );

    mm.release(b).unwrap();
    assert_eq!(
        layout(&mm, "Rec"),
        vec![
            (32, 64 + 96 + 96, true),
            (320, 64, false),
            (416, PAGE - 416 - 32, true),
        ]
    );
    mm.audit("Rec").unwrap();
}

#[test]
fn test_released_tail_absorbs_slack() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();

    let a = mm.allocate("Rec", 1).unwrap();
    let big = mm.allocate("Rec", 10).unwrap();
    mm.release(big).unwrap();

    // The freed block and the page tail collapse into one block
    assert_eq!(
        layout(&mm, "Rec"),
        vec![(32, 64, false), (128, PAGE - 128 - 32, true)]
    );
    mm.release(a).unwrap();
    assert_eq!(mm.pages_held(), 0);
}

#[test]
fn test_released_block_is_reused_first() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();

    let _a = mm.allocate("Rec", 1).unwrap();
    let b = mm.allocate("Rec", 1).unwrap();
    mm.release(b).unwrap();

    let again = mm.allocate("Rec", 1).unwrap();
    assert_eq!(again, b);
}

#[test]
fn test_release_then_allocate_returns_same_offset() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();

    let first = mm.allocate("Rec", 1).unwrap();
    mm.release(first).unwrap();
    assert_eq!(mm.pages_held(), 0);

    let second = mm.allocate("Rec", 1).unwrap();
    assert_eq!(
        second.as_ptr() as usize & (PAGE - 1),
        first.as_ptr() as usize & (PAGE - 1)
    );
}

#[test]
fn test_reuse_is_deterministic_across_managers() {
    let offsets = || {
        let mut mm = manager();
        mm.register("Rec", 48).unwrap();
        let ptrs: Vec<_> = (1..=6).map(|n| mm.allocate("Rec", n).unwrap()).collect();
        mm.release(ptrs[1]).unwrap();
        mm.release(ptrs[4]).unwrap();
        let next = mm.allocate("Rec", 2).unwrap();
        (next.as_ptr() as usize) & (PAGE - 1)
    };
    assert_eq!(offsets(), offsets());
}

#[test]
fn test_invalid_addresses_are_rejected() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();
    let ptr = mm.allocate("Rec", 2).unwrap();
    let before = mm.family_stats("Rec").unwrap();

    let inside = unsafe { NonNull::new_unchecked(ptr.as_ptr().add(8)) };
    assert_eq!(
        mm.release(inside),
        Err(MemoryError::InvalidAddress(inside.as_ptr() as usize))
    );

    let mut stack = [0u8; 16];
    let foreign = NonNull::new(stack.as_mut_ptr()).unwrap();
    assert!(matches!(mm.release(foreign), Err(MemoryError::InvalidAddress(_))));

    let page_header = unsafe { NonNull::new_unchecked(ptr.as_ptr().sub(40)) };
    assert!(matches!(mm.release(page_header), Err(MemoryError::InvalidAddress(_))));

    assert!(mm.is_valid(ptr));
    assert!(!mm.is_valid(inside));
    assert_eq!(mm.family_stats("Rec").unwrap(), before);
    mm.release(ptr).unwrap();
    assert!(!mm.is_valid(ptr));
}

#[test]
fn test_pointer_from_other_manager_is_rejected() {
    let mut first = manager();
    let mut second = manager();
    first.register("Rec", 64).unwrap();
    second.register("Rec", 64).unwrap();

    let ptr = first.allocate("Rec", 1).unwrap();
    assert!(matches!(second.release(ptr), Err(MemoryError::InvalidAddress(_))));
    first.release(ptr).unwrap();
}

#[test]
#[should_panic(expected = "Double free")]
fn test_double_free_is_fatal() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();
    let a = mm.allocate("Rec", 1).unwrap();
    let _b = mm.allocate("Rec", 1).unwrap();

    mm.release(a).unwrap();
    let _ = mm.release(a);
}

#[test]
#[should_panic(expected = "Double free")]
fn test_double_free_after_merge_is_fatal() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();
    let a = mm.allocate("Rec", 1).unwrap();
    let b = mm.allocate("Rec", 1).unwrap();
    let _c = mm.allocate("Rec", 1).unwrap();

    mm.release(b).unwrap();
    mm.release(a).unwrap();
    let _ = mm.release(b);
}

#[test]
fn test_shutdown_returns_every_page() {
    let mut mm = manager();
    mm.register("A", 64).unwrap();
    mm.register("B", 512).unwrap();

    for _ in 0..50 {
        mm.allocate("A", 1).unwrap();
    }
    for _ in 0..3 {
        mm.allocate("B", 7).unwrap();
    }
    let held = mm.pages_held();
    assert_eq!(held, 2 + 3);
    assert_eq!(mm.source_pages_outstanding(), held);
    assert_eq!(mm.shutdown(), held);
}
