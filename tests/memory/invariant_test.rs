/*!
 * Invariant Tests
 * Random allocate/release sequences checked against the structural audit
 */

use crate::common::{bytes, fill, manager, PAGE};
use proptest::prelude::*;
use std::ptr::NonNull;
use typed_mm::MemoryManager;

const FAMILIES: [(&str, usize); 3] = [("Small", 24), ("Medium", 64), ("Large", 400)];

#[derive(Debug, Clone)]
enum Op {
    Allocate { family: usize, units: usize },
    Release { pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..FAMILIES.len(), 1usize..=9).prop_map(|(family, units)| Op::Allocate { family, units }),
        2 => any::<usize>().prop_map(|pick| Op::Release { pick }),
    ]
}

struct Live {
    ptr: NonNull<u8>,
    len: usize,
    tag: u8,
}

/// Every family's blocks must account for exactly the capacity of its pages
fn check_accounting(mm: &MemoryManager) {
    let capacity = PAGE - 32;
    for (name, _) in FAMILIES {
        let stats = mm.family_stats(name).unwrap();
        let blocks = stats.allocated_blocks + stats.free_blocks;
        assert_eq!(
            stats.allocated_bytes + stats.free_bytes + blocks * 32,
            stats.pages * capacity,
            "byte accounting broken for {name}"
        );
        if stats.pages == 0 {
            assert_eq!(blocks, 0);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_sequences_keep_invariants(ops in prop::collection::vec(op(), 1..200)) {
        let mut mm = manager();
        for (name, size) in FAMILIES {
            mm.register(name, size).unwrap();
        }

        let mut live: Vec<Live> = Vec::new();
        let mut next_tag = 1u8;

        for op in ops {
            match op {
                Op::Allocate { family, units } => {
                    let (name, size) = FAMILIES[family];
                    match mm.allocate(name, units) {
                        Ok(ptr) => {
                            let len = size * units;
                            prop_assert!(mm.block_size(ptr).unwrap() >= len);
                            prop_assert!(bytes(ptr, len).iter().all(|&b| b == 0));
                            fill(ptr, len, next_tag);
                            live.push(Live { ptr, len, tag: next_tag });
                            next_tag = next_tag.wrapping_add(1).max(1);
                        }
                        Err(err) => {
                            // Only oversize requests may fail on an unbounded heap source
                            prop_assert!(size * units > mm.max_allocatable(), "{err}");
                        }
                    }
                }
                Op::Release { pick } => {
                    if !live.is_empty() {
                        let gone = live.swap_remove(pick % live.len());
                        mm.release(gone.ptr).unwrap();
                    }
                }
            }

            mm.audit_all().unwrap();
            check_accounting(&mm);
        }

        // No allocation was overwritten by another
        for entry in &live {
            prop_assert!(bytes(entry.ptr, entry.len).iter().all(|&b| b == entry.tag));
        }
        let allocated: usize = FAMILIES
            .iter()
            .map(|(name, _)| mm.family_stats(name).unwrap().allocated_blocks)
            .sum();
        prop_assert_eq!(allocated, live.len());

        for entry in live {
            mm.release(entry.ptr).unwrap();
        }
        prop_assert_eq!(mm.pages_held(), 0);
        prop_assert_eq!(mm.source_pages_outstanding(), 0);
    }
}

#[test]
fn largest_free_matches_block_listing() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();
    let ptrs: Vec<_> = (1..=8).map(|n| mm.allocate("Rec", n).unwrap()).collect();
    for ptr in ptrs.iter().step_by(2) {
        mm.release(*ptr).unwrap();
    }

    let largest = mm
        .blocks("Rec")
        .unwrap()
        .into_iter()
        .filter(|b| b.is_free)
        .map(|b| b.size)
        .max();
    assert_eq!(mm.family_stats("Rec").unwrap().largest_free, largest);
    check_accounting_single(&mm);
}

fn check_accounting_single(mm: &MemoryManager) {
    let stats = mm.family_stats("Rec").unwrap();
    let blocks = mm.blocks("Rec").unwrap();
    assert_eq!(blocks.len(), stats.allocated_blocks + stats.free_blocks);
    assert_eq!(
        blocks.iter().map(|b| b.size + 32).sum::<usize>(),
        stats.pages * (PAGE - 32)
    );
}
