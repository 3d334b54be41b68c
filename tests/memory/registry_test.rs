/*!
 * Registry Tests
 * Family registration, lookup and validation
 */

use crate::common::{manager, PAGE};
use pretty_assertions::assert_eq;
use typed_mm::MemoryError;

#[test]
fn test_register_and_lookup() {
    let mut mm = manager();
    let emp = mm.register("emp_t", 36).unwrap();
    let student = mm.register("student_t", 56).unwrap();

    assert_ne!(emp, student);
    assert_eq!(mm.lookup("emp_t").unwrap(), emp);
    assert_eq!(mm.record_size(student), Some(56));
    assert_eq!(mm.family_name(emp), Some("emp_t"));
    assert_eq!(mm.families().collect::<Vec<_>>(), vec!["emp_t", "student_t"]);
}

#[test]
fn test_duplicate_registration_leaves_family_untouched() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();
    let ptr = mm.allocate("Rec", 2).unwrap();
    let before = mm.family_stats("Rec").unwrap();

    assert_eq!(
        mm.register("Rec", 64),
        Err(MemoryError::DuplicateFamily("Rec".into()))
    );
    assert_eq!(
        mm.register("Rec", 128),
        Err(MemoryError::DuplicateFamily("Rec".into()))
    );

    assert_eq!(mm.family_stats("Rec").unwrap(), before);
    assert_eq!(mm.record_size(mm.lookup("Rec").unwrap()), Some(64));
    mm.release(ptr).unwrap();
}

#[test]
fn test_record_size_bounds() {
    let mut mm = manager();
    let max = PAGE - 64;
    assert_eq!(mm.max_allocatable(), max);

    assert_eq!(
        mm.register("Huge", max + 1),
        Err(MemoryError::RecordTooLarge { size: max + 1, max })
    );
    assert_eq!(mm.register("Empty", 0), Err(MemoryError::ZeroSizedRecord));
    assert!(mm.register("Fits", max).is_ok());

    // Failed registrations never claim the name
    assert!(mm.register("Huge", 8).is_ok());
}

#[test]
fn test_family_name_length() {
    let mut mm = manager();
    let longest = "n".repeat(32);
    let too_long = "n".repeat(33);

    assert!(mm.register(&longest, 8).is_ok());
    assert_eq!(
        mm.register(&too_long, 8),
        Err(MemoryError::InvalidFamilyName(too_long.clone()))
    );
    assert_eq!(
        mm.register("", 8),
        Err(MemoryError::InvalidFamilyName(String::new()))
    );
}

#[test]
fn test_unknown_family() {
    let mut mm = manager();
    assert_eq!(
        mm.allocate("ghost", 1),
        Err(MemoryError::NotFound("ghost".into()))
    );
    assert!(matches!(mm.family_stats("ghost"), Err(MemoryError::NotFound(_))));
    assert!(matches!(mm.audit("ghost"), Err(MemoryError::NotFound(_))));
}

#[test]
fn test_fresh_family_holds_no_pages() {
    let mut mm = manager();
    mm.register("Rec", 64).unwrap();

    let stats = mm.family_stats("Rec").unwrap();
    assert_eq!(stats.pages, 0);
    assert_eq!(stats.largest_free, None);
    assert_eq!(mm.pages_held(), 0);
    assert!(mm.blocks("Rec").unwrap().is_empty());
}
