/*!
 * Typed Memory Manager - Demo Entry Point
 *
 * Registers two record families, churns through a few allocations and
 * prints each family's usage as JSON.
 */

use anyhow::{Context, Result};
use std::ptr::NonNull;
use tracing::info;
use typed_mm::{init_tracing, MemoryManager, MmConfig};

#[allow(dead_code)]
#[repr(C)]
struct Employee {
    name: [u8; 32],
    emp_id: u32,
}

#[allow(dead_code)]
#[repr(C)]
struct Student {
    name: [u8; 32],
    rollno: u32,
    marks_phys: u32,
    marks_chem: u32,
    marks_maths: u32,
    next: Option<NonNull<Student>>,
}

fn print_stats(mm: &MemoryManager) -> Result<()> {
    for name in mm.families() {
        let stats = mm.family_stats(name)?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();

    let config = MmConfig::from_env().context("reading TYPED_MM_* configuration")?;
    let mut mm = MemoryManager::init(&config).context("initializing memory manager")?;
    info!(page_size = mm.page_size(), "Demo starting");

    mm.register_type::<Employee>()?;
    mm.register_type::<Student>()?;

    let mut students = Vec::new();
    for rollno in 0..3u32 {
        let student = mm.allocate_type::<Student>(1)?;
        // SAFETY: freshly allocated, zeroed and aligned for `Student`
        unsafe { (*student.as_ptr()).rollno = rollno };
        students.push(student);
    }
    let team = mm.allocate_type::<Employee>(4)?;

    println!("== after allocation ==");
    print_stats(&mm)?;

    mm.release_type(students.remove(1))?;
    mm.release_type(team)?;

    println!("== after release ==");
    print_stats(&mm)?;

    for student in students {
        mm.release_type(student)?;
    }
    let released = mm.shutdown();
    info!(released, "Demo finished");
    Ok(())
}
