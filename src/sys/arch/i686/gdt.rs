//! GDT — flat segments plus the TSS
//!
//! Layout (selector):
//!   0x00 null
//!   0x08 kernel code   0x10 kernel data
//!   0x1B user code     0x23 user data   (RPL 3)
//!   0x28 TSS
//!
//! Only `esp0`/`ss0` of the TSS are used: the stack the CPU switches to on
//! a ring 3 → ring 0 transition. The scheduler points it at the kernel
//! stack of the process about to run.

use core::mem::size_of;
use lazy_static::lazy_static;
use spin::Mutex;
use x86::bits32::task::TaskStateSegment;
use x86::dtables::{lgdt, DescriptorTablePointer};
use x86::segmentation::{
    load_ds, load_es, load_fs, load_gs, load_ss, BuildDescriptor, CodeSegmentType,
    DataSegmentType, Descriptor, DescriptorBuilder, GateDescriptorBuilder,
    SegmentDescriptorBuilder, SegmentSelector,
};
use x86::task::load_tr;
use x86::Ring;

/// Raw selector values, for the asm in `context` and `idt`
pub const KERNEL_CODE: u16 = 0x08;
pub const KERNEL_DATA: u16 = 0x10;
pub const USER_CODE:   u16 = 0x1B;
pub const USER_DATA:   u16 = 0x23;

pub const KERNEL_CODE_SEL: SegmentSelector = SegmentSelector::new(1, Ring::Ring0);
pub const KERNEL_DATA_SEL: SegmentSelector = SegmentSelector::new(2, Ring::Ring0);
pub const TSS_SEL:         SegmentSelector = SegmentSelector::new(5, Ring::Ring0);

lazy_static! {
    /// Task State Segment — one CPU, one TSS
    static ref TSS: Mutex<TaskStateSegment> = Mutex::new(TaskStateSegment::new());
}

#[repr(C, align(8))]
pub struct GlobalDescriptorTable {
    null:        Descriptor,
    kernel_code: Descriptor,
    kernel_data: Descriptor,
    user_code:   Descriptor,
    user_data:   Descriptor,
    tss_desc:    Descriptor,
}

impl GlobalDescriptorTable {
    fn new() -> Self {
        let kernel_code =
            DescriptorBuilder::code_descriptor(0, 0xFFFFF, CodeSegmentType::ExecuteRead)
                .limit_granularity_4kb()
                .dpl(Ring::Ring0)
                .present()
                .db()
                .finish();

        let kernel_data =
            DescriptorBuilder::data_descriptor(0, 0xFFFFF, DataSegmentType::ReadWrite)
                .limit_granularity_4kb()
                .dpl(Ring::Ring0)
                .present()
                .db()
                .finish();

        let user_code =
            DescriptorBuilder::code_descriptor(0, 0xFFFFF, CodeSegmentType::ExecuteRead)
                .limit_granularity_4kb()
                .dpl(Ring::Ring3)
                .present()
                .db()
                .finish();

        let user_data =
            DescriptorBuilder::data_descriptor(0, 0xFFFFF, DataSegmentType::ReadWrite)
                .limit_granularity_4kb()
                .dpl(Ring::Ring3)
                .present()
                .db()
                .finish();

        let mut tss_desc =
            <DescriptorBuilder as GateDescriptorBuilder<u32>>::tss_descriptor(0, 0, true)
                .present()
                .finish();
        let tss_addr = &*TSS.lock() as *const TaskStateSegment as u32;
        tss_desc.set_base_limit(tss_addr, size_of::<TaskStateSegment>() as u32 - 1);

        Self {
            null: Descriptor::NULL,
            kernel_code,
            kernel_data,
            user_code,
            user_data,
            tss_desc,
        }
    }

    unsafe fn load(&self) {
        let ptr = DescriptorTablePointer::<Self>::new(self);
        unsafe {
            lgdt(&ptr);
        }
    }
}

lazy_static! {
    static ref GDT: GlobalDescriptorTable = GlobalDescriptorTable::new();
}

/// Load the GDT, reload every segment register and the task register
pub fn init() {
    {
        let mut tss = TSS.lock();
        tss.ss0 = KERNEL_DATA;
        tss.iobp_offset = size_of::<TaskStateSegment>() as u16;
    }

    unsafe {
        GDT.load();

        load_ss(KERNEL_DATA_SEL);
        load_ds(KERNEL_DATA_SEL);
        load_es(KERNEL_DATA_SEL);
        load_fs(KERNEL_DATA_SEL);
        load_gs(KERNEL_DATA_SEL);
        reload_cs();

        load_tr(TSS_SEL);
    }
}

/// Far return into the new kernel code segment
unsafe fn reload_cs() {
    unsafe {
        core::arch::asm!(
            "push {sel}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            sel = const KERNEL_CODE as u32,
            tmp = lateout(reg) _,
        );
    }
}

/// Ring-0 stack for the next trap out of user mode
pub fn set_esp0(top: usize) {
    TSS.lock().esp0 = top as u32;
}
