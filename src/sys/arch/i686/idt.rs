//! IDT — exception, IRQ and `int 0x80` entry
//!
//! Each vector gets a tiny naked stub that pushes a dummy error code (when
//! the CPU does not push one) and the vector number, then jumps to
//! `trap_entry`. That one saves the general purpose and segment registers
//! into a `TrapFrame` and calls `trap_dispatch` with a pointer to it.
//!
//! Every gate is an interrupt gate: handlers run with IF clear.

use super::boot::kernel;
use super::context;
use super::gdt::{self, KERNEL_DATA};
use super::{clk, pic};
use crate::sys::proc::pcb::Saved;
use crate::sys::proc::process::{exception_name, Halted};
use crate::sys::proc::sched::TickAction;
use crate::sys::syscall::{number, Outcome};

use spin::Once;
use x86::dtables::{lidt, DescriptorTablePointer};
use x86::io::inb;
use x86::segmentation::{BuildDescriptor, Descriptor, DescriptorBuilder, GateDescriptorBuilder};
use x86::Ring;

const IDT_ENTRIES: usize = 256;
/// Vectors 0-19 are the architecturally defined exceptions we handle
const EXCEPTIONS: u8 = 20;

const KEYBOARD_IRQ: u8 = 1;
const KEYBOARD_DATA: u16 = 0x60;

/// Register state at trap time, lowest address first
#[repr(C)]
#[derive(Debug)]
pub struct TrapFrame {
    pub gs:  u32,
    pub fs:  u32,
    pub es:  u32,
    pub ds:  u32,
    // pushad
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    _esp:    u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    // stub
    pub vector: u32,
    pub error:  u32,
    // CPU
    pub eip:    u32,
    pub cs:     u32,
    pub eflags: u32,
}

impl TrapFrame {
    fn from_user(&self) -> bool {
        self.cs & 3 == 3
    }
}

#[repr(C, align(8))]
struct InterruptDescriptorTable {
    entries: [Descriptor; IDT_ENTRIES],
}

impl InterruptDescriptorTable {
    fn new() -> Self {
        let mut idt = Self { entries: [Descriptor::NULL; IDT_ENTRIES] };

        for (vector, stub) in EXCEPTION_STUBS.iter().enumerate() {
            idt.set_gate(vector as u8, Ring::Ring0, *stub as usize);
        }
        idt.set_gate(pic::irq_vector(clk::TIMER_IRQ), Ring::Ring0, irq_timer as usize);
        idt.set_gate(pic::irq_vector(KEYBOARD_IRQ), Ring::Ring0, irq_keyboard as usize);
        idt.set_gate(pic::irq_vector(clk::RTC_IRQ), Ring::Ring0, irq_rtc as usize);
        idt.set_gate(number::VECTOR, Ring::Ring3, syscall_stub as usize);
        idt
    }

    /// `dpl` is the lowest ring allowed to raise the vector with `int`
    fn set_gate(&mut self, vector: u8, dpl: Ring, handler: usize) {
        self.entries[vector as usize] =
            <DescriptorBuilder as GateDescriptorBuilder<u32>>::interrupt_descriptor(
                gdt::KERNEL_CODE_SEL,
                handler as u32,
            )
            .present()
            .dpl(dpl)
            .finish();
    }

    unsafe fn load(&'static self) {
        let ptr = DescriptorTablePointer::<Self>::new(self);
        unsafe {
            lidt(&ptr);
        }
    }
}

static IDT: Once<InterruptDescriptorTable> = Once::new();

pub fn init() {
    let idt = IDT.call_once(InterruptDescriptorTable::new);
    unsafe {
        idt.load();
    }
    pic::unmask_irq(KEYBOARD_IRQ);
}

// ---------------------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------------------

macro_rules! stub {
    ($name:ident, $vector:expr) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            core::arch::naked_asm!(
                "push 0",
                "push {vector}",
                "jmp {entry}",
                vector = const $vector,
                entry = sym trap_entry,
            );
        }
    };
    ($name:ident, $vector:expr, error_code) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            core::arch::naked_asm!(
                "push {vector}",
                "jmp {entry}",
                vector = const $vector,
                entry = sym trap_entry,
            );
        }
    };
}

stub!(divide_error, 0);
stub!(debug, 1);
stub!(nmi, 2);
stub!(breakpoint, 3);
stub!(overflow, 4);
stub!(bound_range, 5);
stub!(invalid_opcode, 6);
stub!(device_not_available, 7);
stub!(double_fault, 8, error_code);
stub!(coprocessor_overrun, 9);
stub!(invalid_tss, 10, error_code);
stub!(segment_not_present, 11, error_code);
stub!(stack_fault, 12, error_code);
stub!(general_protection, 13, error_code);
stub!(page_fault, 14, error_code);
stub!(reserved_15, 15);
stub!(x87_fpu, 16);
stub!(alignment_check, 17, error_code);
stub!(machine_check, 18);
stub!(simd_fp, 19);

stub!(irq_timer, 0x20);
stub!(irq_keyboard, 0x21);
stub!(irq_rtc, 0x28);
stub!(syscall_stub, 0x80);

static EXCEPTION_STUBS: [unsafe extern "C" fn(); EXCEPTIONS as usize] = [
    divide_error, debug, nmi, breakpoint, overflow, bound_range, invalid_opcode,
    device_not_available, double_fault, coprocessor_overrun, invalid_tss,
    segment_not_present, stack_fault, general_protection, page_fault, reserved_15,
    x87_fpu, alignment_check, machine_check, simd_fp,
];

#[unsafe(naked)]
unsafe extern "C" fn trap_entry() {
    core::arch::naked_asm!(
        "pushad",
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "mov ax, {kdata}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "push esp",              // &mut TrapFrame
        "call {dispatch}",
        "add esp, 4",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "popad",
        "add esp, 8",            // vector, error code
        "iretd",
        kdata = const KERNEL_DATA as u32,
        dispatch = sym trap_dispatch,
    );
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

extern "C" fn trap_dispatch(frame: &mut TrapFrame) {
    match frame.vector {
        v if v < EXCEPTIONS as u32 => on_exception(frame),
        0x20 => on_timer(),
        0x21 => on_keyboard(),
        0x28 => on_rtc(),
        0x80 => on_syscall(frame),
        v => kwarn!("idt: stray vector {:#x}", v),
    }
}

fn on_exception(frame: &mut TrapFrame) {
    let vector = frame.vector as u8;
    if !frame.from_user() {
        let cr2 = unsafe { x86::controlregs::cr2() };
        panic!(
            "{} in kernel at eip {:#010x} (error {:#x}, cr2 {:#010x})",
            exception_name(vector), frame.eip, frame.error, cr2
        );
    }

    let halted = kernel().lock().fault(vector);
    match halted {
        Some(halted) => finish_halt(halted),
        None => panic!("{} from user mode with no process", exception_name(vector)),
    }
}

fn on_timer() {
    let action = kernel().lock().tick();
    // the switch below may not come back for a while
    pic::send_eoi(clk::TIMER_IRQ);

    match action {
        TickAction::Bootstrap { save, launch } => {
            let save = match save {
                Some(pid) => kernel().lock().context_ptr(pid, Saved::Sched),
                None => core::ptr::null_mut(),
            };
            unsafe {
                context::launch(save, launch.kernel_stack, launch.entry, launch.user_stack);
            }
        }
        TickAction::Switch { from, to } => {
            let (save, load) = {
                let mut k = kernel().lock();
                (k.context_ptr(from, Saved::Sched), k.saved_context(to, Saved::Sched))
            };
            unsafe {
                context::switch(save, load.esp, load.ebp);
            }
        }
    }
}

fn on_keyboard() {
    let scancode = unsafe { inb(KEYBOARD_DATA) };
    kernel().lock().on_scancode(scancode);
    pic::send_eoi(KEYBOARD_IRQ);
}

fn on_rtc() {
    clk::rtc_ack();
    kernel().lock().on_rtc_tick();
    pic::send_eoi(clk::RTC_IRQ);
}

fn on_syscall(frame: &mut TrapFrame) {
    loop {
        let outcome = kernel().lock().syscall(frame.eax, frame.ebx, frame.ecx, frame.edx);
        match outcome {
            Outcome::Return(value) => {
                frame.eax = value as u32;
                return;
            }
            Outcome::Launch { caller, launch } => {
                let save = kernel().lock().context_ptr(caller, Saved::Exec);
                let status = unsafe { context::enter_user(save, launch.entry, launch.user_stack) };
                frame.eax = status as u32;
                return;
            }
            Outcome::Resume { status, context: saved } => unsafe {
                context::resume(saved.esp, saved.ebp, status)
            },
            Outcome::Respawn(launch) => finish_halt(Halted::Respawn(launch)),
            Outcome::Pending(_) => context::idle(),
        }
    }
}

/// Leave a halted process for good
fn finish_halt(halted: Halted) -> ! {
    match halted {
        Halted::Resume { status, context: saved, .. } => unsafe {
            context::resume(saved.esp, saved.ebp, status)
        },
        Halted::Respawn(launch) => unsafe {
            context::launch(core::ptr::null_mut(), launch.kernel_stack, launch.entry, launch.user_stack);
            unreachable!("launch without a save slot does not return")
        },
    }
}
