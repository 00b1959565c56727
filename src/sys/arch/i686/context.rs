//! Context — stack transplants between kernel stacks and into ring 3
//!
//! Every process owns an 8 KiB kernel stack. A saved context is the ESP
//! (and EBP) of a stack parked inside one of the functions below, with
//! the callee-saved registers pushed on it. Loading such a context and
//! popping them "returns" from that function a second time, on the
//! original stack.
//!
//! Semua fungsi di sini dipanggil tanpa kernel lock dipegang.
//!
//! cdecl: arguments on the stack, result in EAX. After the four pushes
//! the first argument sits at [esp + 20].

use super::gdt::{USER_CODE, USER_DATA};
use crate::sys::proc::pcb::KernelContext;

/// IF set, reserved bit 1 set
const USER_EFLAGS: u32 = 0x202;

/// Save this stack into `save` and iret into ring 3 at `entry`.
///
/// Returns when someone later calls `resume` on the saved context, with
/// the value passed there (the child's halt status).
#[unsafe(naked)]
pub unsafe extern "C" fn enter_user(save: *mut KernelContext, entry: u32, user_stack: u32) -> i32 {
    core::arch::naked_asm!(
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        "mov eax, [esp + 20]",   // save
        "mov edx, [esp + 24]",   // entry
        "mov esi, [esp + 28]",   // user_stack
        "mov [eax], esp",
        "mov [eax + 4], ebp",
        "jmp {to_user}",
        to_user = sym to_user,
    );
}

/// Optionally save this stack into `save` (null: the stack is dropped),
/// move to `kernel_stack` and iret into ring 3.
///
/// With a non-null `save` this returns once `switch` loads that context.
#[unsafe(naked)]
pub unsafe extern "C" fn launch(
    save: *mut KernelContext,
    kernel_stack: usize,
    entry: u32,
    user_stack: u32,
) {
    core::arch::naked_asm!(
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        "mov eax, [esp + 20]",   // save
        "mov ecx, [esp + 24]",   // kernel_stack
        "mov edx, [esp + 28]",   // entry
        "mov esi, [esp + 32]",   // user_stack
        "test eax, eax",
        "jz 2f",
        "mov [eax], esp",
        "mov [eax + 4], ebp",
        "2:",
        "mov esp, ecx",
        "jmp {to_user}",
        to_user = sym to_user,
    );
}

/// Save this stack into `save`, continue on the stack of `load`.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(save: *mut KernelContext, load_esp: usize, load_ebp: usize) {
    core::arch::naked_asm!(
        "push ebp",
        "push ebx",
        "push esi",
        "push edi",
        "mov eax, [esp + 20]",   // save
        "mov ecx, [esp + 24]",   // load_esp
        "mov edx, [esp + 28]",   // load_ebp
        "mov [eax], esp",
        "mov [eax + 4], ebp",
        "mov esp, ecx",
        "mov ebp, edx",
        "pop edi",
        "pop esi",
        "pop ebx",
        "pop ebp",
        "ret",
    );
}

/// Return from the `enter_user` that saved (`esp`, `ebp`), with `status`.
#[unsafe(naked)]
pub unsafe extern "C" fn resume(esp: usize, ebp: usize, status: i32) -> ! {
    core::arch::naked_asm!(
        "mov ecx, [esp + 4]",
        "mov edx, [esp + 8]",
        "mov eax, [esp + 12]",
        "mov esp, ecx",
        "mov ebp, edx",
        "pop edi",
        "pop esi",
        "pop ebx",
        "pop ebp",
        "ret",
    );
}

/// Tail of `enter_user` / `launch`: EDX = entry, ESI = user stack
#[unsafe(naked)]
unsafe extern "C" fn to_user() -> ! {
    core::arch::naked_asm!(
        "mov ax, {udata}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "push {udata}",          // SS
        "push esi",              // ESP
        "push {eflags}",         // EFLAGS
        "push {ucode}",          // CS
        "push edx",              // EIP
        "xor eax, eax",
        "xor ebx, ebx",
        "xor ecx, ecx",
        "xor edx, edx",
        "xor esi, esi",
        "xor edi, edi",
        "xor ebp, ebp",
        "iretd",
        udata  = const USER_DATA as u32,
        ucode  = const USER_CODE as u32,
        eflags = const USER_EFLAGS,
    );
}

/// Let interrupts in for one halt, then close them again
pub fn idle() {
    unsafe {
        core::arch::asm!("sti", "hlt", "cli");
    }
}
