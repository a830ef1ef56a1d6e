//! Architecture-specific glue.
//!
//! This crate targets IA-32 (32-bit) protected mode exclusively — there is
//! no multi-architecture abstraction layer here, unlike a multi-arch kernel
//! split into `arch::{x86_64, aarch64, riscv64}`. The single `x86` module
//! covers the whole of it; its submodules separate pure, host-testable
//! encode/decode and arithmetic from the `target_os = "none"`-gated hardware
//! glue (`lgdt`, port I/O, `rdtsc`, ...), per the same convention the rest
//! of this crate uses to stay testable on the host target.

pub mod x86;
pub use x86::*;
