// Architecture support. The kernel proper targets riscv32; the host module
// provides inert stand-ins so the pure-logic modules unit-test on the build
// machine.

#[cfg(target_arch = "riscv32")]
pub mod riscv32;

#[cfg(target_arch = "riscv32")]
pub use riscv32::*;

#[cfg(not(target_arch = "riscv32"))]
pub mod host;

#[cfg(not(target_arch = "riscv32"))]
pub use host::*;
