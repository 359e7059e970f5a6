//! Cryptographic plane of the Confidant mediator: payload content addressing
//! and the enclave boundary. The mediator treats the enclave as an oracle; a
//! working in-process implementation is provided for embedded use and tests.

pub mod digest;
pub mod enclave;
pub mod memory;

pub use digest::payload_hash;
pub use enclave::{Enclave, EnclaveError, RawCiphertext};
pub use memory::MemoryEnclave;
