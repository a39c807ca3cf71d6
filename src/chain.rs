//! Pointer-chain resolution inside the emulated memory space
//!
//! A pointer chain locates a dynamic structure's field from a stable base
//! address through a sequence of dependent dereferences. The guest program
//! can legitimately deallocate or relocate the structure between frames, so
//! chains are re-resolved on every access and never cached across ticks.
//!
//! Chains are immutable value objects: a resolved prefix can be copied and
//! extended with additional offsets without mutating the original, which is
//! how one camera structure yields several related-but-distinct field
//! addresses from a shared prefix.

use tracing::trace;

use crate::ipc::MemoryIpc;
use crate::{InjectorError, Result};

/// An ordered sequence of dependent dereferences from a base address.
///
/// Resolution reads one guest pointer per offset: the value read at the
/// current address plus the offset becomes the next address. The *last*
/// offset is added to the final dereferenced pointer to produce the terminal
/// address — the value location itself is never dereferenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerChain {
    base: u32,
    offsets: Vec<u32>,
}

impl PointerChain {
    /// Create a chain from a base address and at least one offset.
    pub fn new(base: u32, offsets: impl Into<Vec<u32>>) -> Result<Self> {
        let offsets = offsets.into();
        if offsets.is_empty() {
            return Err(InjectorError::config_error("pointer chain needs at least one offset"));
        }
        Ok(Self { base, offsets })
    }

    /// Branch a child chain by appending further offsets.
    ///
    /// The child shares no mutable state with its parent.
    pub fn extended(&self, more: &[u32]) -> Self {
        let mut offsets = self.offsets.clone();
        offsets.extend_from_slice(more);
        Self { base: self.base, offsets }
    }

    /// Base address this chain starts from.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// The hop offsets, in dereference order.
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Walk every hop from `base` and produce the terminal address.
    ///
    /// A null intermediate pointer or a failed IPC read yields an invalid
    /// result; the failure is signaled purely through validity so the caller
    /// can skip this tick's injection and retry on the next one. The terminal
    /// address of an invalid resolution is never stale — it is absent.
    pub async fn resolve(&self, ipc: &mut dyn MemoryIpc) -> ResolvedChain {
        let mut addr = self.base;
        for (hop, &offset) in self.offsets.iter().enumerate() {
            let ptr = match ipc.read_u32(addr).await {
                Ok(ptr) => ptr,
                Err(e) => {
                    trace!(hop, addr = format_args!("{addr:#x}"), error = %e, "chain hop read failed");
                    return ResolvedChain { address: None };
                }
            };
            if ptr == 0 {
                trace!(hop, addr = format_args!("{addr:#x}"), "chain hop hit null pointer");
                return ResolvedChain { address: None };
            }
            addr = ptr.wrapping_add(offset);
        }
        ResolvedChain { address: Some(addr) }
    }
}

/// Outcome of resolving a [`PointerChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedChain {
    address: Option<u32>,
}

impl ResolvedChain {
    /// Whether every hop resolved without a null pointer or IPC error.
    pub fn is_valid(&self) -> bool {
        self.address.is_some()
    }

    /// The terminal address, if valid. This is the value location; it is not
    /// itself dereferenced again.
    pub fn address(&self) -> Option<u32> {
        self.address
    }
}

/// True only if every supplied chain resolved all hops.
///
/// Callers must verify before trusting any address, every tick.
pub fn verify(chains: &[&ResolvedChain]) -> bool {
    chains.iter().all(|c| c.is_valid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockIpc;

    #[test]
    fn empty_offsets_refuse_construction() {
        let err = PointerChain::new(0x8000_0000, []).unwrap_err();
        assert!(matches!(err, InjectorError::Config { .. }));
    }

    #[test]
    fn extension_does_not_mutate_parent() {
        let parent = PointerChain::new(0x1000, [0x10, 0x20]).unwrap();
        let child = parent.extended(&[0x30]);
        assert_eq!(parent.offsets(), &[0x10, 0x20]);
        assert_eq!(child.offsets(), &[0x10, 0x20, 0x30]);
        assert_eq!(child.base(), parent.base());
    }

    #[tokio::test]
    async fn resolves_multi_hop_chain_against_memory_image() {
        // base 0x1000 -> 0x2000; (0x2000 + 0x10) -> 0x3000; terminal = 0x3000 + 0x8
        let mut ipc = MockIpc::new();
        ipc.poke_u32(0x1000, 0x2000);
        ipc.poke_u32(0x2010, 0x3000);

        let chain = PointerChain::new(0x1000, [0x10, 0x8]).unwrap();
        let resolved = chain.resolve(&mut ipc).await;

        assert!(resolved.is_valid());
        assert_eq!(resolved.address(), Some(0x3008));
        assert!(verify(&[&resolved]));
    }

    #[tokio::test]
    async fn single_offset_chain_reads_base_once() {
        let mut ipc = MockIpc::new();
        ipc.poke_u32(0x1000, 0x2000);

        let chain = PointerChain::new(0x1000, [0x44]).unwrap();
        let resolved = chain.resolve(&mut ipc).await;

        assert_eq!(resolved.address(), Some(0x2044));
        assert_eq!(ipc.read_count(), 1);
    }

    #[tokio::test]
    async fn null_intermediate_pointer_invalidates_chain() {
        let mut ipc = MockIpc::new();
        ipc.poke_u32(0x1000, 0x2000);
        ipc.poke_u32(0x2010, 0); // guest freed the structure

        let chain = PointerChain::new(0x1000, [0x10, 0x8]).unwrap();
        let resolved = chain.resolve(&mut ipc).await;

        assert!(!resolved.is_valid());
        assert_eq!(resolved.address(), None);
        assert!(!verify(&[&resolved]));
    }

    #[tokio::test]
    async fn read_error_invalidates_chain_without_escalating() {
        let mut ipc = MockIpc::new();
        ipc.poke_u32(0x1000, 0x2000);
        ipc.fail_reads();

        let chain = PointerChain::new(0x1000, [0x10]).unwrap();
        let resolved = chain.resolve(&mut ipc).await;
        assert!(!resolved.is_valid());

        // Transient by contract: the same chain resolves once reads recover.
        ipc.restore_reads();
        let resolved = chain.resolve(&mut ipc).await;
        assert_eq!(resolved.address(), Some(0x2010));
    }

    #[tokio::test]
    async fn verify_requires_every_chain_valid() {
        let mut ipc = MockIpc::new();
        ipc.poke_u32(0x1000, 0x2000);

        let good = PointerChain::new(0x1000, [0x4]).unwrap().resolve(&mut ipc).await;
        let bad = PointerChain::new(0x9000, [0x4]).unwrap().resolve(&mut ipc).await;

        assert!(verify(&[&good]));
        assert!(!verify(&[&good, &bad]));
    }
}
