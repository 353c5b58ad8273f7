//! Mapping networks onto the interfaces the resolver daemon binds to.

use crate::info::NetId;

/// Finds the kernel interface carrying a network.
///
/// Consulted on the daemon path whenever a request pins a network.
pub trait InterfaceLookup: Send + Sync {
    /// Interface index of `network`, or `None` when the network is gone or
    /// has no usable interface.
    fn interface_index(&self, network: NetId) -> Option<u32>;
}

/// Lookup that knows no networks, so network-pinned daemon requests fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInterfaces;

impl InterfaceLookup for NoInterfaces {
    fn interface_index(&self, _network: NetId) -> Option<u32> {
        None
    }
}
