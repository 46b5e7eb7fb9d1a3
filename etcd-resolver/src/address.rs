use crate::ServerRecord;

/// A server address together with its weight, as reported to a [`ClientConn`](crate::ClientConn).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    /// The network address, e.g. `10.0.0.1:9000`.
    pub addr: String,
    /// The weight the server registered with.
    pub weight: i64,
}

impl ResolvedAddress {
    /// Create a [`ResolvedAddress`] for `addr` with `weight`.
    pub fn new<A: ToString>(addr: A, weight: i64) -> Self {
        Self {
            addr: addr.to_string(),
            weight,
        }
    }
}

impl From<ServerRecord> for ResolvedAddress {
    fn from(record: ServerRecord) -> Self {
        Self {
            addr: record.addr,
            weight: record.weight,
        }
    }
}

/// The resolver's view of the live servers, deduplicated by address and kept in insertion order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct AddressSet {
    addresses: Vec<ResolvedAddress>,
}

impl AddressSet {
    pub(crate) fn contains(&self, addr: &str) -> bool {
        self.addresses.iter().any(|a| a.addr == addr)
    }

    /// Add `address` unless its network address is already present.
    ///
    /// An existing entry keeps its weight. Returns whether the set changed.
    pub(crate) fn insert(&mut self, address: ResolvedAddress) -> bool {
        if self.contains(&address.addr) {
            return false;
        }
        self.addresses.push(address);
        true
    }

    /// Remove the entry for `addr`. Returns whether the set changed.
    pub(crate) fn remove(&mut self, addr: &str) -> bool {
        let len = self.addresses.len();
        self.addresses.retain(|a| a.addr != addr);
        self.addresses.len() != len
    }

    /// Replace the whole set, dropping duplicate addresses from `addresses`.
    pub(crate) fn replace<I: IntoIterator<Item = ResolvedAddress>>(&mut self, addresses: I) {
        self.addresses.clear();
        for address in addresses {
            self.insert(address);
        }
    }

    pub(crate) fn to_vec(&self) -> Vec<ResolvedAddress> {
        self.addresses.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.addresses.len()
    }
}
