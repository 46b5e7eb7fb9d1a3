//! Translates etcd change notifications into address set mutations.

use crate::address::{AddressSet, ResolvedAddress};
use crate::{decode_addr_from_key, decode_record, WatchEvent};

/// Apply a batch of watch events to `addresses`, in delivery order.
///
/// Events that cannot be decoded are skipped. Returns whether the set changed,
/// so that the caller reports the new set once per batch.
pub(crate) fn apply_events<I>(addresses: &mut AddressSet, events: I) -> bool
where
    I: IntoIterator<Item = WatchEvent>,
{
    let mut dirty = false;
    for event in events {
        dirty |= apply_event(addresses, event);
    }
    dirty
}

fn apply_event(addresses: &mut AddressSet, event: WatchEvent) -> bool {
    match event {
        WatchEvent::Put { key, value } => match decode_record(&value) {
            Ok(record) => addresses.insert(ResolvedAddress::from(record)),
            Err(err) => {
                tracing::warn!(%key, error = %err, "skipping put event");
                false
            }
        },
        WatchEvent::Delete { key } => match decode_addr_from_key(&key) {
            Ok(addr) => addresses.remove(&addr),
            Err(err) => {
                tracing::warn!(%key, error = %err, "skipping delete event");
                false
            }
        },
    }
}
