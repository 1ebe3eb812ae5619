//! Property-based tests for connection slots and listen configuration.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use proptest::prelude::*;
use tidewire_server::{ConfigError, ConnectionSlots, ServerConfig};

#[derive(Debug, Clone)]
enum SlotOp {
    Acquire,
    Release(usize),
}

fn slot_op() -> impl Strategy<Value = SlotOp> {
    prop_oneof![3 => Just(SlotOp::Acquire), 2 => any::<usize>().prop_map(SlotOp::Release)]
}

proptest! {
    /// Slots in use always equal the guards alive and never pass the ceiling.
    #[test]
    fn prop_slots_track_live_guards(
        max in 1usize..8,
        ops in prop::collection::vec(slot_op(), 0..64),
    ) {
        let slots = ConnectionSlots::new(max);
        let mut held = Vec::new();

        for op in ops {
            match op {
                SlotOp::Acquire => match slots.try_acquire() {
                    Some(guard) => held.push(guard),
                    None => prop_assert_eq!(held.len(), max),
                },
                SlotOp::Release(i) => {
                    if !held.is_empty() {
                        held.swap_remove(i % held.len());
                    }
                },
            }
            prop_assert_eq!(slots.in_use(), held.len());
            prop_assert!(slots.in_use() <= max);
        }

        held.clear();
        prop_assert_eq!(slots.in_use(), 0);
    }

    /// Any literal IPv4 address and port resolves to exactly that socket address.
    #[test]
    fn prop_ipv4_listen_address_resolves(octets in any::<[u8; 4]>(), port in any::<u16>()) {
        let ip = Ipv4Addr::from(octets);
        let config = ServerConfig::listen_on(ip.to_string(), port);
        prop_assert_eq!(config.bind_addr().unwrap(), SocketAddr::new(IpAddr::V4(ip), port));
    }

    #[test]
    fn prop_ipv6_listen_address_resolves(segments in any::<[u16; 8]>(), port in any::<u16>()) {
        let ip = Ipv6Addr::from(segments);
        let config = ServerConfig::listen_on(ip.to_string(), port);
        prop_assert_eq!(config.bind_addr().unwrap(), SocketAddr::new(IpAddr::V6(ip), port));
    }

    /// Host names are not resolved; only literal addresses are accepted.
    #[test]
    fn prop_non_literal_address_rejected(host in "[a-z]{1,12}(\\.[a-z]{2,6})?") {
        let config = ServerConfig::listen_on(host, 80);
        let is_invalid = matches!(config.bind_addr(), Err(ConfigError::InvalidAddress { .. }));
        prop_assert!(is_invalid);
    }
}
