//! Download interface discovery.
//!
//! The BootROM exposes a vendor-class interface whose alternate setting has
//! exactly two endpoints, one IN and one OUT. Selection runs over plain
//! descriptor summaries so it is testable without a device.

use std::fmt;

use crate::protocol::constants::{DOWNLOAD_INTERFACE_ENDPOINTS, VENDOR_INTERFACE_CLASS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDirection {
    In,
    Out,
}

/// Summary of one alternate setting as found in the descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSettingCandidate {
    pub configuration: u8,
    pub interface: u8,
    pub alt_setting: u8,
    pub class: u8,
    /// (endpoint address, direction)
    pub endpoints: Vec<(u8, EndpointDirection)>,
}

/// Resources identifying the claimed download interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceSelection {
    pub configuration: u8,
    pub interface: u8,
    pub alt_setting: u8,
    pub in_endpoint: u8,
    pub out_endpoint: u8,
}

impl fmt::Display for InterfaceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "config {} iface {} alt {} in 0x{:02X} out 0x{:02X}",
            self.configuration, self.interface, self.alt_setting, self.in_endpoint, self.out_endpoint
        )
    }
}

/// Pick the first vendor-class alternate setting with one IN and one OUT
/// endpoint.
pub fn select_interface<'a, I>(candidates: I) -> Option<InterfaceSelection>
where
    I: IntoIterator<Item = &'a AltSettingCandidate>,
{
    candidates.into_iter().find_map(|alt| {
        if alt.class != VENDOR_INTERFACE_CLASS
            || alt.endpoints.len() != DOWNLOAD_INTERFACE_ENDPOINTS
        {
            return None;
        }
        let find = |dir| {
            alt.endpoints
                .iter()
                .find(|(_, d)| *d == dir)
                .map(|(addr, _)| *addr)
        };
        Some(InterfaceSelection {
            configuration: alt.configuration,
            interface: alt.interface,
            alt_setting: alt.alt_setting,
            in_endpoint: find(EndpointDirection::In)?,
            out_endpoint: find(EndpointDirection::Out)?,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use EndpointDirection::{In, Out};

    fn candidate(
        interface: u8,
        alt_setting: u8,
        class: u8,
        endpoints: &[(u8, EndpointDirection)],
    ) -> AltSettingCandidate {
        AltSettingCandidate {
            configuration: 1,
            interface,
            alt_setting,
            class,
            endpoints: endpoints.to_vec(),
        }
    }

    #[test]
    fn test_selects_vendor_pair() {
        let candidates = [
            candidate(0, 0, 0x02, &[(0x83, In)]),
            candidate(1, 0, 0x0A, &[(0x81, In), (0x01, Out)]),
            candidate(2, 0, 0xFF, &[(0x85, In), (0x06, Out)]),
        ];
        let sel = select_interface(&candidates).unwrap();
        assert_eq!(sel.interface, 2);
        assert_eq!(sel.in_endpoint, 0x85);
        assert_eq!(sel.out_endpoint, 0x06);
    }

    #[test]
    fn test_requires_exactly_two_endpoints() {
        let candidates = [
            candidate(0, 0, 0xFF, &[(0x81, In), (0x01, Out), (0x82, In)]),
            candidate(0, 1, 0xFF, &[(0x81, In), (0x01, Out)]),
        ];
        let sel = select_interface(&candidates).unwrap();
        assert_eq!(sel.alt_setting, 1);
    }

    #[test]
    fn test_requires_both_directions() {
        let candidates = [candidate(0, 0, 0xFF, &[(0x81, In), (0x82, In)])];
        assert_eq!(select_interface(&candidates), None);
    }

    #[test]
    fn test_first_match_wins() {
        let candidates = [
            candidate(0, 0, 0xFF, &[(0x81, In), (0x01, Out)]),
            candidate(1, 0, 0xFF, &[(0x82, In), (0x02, Out)]),
        ];
        assert_eq!(select_interface(&candidates).unwrap().interface, 0);
    }
}
