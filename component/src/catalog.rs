// Licensed under the Apache-2.0 license

use crate::version::VersionReader;
use std::fmt;

/// I2C bus shared by the CPLDs.
pub const CPLD_I2C_BUS: u32 = 600;
pub const SYSTEM_CPLD_ADDR: u8 = 0x38;
pub const SECONDARY_CPLD1_ADDR: u8 = 0x30;
pub const SECONDARY_CPLD2_ADDR: u8 = 0x31;

/// The fixed set of firmware components on the Z9664F, in catalog order.
///
/// The catalog index (see [`ComponentKind::from_index`]) is the only way the
/// host addresses a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Bios,
    Fpga,
    Bmc,
    SystemCpld,
    SecondaryCpld1,
    SecondaryCpld2,
    Pcie,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 7] = [
        ComponentKind::Bios,
        ComponentKind::Fpga,
        ComponentKind::Bmc,
        ComponentKind::SystemCpld,
        ComponentKind::SecondaryCpld1,
        ComponentKind::SecondaryCpld2,
        ComponentKind::Pcie,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Looks up a component by its exact display name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Display name, also the key of the component in an image's version manifest.
    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Bios => "BIOS",
            ComponentKind::Fpga => "FPGA",
            ComponentKind::Bmc => "BMC",
            ComponentKind::SystemCpld => "System CPLD",
            ComponentKind::SecondaryCpld1 => "Secondary CPLD 1",
            ComponentKind::SecondaryCpld2 => "Secondary CPLD 2",
            ComponentKind::Pcie => "PCIe",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ComponentKind::Bios => "Performs initialization of hardware components during booting",
            ComponentKind::Fpga => "Used for managing the system LEDs",
            ComponentKind::Bmc => {
                "Platform management controller for on-board temperature \
                 monitoring, in-chassis power, Fan and LED control"
            }
            ComponentKind::SystemCpld => "Used for managing the CPU power sequence and CPU states",
            ComponentKind::SecondaryCpld1 => {
                "Used for managing QSFP28 port transceivers (QSFP_DD 1-32)"
            }
            ComponentKind::SecondaryCpld2 => {
                "Used for managing QSFP28 port transceivers (QSFP_DD 33-64)"
            }
            ComponentKind::Pcie => "ASIC PCIe firmware",
        }
    }

    pub fn reader(&self) -> VersionReader {
        match self {
            ComponentKind::Bios => VersionReader::Bios,
            ComponentKind::Fpga => VersionReader::Fpga,
            ComponentKind::Bmc => VersionReader::Bmc,
            ComponentKind::SystemCpld => VersionReader::Cpld {
                bus: CPLD_I2C_BUS,
                addr: SYSTEM_CPLD_ADDR,
            },
            ComponentKind::SecondaryCpld1 => VersionReader::Cpld {
                bus: CPLD_I2C_BUS,
                addr: SECONDARY_CPLD1_ADDR,
            },
            ComponentKind::SecondaryCpld2 => VersionReader::Cpld {
                bus: CPLD_I2C_BUS,
                addr: SECONDARY_CPLD2_ADDR,
            },
            ComponentKind::Pcie => VersionReader::Pcie,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip_follows_catalog_order() {
        for (i, kind) in ComponentKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(ComponentKind::from_index(i), Some(*kind));
        }
        assert_eq!(ComponentKind::from_index(7), None);
    }

    #[test]
    fn test_from_name_is_exact() {
        assert_eq!(
            ComponentKind::from_name("Secondary CPLD 2"),
            Some(ComponentKind::SecondaryCpld2)
        );
        assert_eq!(ComponentKind::from_name("secondary cpld 2"), None);
        assert_eq!(ComponentKind::from_name("SSD"), None);
    }

    #[test]
    fn test_cpld_readers_use_distinct_addresses() {
        assert_eq!(
            ComponentKind::SecondaryCpld1.reader(),
            VersionReader::Cpld {
                bus: 600,
                addr: 0x30
            }
        );
        assert_eq!(
            ComponentKind::SystemCpld.reader(),
            VersionReader::Cpld {
                bus: 600,
                addr: 0x38
            }
        );
    }
}
