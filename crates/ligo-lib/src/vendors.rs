//! Vendor registry: USB vendor IDs of known Android device manufacturers.
//!
//! The table mirrors the vendor list shipped with `adb`. A device whose
//! vendor is not listed here is never probed.

use std::collections::HashMap;
use std::sync::LazyLock;

/// `(vendor_id, name)` for every recognized Android vendor.
pub const KNOWN_VENDORS: &[(u16, &str)] = &[
    (0x18D1, "Google"),
    (0x8087, "Intel"),
    (0x0BB4, "HTC"),
    (0x04E8, "Samsung"),
    (0x22B8, "Motorola"),
    (0x1004, "LGE"),
    (0x12D1, "Huawei"),
    (0x0502, "Acer"),
    (0x0FCE, "Sony Ericsson"),
    (0x0489, "Foxconn"),
    (0x413C, "Dell"),
    (0x0955, "Nvidia"),
    (0x091E, "Garmin-Asus"),
    (0x04DD, "Sharp"),
    (0x19D2, "ZTE"),
    (0x0482, "Kyocera"),
    (0x10A9, "Pantech"),
    (0x05C6, "Qualcomm"),
    (0x2257, "On-The-Go-Video"),
    (0x0409, "NEC"),
    (0x04DA, "Panasonic Mobile Communication"),
    (0x0930, "Toshiba"),
    (0x1F53, "SK Telesys"),
    (0x2116, "KT Tech"),
    (0x0B05, "Asus"),
    (0x0471, "Philips"),
    (0x0451, "Texas Instruments"),
    (0x0F1C, "Funai"),
    (0x0414, "Gigabyte"),
    (0x2420, "IRiver"),
    (0x1219, "Compal"),
    (0x1BBB, "T & A Mobile Phones"),
    (0x2006, "LenovoMobile"),
    (0x17EF, "Lenovo"),
    (0xE040, "Vizio"),
    (0x24E3, "K-Touch"),
    (0x1D4D, "Pegatron"),
    (0x0E79, "Archos"),
    (0x1662, "Positivo"),
    (0x04C5, "Fujitsu"),
    (0x25E3, "Lumigon"),
    (0x0408, "Quanta"),
    (0x2314, "INQ Mobile"),
    (0x054C, "Sony"),
    (0x1949, "Lab126"),
    (0x1EBF, "Yulong Coolpad"),
    (0x2237, "Kobo"),
    (0x2340, "Teleepoch"),
    (0x16D5, "AnyDATA"),
    (0x19A5, "Harris"),
    (0x22D9, "OPPO"),
    (0x2717, "Xiaomi"),
    (0x1D91, "BYD"),
    (0x2836, "OUYA"),
    (0x201E, "Haier"),
    (0x109B, "Hisense"),
    (0x0E8D, "MediaTek"),
    (0x2080, "Nook"),
    (0x1D45, "Qisda"),
    (0x03FC, "ECS"),
];

static REGISTRY: LazyLock<HashMap<u16, &'static str>> =
    LazyLock::new(|| KNOWN_VENDORS.iter().copied().collect());

/// Whether `vendor_id` belongs to a known Android vendor.
pub fn is_known_vendor(vendor_id: u16) -> bool {
    REGISTRY.contains_key(&vendor_id)
}

/// Human-readable vendor name, if the vendor is known.
pub fn vendor_name(vendor_id: u16) -> Option<&'static str> {
    REGISTRY.get(&vendor_id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn google_is_known() {
        assert!(is_known_vendor(0x18D1));
        assert_eq!(vendor_name(0x18D1), Some("Google"));
    }

    #[test]
    fn samsung_and_xiaomi_are_known() {
        assert!(is_known_vendor(0x04E8));
        assert!(is_known_vendor(0x2717));
    }

    #[test]
    fn focusrite_is_not_known() {
        assert!(!is_known_vendor(0x1235));
        assert_eq!(vendor_name(0x1235), None);
    }

    #[test]
    fn zero_vendor_is_not_known() {
        assert!(!is_known_vendor(0x0000));
    }

    #[test]
    fn table_has_sixty_unique_entries() {
        let ids: HashSet<u16> = KNOWN_VENDORS.iter().map(|(id, _)| *id).collect();
        assert_eq!(KNOWN_VENDORS.len(), 60);
        assert_eq!(ids.len(), KNOWN_VENDORS.len(), "duplicate vendor id in table");
    }

    #[test]
    fn every_table_entry_is_known() {
        for &(id, name) in KNOWN_VENDORS {
            assert!(is_known_vendor(id), "{name} (0x{id:04X}) not in registry");
            assert_eq!(vendor_name(id), Some(name));
        }
    }
}
