//! `Uuid` helpers for Bluetooth Classic service classes

use uuid::Uuid;

/// This is the Bluetooth Base UUID. It is used with the 16-bit service class UUIDs
/// [defined](https://www.bluetooth.com/specifications/assigned-numbers/) by the Bluetooth SIG.
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Const function to create a 16-bit Bluetooth UUID
pub const fn bluetooth_uuid_from_u16(uuid: u16) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Extension trait for [uuid::Uuid] with helper methods for 16-bit service class UUIDs
pub trait BluetoothUuidExt: private::Sealed {
    /// Creates a 16-bit Bluetooth UUID
    fn from_u16(uuid: u16) -> Self;

    /// Tries to convert self into a 16-bit Bluetooth UUID
    fn try_to_u16(&self) -> Option<u16>;
}

impl BluetoothUuidExt for Uuid {
    fn from_u16(uuid: u16) -> Self {
        bluetooth_uuid_from_u16(uuid)
    }

    fn try_to_u16(&self) -> Option<u16> {
        let u = self.as_u128();
        let short = (u >> 96) as u32;
        ((u & ((1 << 96) - 1)) == BLUETOOTH_BASE_UUID && short <= 0xffff).then_some(short as u16)
    }
}

mod private {
    use uuid::Uuid;

    pub trait Sealed {}

    impl Sealed for Uuid {}
}

/// Bluetooth Classic service class 16-bit UUIDs for RFCOMM based profiles
pub mod service_classes {
    #![allow(missing_docs)]

    use uuid::Uuid;

    use super::bluetooth_uuid_from_u16;

    pub const SERIAL_PORT: Uuid = bluetooth_uuid_from_u16(0x1101);
    pub const LAN_ACCESS_USING_PPP: Uuid = bluetooth_uuid_from_u16(0x1102);
    pub const DIALUP_NETWORKING: Uuid = bluetooth_uuid_from_u16(0x1103);
    pub const IR_MC_SYNC: Uuid = bluetooth_uuid_from_u16(0x1104);
    pub const OBEX_OBJECT_PUSH: Uuid = bluetooth_uuid_from_u16(0x1105);
    pub const OBEX_FILE_TRANSFER: Uuid = bluetooth_uuid_from_u16(0x1106);
    pub const HEADSET: Uuid = bluetooth_uuid_from_u16(0x1108);
    pub const HEADSET_AUDIO_GATEWAY: Uuid = bluetooth_uuid_from_u16(0x1112);
    pub const HANDSFREE: Uuid = bluetooth_uuid_from_u16(0x111E);
    pub const HANDSFREE_AUDIO_GATEWAY: Uuid = bluetooth_uuid_from_u16(0x111F);
    pub const PHONEBOOK_ACCESS_PSE: Uuid = bluetooth_uuid_from_u16(0x112F);
    pub const MESSAGE_ACCESS_SERVER: Uuid = bluetooth_uuid_from_u16(0x1132);
}
