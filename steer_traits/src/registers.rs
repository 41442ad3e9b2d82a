//! Object addresses used by the motion core.
//!
//! The table is plain data handed out by the channel, so a drive with a
//! different object layout only needs a different `RegisterMap`.

/// "save" in little-endian ASCII, written to Store Parameters.
pub const STORE_SIGNATURE: u32 = 0x6576_6173;
/// "load" in little-endian ASCII, written to Restore Default Parameters.
pub const RESTORE_SIGNATURE: u32 = 0x6461_6F6C;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectAddr {
    pub index: u16,
    pub subindex: u8,
}

impl ObjectAddr {
    #[inline]
    pub const fn new(index: u16, subindex: u8) -> Self {
        Self { index, subindex }
    }
}

impl std::fmt::Display for ObjectAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X}:{:02X}", self.index, self.subindex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    pub control_word: ObjectAddr,
    pub status_word: ObjectAddr,
    /// Demanded position in position mode (i32).
    pub position_setting: ObjectAddr,
    pub position_actual: ObjectAddr,
    pub op_mode: ObjectAddr,
    pub op_mode_display: ObjectAddr,
    pub max_following_error: ObjectAddr,
    /// Following error actual value (i16).
    pub following_error: ObjectAddr,
    pub software_limit_min: ObjectAddr,
    pub software_limit_max: ObjectAddr,
    pub store_parameters: ObjectAddr,
    pub restore_defaults: ObjectAddr,
}

impl Default for RegisterMap {
    /// Maxon EPOS object layout.
    fn default() -> Self {
        Self {
            control_word: ObjectAddr::new(0x6040, 0),
            status_word: ObjectAddr::new(0x6041, 0),
            position_setting: ObjectAddr::new(0x2062, 0),
            position_actual: ObjectAddr::new(0x6064, 0),
            op_mode: ObjectAddr::new(0x6060, 0),
            op_mode_display: ObjectAddr::new(0x6061, 0),
            max_following_error: ObjectAddr::new(0x6065, 0),
            following_error: ObjectAddr::new(0x20F4, 0),
            software_limit_min: ObjectAddr::new(0x607D, 1),
            software_limit_max: ObjectAddr::new(0x607D, 2),
            store_parameters: ObjectAddr::new(0x1010, 1),
            restore_defaults: ObjectAddr::new(0x1011, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_spell_ascii() {
        assert_eq!(&STORE_SIGNATURE.to_le_bytes(), b"save");
        assert_eq!(&RESTORE_SIGNATURE.to_le_bytes(), b"load");
    }

    #[test]
    fn addr_display_is_hex() {
        assert_eq!(ObjectAddr::new(0x607D, 2).to_string(), "0x607D:02");
    }
}
