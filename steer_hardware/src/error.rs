use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("SDO abort 0x{code:08X}: {}", abort_text(.code))]
    SdoAbort { code: u32 },
    #[error("SDO timeout")]
    Timeout,
    #[error("node {0} not responding")]
    NodeUnreachable(u8),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl HwError {
    pub fn sdo_abort(code: u32) -> Self {
        Self::SdoAbort { code }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;

pub const ABORT_TOGGLE_BIT: u32 = 0x0503_0000;
pub const ABORT_PROTOCOL_TIMEOUT: u32 = 0x0504_0000;
pub const ABORT_WRITE_READ_ONLY: u32 = 0x0601_0002;
pub const ABORT_NO_OBJECT: u32 = 0x0602_0000;
pub const ABORT_LENGTH_MISMATCH: u32 = 0x0607_0010;
pub const ABORT_VALUE_RANGE: u32 = 0x0609_0030;
pub const ABORT_MAX_BELOW_MIN: u32 = 0x0609_0036;
pub const ABORT_WRONG_DEVICE_STATE: u32 = 0x0800_0022;

/// Human readable text for CANopen and Maxon SDO abort codes.
pub fn describe_sdo_abort(code: u32) -> Option<&'static str> {
    let text = match code {
        0x0000_0000 => "no error",
        0x0503_0000 => "toggle bit not alternated",
        0x0504_0000 => "SDO protocol timeout",
        0x0504_0001 => "client/server command specifier not valid or unknown",
        0x0504_0002 => "invalid block size",
        0x0504_0003 => "invalid sequence number",
        0x0504_0004 => "CRC error",
        0x0504_0005 => "out of memory",
        0x0601_0000 => "unsupported access to an object",
        0x0601_0001 => "attempt to read a write-only object",
        0x0601_0002 => "attempt to write a read-only object",
        0x0602_0000 => "object does not exist",
        0x0604_0041 => "object cannot be mapped to the PDO",
        0x0604_0042 => "number and length of mapped objects would exceed PDO length",
        0x0604_0043 => "general parameter incompatibility",
        0x0604_0047 => "general internal incompatibility in the device",
        0x0606_0000 => "access failed due to a hardware error",
        0x0607_0010 => "data type does not match, length of service parameter does not match",
        0x0607_0012 => "data type does not match, length of service parameter too high",
        0x0607_0013 => "data type does not match, length of service parameter too low",
        0x0609_0011 => "subindex does not exist",
        0x0609_0030 => "value range of parameter exceeded",
        0x0609_0031 => "value of parameter written is too high",
        0x0609_0032 => "value of parameter written is too low",
        0x0609_0036 => "maximum value is less than minimum value",
        0x060A_0023 => "resource not available: SDO connection",
        0x0800_0000 => "general error",
        0x0800_0020 => "data cannot be transferred or stored to the application",
        0x0800_0021 => {
            "data cannot be transferred or stored to the application because of local control"
        }
        0x0800_0022 => "wrong device state, data cannot be transferred",
        0x0800_0023 => "object dictionary dynamic generation failed or no object dictionary present",
        // Maxon specific
        0x0F00_FFC0 => "wrong NMT state",
        0x0F00_FFBF => "RS232 command illegal",
        0x0F00_FFBE => "password incorrect",
        0x0F00_FFBC => "device not in service mode",
        0x0F00_FFB9 => "error in node ID",
        _ => return None,
    };
    Some(text)
}

fn abort_text(code: &u32) -> &'static str {
    describe_sdo_abort(*code).unwrap_or("unknown abort code")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_display_includes_description() {
        let e = HwError::sdo_abort(ABORT_NO_OBJECT);
        assert_eq!(e.to_string(), "SDO abort 0x06020000: object does not exist");
    }

    #[test]
    fn unknown_abort_code_still_formats() {
        let e = HwError::sdo_abort(0x1234_5678);
        assert!(e.to_string().contains("unknown abort code"));
        assert!(describe_sdo_abort(0x1234_5678).is_none());
    }

    #[test]
    fn maxon_codes_are_known() {
        assert_eq!(describe_sdo_abort(0x0F00_FFC0), Some("wrong NMT state"));
    }
}
