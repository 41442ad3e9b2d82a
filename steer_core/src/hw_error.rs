//! Maps `Box<dyn Error>` from the channel boundary to typed `SteerError`.
//!
//! `ObjectChannel` returns `Box<dyn Error + Send + Sync>`; this module converts
//! those to our typed error enum, with an optional feature-gated path for
//! `steer_hardware::HwError` downcasting.

use crate::error::SteerError;

/// Map a trait-boundary error to a typed `SteerError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> SteerError {
    #[cfg(feature = "hardware-errors")]
    {
        use steer_hardware::error::{HwError, describe_sdo_abort};
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => SteerError::Timeout,
                HwError::SdoAbort { code } => SteerError::SdoAbort {
                    code: *code,
                    text: describe_sdo_abort(*code)
                        .unwrap_or("unknown abort code")
                        .to_string(),
                },
                HwError::NodeUnreachable(node) => {
                    SteerError::DeviceUnavailable(format!("node {node} not responding"))
                }
                other => SteerError::Transport(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        SteerError::Timeout
    } else {
        SteerError::Transport(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_detects_timeout() {
        let e = std::io::Error::other("SDO Timeout on node 1");
        assert_eq!(map_hw_error(&e), SteerError::Timeout);
        let e = std::io::Error::other("bus off");
        assert_eq!(map_hw_error(&e), SteerError::Transport("bus off".into()));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn downcasts_sdo_abort() {
        let e = steer_hardware::HwError::sdo_abort(0x0800_0022);
        match map_hw_error(&e) {
            SteerError::SdoAbort { code, text } => {
                assert_eq!(code, 0x0800_0022);
                assert!(text.contains("wrong device state"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
