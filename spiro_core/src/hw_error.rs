//! Maps `Box<dyn Error>` from the sensor seam to typed `MonitorError`.
//!
//! `spiro_traits::PressureSensor` returns boxed errors; with the
//! `hardware-errors` feature the known `spiro_hardware::HwError` variants are
//! matched exactly, anything else goes through string heuristics.

use crate::error::MonitorError;

pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> MonitorError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<spiro_hardware::HwError>() {
            return match hw {
                spiro_hardware::HwError::Timeout => MonitorError::Timeout,
                spiro_hardware::HwError::Fault(msg) => MonitorError::SensorFault(msg.clone()),
                other => MonitorError::SensorRead(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        MonitorError::Timeout
    } else {
        MonitorError::SensorRead(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_heuristic_detects_timeouts() {
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        assert_eq!(map_hw_error(&e), MonitorError::Timeout);
        let e = std::io::Error::other("bus glitch");
        assert!(matches!(map_hw_error(&e), MonitorError::SensorRead(_)));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hardware_errors_map_exactly() {
        let e = spiro_hardware::HwError::Fault("gauge 2 saturated".into());
        assert_eq!(
            map_hw_error(&e),
            MonitorError::SensorFault("gauge 2 saturated".into())
        );
        assert_eq!(map_hw_error(&spiro_hardware::HwError::Timeout), MonitorError::Timeout);
    }
}
