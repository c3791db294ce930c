//! Unit normalization and alert threshold evaluation, per the trigger table
//! in §3 of the data model.

use fleet_protocol::{AlertName, AlertType, EmbeddedAlert};

/// Converts a PSI reading to bar, rounded to 2 decimals, per invariant §3.4.
pub fn psi_to_bar(psi: f64) -> f64 {
    (psi / 6.895 * 100.0).round() / 100.0
}

const LOW_PRESSURE_BAR: f64 = 90.0;
const HIGH_PRESSURE_BAR: f64 = 135.0;
const HIGH_TEMPERATURE_C: f64 = 95.0;
const LOW_DEPTH_MM: f64 = 3.0;
const GPS_TIMEOUT_MINUTES: i64 = 30;

/// Evaluates the pressure/temperature rules for a sensor reading. `pressure_bar`
/// is expected to already be converted via [`psi_to_bar`].
pub fn evaluate_sensor_alerts(
    pressure_bar: Option<f64>,
    temperature: Option<f64>,
    tire_id: Option<&str>,
) -> Vec<EmbeddedAlert> {
    let mut alerts = Vec::new();
    if let Some(bar) = pressure_bar {
        if bar < LOW_PRESSURE_BAR {
            alerts.push(EmbeddedAlert {
                r#type: AlertType::Pressure,
                name: AlertName::LowPressure,
                value: bar,
                tire_id: tire_id.map(str::to_owned),
            });
        } else if bar > HIGH_PRESSURE_BAR {
            alerts.push(EmbeddedAlert {
                r#type: AlertType::Pressure,
                name: AlertName::HighPressure,
                value: bar,
                tire_id: tire_id.map(str::to_owned),
            });
        }
    }
    if let Some(temp) = temperature {
        if temp > HIGH_TEMPERATURE_C {
            alerts.push(EmbeddedAlert {
                r#type: AlertType::Temperature,
                name: AlertName::HighTemperature,
                value: temp,
                tire_id: tire_id.map(str::to_owned),
            });
        }
    }
    alerts
}

/// Evaluates the tread-depth rule for a load reading.
pub fn evaluate_load_alerts(now_thread_depth: Option<f64>, tire_id: Option<&str>) -> Vec<EmbeddedAlert> {
    let mut alerts = Vec::new();
    if let Some(depth) = now_thread_depth {
        if depth < LOW_DEPTH_MM {
            alerts.push(EmbeddedAlert {
                r#type: AlertType::Depth,
                name: AlertName::LowDepth,
                value: depth,
                tire_id: tire_id.map(str::to_owned),
            });
        }
    }
    alerts
}

/// Minutes elapsed since the last GPS report, past which a `gps_timeout`
/// alert fires (used by C9's timeout synthesis).
pub fn gps_timeout_minutes(minutes_since_report: i64) -> Option<i64> {
    if minutes_since_report > GPS_TIMEOUT_MINUTES {
        Some(minutes_since_report)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psi_conversion_matches_scenario_2() {
        assert_eq!(psi_to_bar(620.0), 89.92);
    }

    #[test]
    fn low_pressure_triggers_below_ninety_bar() {
        let alerts = evaluate_sensor_alerts(Some(89.92), None, Some("TIRE1"));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, AlertName::LowPressure);
        assert_eq!(alerts[0].value, 89.92);
    }

    #[test]
    fn high_pressure_triggers_above_one_thirty_five_bar() {
        let alerts = evaluate_sensor_alerts(Some(140.0), None, None);
        assert_eq!(alerts[0].name, AlertName::HighPressure);
    }

    #[test]
    fn nominal_pressure_triggers_nothing() {
        assert!(evaluate_sensor_alerts(Some(110.0), Some(50.0), None).is_empty());
    }

    #[test]
    fn high_temperature_triggers_above_ninety_five_c() {
        let alerts = evaluate_sensor_alerts(None, Some(96.0), None);
        assert_eq!(alerts[0].name, AlertName::HighTemperature);
    }

    #[test]
    fn pressure_and_temperature_alerts_can_both_fire() {
        let alerts = evaluate_sensor_alerts(Some(80.0), Some(100.0), None);
        assert_eq!(alerts.len(), 2);
    }

    #[test]
    fn low_depth_triggers_below_three_mm() {
        let alerts = evaluate_load_alerts(Some(2.5), Some("TIRE1"));
        assert_eq!(alerts[0].name, AlertName::LowDepth);
    }

    #[test]
    fn depth_at_threshold_does_not_trigger() {
        assert!(evaluate_load_alerts(Some(3.0), None).is_empty());
    }

    #[test]
    fn gps_timeout_matches_scenario_5() {
        assert_eq!(gps_timeout_minutes(46), Some(46));
        assert_eq!(gps_timeout_minutes(30), None);
    }
}
