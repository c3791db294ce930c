//! Per-vehicle log routing.
//!
//! The upstream service opens one log file per license plate; that does not
//! scale to an unbounded fleet. Here a message's log lines are instead
//! grouped by entering a [`tracing`] span carrying the plate as a field —
//! any subscriber (stdout, a file, a collector) can filter or route on it
//! without the process holding one handle per vehicle.

use tracing::Span;

/// Opens a span for the duration of handling one message for `license_plate`.
/// Callers `.enter()` it (or `.in_scope(...)`) around the handler body.
pub fn vehicle_span(license_plate: &str) -> Span {
    tracing::info_span!("vehicle", license_plate = %license_plate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_carries_the_plate_field() {
        let span = vehicle_span("T-100");
        assert_eq!(span.metadata().map(|m| m.name()), Some("vehicle"));
    }
}
