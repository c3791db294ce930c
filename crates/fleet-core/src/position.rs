//! Maps `(axle, wheel)` to a canonical tire position using a truck's axle
//! layout, handling the two reserved spare-tire slots.

use fleet_protocol::TruckLayout;

/// Resolved position plus an optional human-readable spare note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPosition {
    pub real_position: u32,
    pub spare_tire_note: Option<String>,
}

/// `axle` and `wheel` are 1-based for on-axle tires; `axle == 0` selects a
/// spare. Returns `None` if the indices are out of range for the layout.
pub fn resolve_position(axle: u32, wheel: u32, layout: Option<&TruckLayout>) -> Option<ResolvedPosition> {
    if axle == 0 {
        return match wheel {
            1 => Some(ResolvedPosition {
                real_position: 11,
                spare_tire_note: Some("Spare tire 1".to_owned()),
            }),
            2 => Some(ResolvedPosition {
                real_position: 12,
                spare_tire_note: Some("Spare tire 2".to_owned()),
            }),
            _ => None,
        };
    }

    let layout = layout?;
    let mut position = 1u32;
    for (idx, &tires_on_axle) in layout.tires_per_axle.iter().enumerate() {
        let current_axle = idx as u32 + 1;
        if current_axle == axle {
            if wheel == 0 || wheel > tires_on_axle {
                return None;
            }
            return Some(ResolvedPosition {
                real_position: position + wheel - 1,
                spare_tire_note: None,
            });
        }
        position += tires_on_axle;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TruckLayout {
        TruckLayout {
            unit_catalog_id: "U1".to_owned(),
            axles_count: 3,
            tires_per_axle: vec![2, 4, 4],
        }
    }

    #[test]
    fn on_axle_position_is_flat_numbered_across_axles() {
        let resolved = resolve_position(3, 2, Some(&layout())).unwrap();
        assert_eq!(resolved.real_position, 8);
        assert!(resolved.spare_tire_note.is_none());
    }

    #[test]
    fn first_axle_first_wheel_is_position_one() {
        let resolved = resolve_position(1, 1, Some(&layout())).unwrap();
        assert_eq!(resolved.real_position, 1);
    }

    #[test]
    fn spare_one_is_reserved_position_eleven() {
        let resolved = resolve_position(0, 1, Some(&layout())).unwrap();
        assert_eq!(resolved.real_position, 11);
        assert_eq!(resolved.spare_tire_note.as_deref(), Some("Spare tire 1"));
    }

    #[test]
    fn spare_two_is_reserved_position_twelve() {
        let resolved = resolve_position(0, 2, Some(&layout())).unwrap();
        assert_eq!(resolved.real_position, 12);
        assert_eq!(resolved.spare_tire_note.as_deref(), Some("Spare tire 2"));
    }

    #[test]
    fn spare_wheel_outside_one_or_two_is_none() {
        assert!(resolve_position(0, 3, Some(&layout())).is_none());
    }

    #[test]
    fn axle_beyond_layout_is_none() {
        assert!(resolve_position(4, 1, Some(&layout())).is_none());
    }

    #[test]
    fn wheel_beyond_axle_tire_count_is_none() {
        assert!(resolve_position(1, 3, Some(&layout())).is_none());
    }

    #[test]
    fn missing_layout_is_none_for_on_axle_positions() {
        assert!(resolve_position(1, 1, None).is_none());
    }

    #[test]
    fn missing_layout_still_resolves_spares() {
        assert!(resolve_position(0, 1, None).is_some());
    }
}
