//! Pure dock/snap calculations for the draggable touch control.
//!
//! Everything here is a deterministic function of its inputs — no Win32, no
//! state. The overlay layer feeds these with logical coordinates and applies
//! DPI correction only when talking to the OS.

use super::types::{Corner, Point, Rect, Size, TouchDockAnchor};

/// Inset, in logical pixels, between a docked touch control and the
/// container edge it rests against.
pub const TOUCH_SPACE: f64 = 2.0;

/// Tolerance for classifying a rect as sitting exactly on a dock inset.
const DOCK_EPSILON: f64 = 0.5;

/// Where a released touch control should come to rest.
///
/// Snaps to the nearest corner when the position is close to two adjacent
/// edges, else to a close top/bottom edge keeping the horizontal coordinate,
/// else horizontally to whichever side of the container midline the control's
/// center falls in. The check order (corners first, top before bottom, left
/// before right) is the tie-break contract — do not reorder.
pub fn final_touch_position(container: Size, touch_pos: Point, touch_size: f64) -> Point {
    let right = container.width - touch_pos.x - touch_size;
    let bottom = container.height - touch_pos.y - touch_size;
    let h_snap_limit = touch_size / 2.0;
    let v_snap_limit = touch_size * 2.0 / 3.0;

    let near_left = touch_pos.x < h_snap_limit;
    let near_right = right < h_snap_limit;
    let near_top = touch_pos.y < v_snap_limit;
    let near_bottom = bottom < v_snap_limit;

    let docked_left = TOUCH_SPACE;
    let docked_right = container.width - touch_size - TOUCH_SPACE;
    let docked_top = TOUCH_SPACE;
    let docked_bottom = container.height - touch_size - TOUCH_SPACE;

    if near_left && near_top {
        return Point::new(docked_left, docked_top);
    }
    if near_right && near_top {
        return Point::new(docked_right, docked_top);
    }
    if near_left && near_bottom {
        return Point::new(docked_left, docked_bottom);
    }
    if near_right && near_bottom {
        return Point::new(docked_right, docked_bottom);
    }
    if near_top {
        return Point::new(touch_pos.x, docked_top);
    }
    if near_bottom {
        return Point::new(touch_pos.x, docked_bottom);
    }

    // Neither vertical edge is close: snap horizontally, keep y.
    let center = touch_pos.x + touch_size / 2.0;
    if center < container.width / 2.0 {
        Point::new(docked_left, touch_pos.y)
    } else {
        Point::new(docked_right, touch_pos.y)
    }
}

/// Whether a mid-drag position has escaped the container far enough that the
/// gesture should end as if the pointer were released.
///
/// Thresholds are asymmetric on purpose: a third of the control past the
/// top/left edges, two thirds past the bottom/right ones.
pub fn is_beyond_boundary(delta: Point, touch_size: f64, container: Size) -> bool {
    delta.x < -touch_size / 3.0
        || delta.y < -touch_size / 3.0
        || delta.x > container.width - touch_size * 2.0 / 3.0
        || delta.y > container.height - touch_size * 2.0 / 3.0
}

/// Classify a rect already resting at a dock position back into its anchor.
///
/// For edge docks the scale along the edge is
/// `(coordinate + TOUCH_SPACE + touch_size / 2) / container_dimension`.
///
/// # Panics
///
/// The rect must sit exactly at `TOUCH_SPACE` inset from at least one edge on
/// each snapped axis; anything else is a programming error upstream (the rect
/// can only come from [`final_touch_position`] or [`dock_rect`]).
pub fn last_dock_anchor(container: Size, touch_rect: Rect) -> TouchDockAnchor {
    let touch_size = touch_rect.width;
    let on_left = (touch_rect.x - TOUCH_SPACE).abs() < DOCK_EPSILON;
    let on_right =
        (touch_rect.x - (container.width - TOUCH_SPACE - touch_size)).abs() < DOCK_EPSILON;
    let on_top = (touch_rect.y - TOUCH_SPACE).abs() < DOCK_EPSILON;
    let on_bottom =
        (touch_rect.y - (container.height - TOUCH_SPACE - touch_size)).abs() < DOCK_EPSILON;

    let h_scale = (touch_rect.x + TOUCH_SPACE + touch_size / 2.0) / container.width;
    let v_scale = (touch_rect.y + TOUCH_SPACE + touch_size / 2.0) / container.height;

    match (on_left, on_right, on_top, on_bottom) {
        (true, _, true, _) => TouchDockAnchor::corner(Corner::TopLeft),
        (_, true, true, _) => TouchDockAnchor::corner(Corner::TopRight),
        (true, _, _, true) => TouchDockAnchor::corner(Corner::BottomLeft),
        (_, true, _, true) => TouchDockAnchor::corner(Corner::BottomRight),
        (true, _, _, _) => TouchDockAnchor::edge(Corner::Left, v_scale),
        (_, true, _, _) => TouchDockAnchor::edge(Corner::Right, v_scale),
        (_, _, true, _) => TouchDockAnchor::edge(Corner::Top, h_scale),
        (_, _, _, true) => TouchDockAnchor::edge(Corner::Bottom, h_scale),
        _ => unreachable!("touch rect {touch_rect:?} is not at a dock position"),
    }
}

/// Reconstruct the absolute rect for an anchor inside a (possibly resized)
/// container. Inverse of [`last_dock_anchor`].
pub fn dock_rect(container: Size, anchor: TouchDockAnchor, touch_size: f64) -> Rect {
    let left = TOUCH_SPACE;
    let right = container.width - TOUCH_SPACE - touch_size;
    let top = TOUCH_SPACE;
    let bottom = container.height - TOUCH_SPACE - touch_size;

    // Inverts the edge-scale formula from `last_dock_anchor`.
    let h_coord = anchor.scale * container.width - TOUCH_SPACE - touch_size / 2.0;
    let v_coord = anchor.scale * container.height - TOUCH_SPACE - touch_size / 2.0;

    let (x, y) = match anchor.corner {
        Corner::TopLeft => (left, top),
        Corner::TopRight => (right, top),
        Corner::BottomLeft => (left, bottom),
        Corner::BottomRight => (right, bottom),
        Corner::Left => (left, v_coord),
        Corner::Right => (right, v_coord),
        Corner::Top => (h_coord, top),
        Corner::Bottom => (h_coord, bottom),
    };

    Rect::new(x, y, touch_size, touch_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: Size = Size {
        width: 800.0,
        height: 600.0,
    };
    const TOUCH: f64 = 80.0;

    #[test]
    fn snaps_all_four_corners() {
        let cases = [
            (Point::new(10.0, 10.0), Point::new(2.0, 2.0)),
            (Point::new(690.0, 10.0), Point::new(718.0, 2.0)),
            (Point::new(10.0, 550.0), Point::new(2.0, 518.0)),
            (Point::new(690.0, 550.0), Point::new(718.0, 518.0)),
        ];
        for (pos, expected) in cases {
            assert_eq!(final_touch_position(CONTAINER, pos, TOUCH), expected);
        }
    }

    #[test]
    fn top_right_release_scenario() {
        // Release at (750, 10): right distance is -30 < 40, y is 10 < 53.3.
        let got = final_touch_position(CONTAINER, Point::new(750.0, 10.0), TOUCH);
        assert_eq!(got, Point::new(718.0, 2.0));
    }

    #[test]
    fn dead_center_snaps_right() {
        // Center of the control is at 440, past the 400 midline.
        let got = final_touch_position(CONTAINER, Point::new(400.0, 300.0), TOUCH);
        assert_eq!(got, Point::new(718.0, 300.0));
    }

    #[test]
    fn left_half_snaps_left_keeping_y() {
        let got = final_touch_position(CONTAINER, Point::new(200.0, 300.0), TOUCH);
        assert_eq!(got, Point::new(2.0, 300.0));
    }

    #[test]
    fn top_edge_keeps_x() {
        let got = final_touch_position(CONTAINER, Point::new(400.0, 20.0), TOUCH);
        assert_eq!(got, Point::new(400.0, 2.0));
    }

    #[test]
    fn bottom_edge_keeps_x() {
        let got = final_touch_position(CONTAINER, Point::new(300.0, 490.0), TOUCH);
        assert_eq!(got, Point::new(300.0, 518.0));
    }

    #[test]
    fn snap_is_idempotent() {
        let starts = [
            Point::new(10.0, 10.0),
            Point::new(750.0, 10.0),
            Point::new(400.0, 300.0),
            Point::new(400.0, 20.0),
            Point::new(300.0, 490.0),
            Point::new(-50.0, 700.0),
        ];
        for start in starts {
            let once = final_touch_position(CONTAINER, start, TOUCH);
            let twice = final_touch_position(CONTAINER, once, TOUCH);
            assert_eq!(once, twice, "not idempotent from {start:?}");
        }
    }

    #[test]
    fn boundary_thresholds_are_exclusive() {
        // Exactly a third past the left edge is still inside.
        let at_left = Point::new(-TOUCH / 3.0, 100.0);
        assert!(!is_beyond_boundary(at_left, TOUCH, CONTAINER));
        let past_left = Point::new(-TOUCH / 3.0 - 1.0, 100.0);
        assert!(is_beyond_boundary(past_left, TOUCH, CONTAINER));

        // Exactly two thirds before the right edge is still inside.
        let at_right = Point::new(CONTAINER.width - TOUCH * 2.0 / 3.0, 100.0);
        assert!(!is_beyond_boundary(at_right, TOUCH, CONTAINER));
        let past_right = Point::new(CONTAINER.width - TOUCH * 2.0 / 3.0 + 1.0, 100.0);
        assert!(is_beyond_boundary(past_right, TOUCH, CONTAINER));
    }

    #[test]
    fn boundary_vertical_thresholds() {
        assert!(!is_beyond_boundary(
            Point::new(100.0, -TOUCH / 3.0),
            TOUCH,
            CONTAINER
        ));
        assert!(is_beyond_boundary(
            Point::new(100.0, -TOUCH / 3.0 - 1.0),
            TOUCH,
            CONTAINER
        ));
        assert!(is_beyond_boundary(
            Point::new(100.0, CONTAINER.height - TOUCH * 2.0 / 3.0 + 1.0),
            TOUCH,
            CONTAINER
        ));
    }

    #[test]
    fn anchor_round_trips_for_corners() {
        let corners = [
            Corner::TopLeft,
            Corner::TopRight,
            Corner::BottomLeft,
            Corner::BottomRight,
        ];
        for corner in corners {
            let anchor = TouchDockAnchor::corner(corner);
            let rect = dock_rect(CONTAINER, anchor, TOUCH);
            let back = last_dock_anchor(CONTAINER, rect);
            assert_eq!(back.corner, corner);
        }
    }

    #[test]
    fn anchor_round_trips_for_edge_scales() {
        let edges = [Corner::Left, Corner::Top, Corner::Right, Corner::Bottom];
        for edge in edges {
            for scale in [0.0, 0.25, 0.5, 0.75, 1.0] {
                let anchor = TouchDockAnchor::edge(edge, scale);
                let rect = dock_rect(CONTAINER, anchor, TOUCH);
                let back = last_dock_anchor(CONTAINER, rect);
                assert_eq!(back.corner, edge, "edge {edge:?} scale {scale}");
                assert!(
                    (back.scale - scale).abs() < 1e-9,
                    "edge {edge:?}: {} != {scale}",
                    back.scale
                );
            }
        }
    }

    #[test]
    fn released_positions_are_always_classifiable() {
        // Every snap outcome must land somewhere `last_dock_anchor` accepts.
        let starts = [
            Point::new(5.0, 5.0),
            Point::new(795.0, 5.0),
            Point::new(5.0, 595.0),
            Point::new(795.0, 595.0),
            Point::new(400.0, 10.0),
            Point::new(400.0, 590.0),
            Point::new(100.0, 300.0),
            Point::new(700.0, 300.0),
        ];
        for start in starts {
            let rest = final_touch_position(CONTAINER, start, TOUCH);
            let rect = Rect::new(rest.x, rest.y, TOUCH, TOUCH);
            let _ = last_dock_anchor(CONTAINER, rect);
        }
    }

    #[test]
    #[should_panic]
    fn undocked_rect_is_a_programmer_error() {
        let rect = Rect::new(100.0, 100.0, TOUCH, TOUCH);
        let _ = last_dock_anchor(CONTAINER, rect);
    }
}
