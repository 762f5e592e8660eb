//! Drag/dock state machine for the touch control.
//!
//! The controller is free of Win32: it consumes pointer and resize events in
//! overlay-local logical coordinates and drives a [`DockSurface`] capability
//! for everything that must reach the OS (repaints, region masking, pointer
//! capture, the animation timer). The overlay window implements the surface;
//! tests substitute a recording mock.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::geometry::{
    Corner, Point, Rect, Size, TouchDockAnchor, dock_rect, final_touch_position,
    is_beyond_boundary, last_dock_anchor,
};

/// How long the released control glides to its dock position.
pub const SNAP_ANIMATION: Duration = Duration::from_millis(200);

/// OS-facing capabilities the controller needs, injected so the docking
/// logic stays testable without a window.
pub trait DockSurface {
    /// The touch control's rect changed; request a repaint.
    fn invalidate(&mut self);
    /// Restrict pointer input/painting to `rect` (logical; the
    /// implementation applies DPI correction at the OS boundary).
    fn set_observable_region(&mut self, rect: Rect);
    /// Open the whole client area for input, used while a drag is live.
    fn reset_observable_region(&mut self);
    fn set_pointer_capture(&mut self, captured: bool);
    /// Start/stop delivering [`TouchDockController::on_tick`] calls.
    fn set_animating(&mut self, active: bool);
}

#[derive(Clone, Copy)]
enum DragState {
    Idle,
    Dragging {
        /// Offset from the press point to the control's origin.
        grab: Point,
    },
}

struct SnapAnimation {
    from: Point,
    to: Point,
    started: Instant,
}

pub struct TouchDockController {
    touch_size: f64,
    container: Size,
    rect: Rect,
    anchor: TouchDockAnchor,
    drag: DragState,
    animation: Option<SnapAnimation>,
    /// Synthesize a release when the control is dragged far outside the
    /// container. Known-unstable on rapid double-press, hence the toggle.
    throw_on_boundary: bool,
}

impl TouchDockController {
    pub fn new(container: Size, touch_size: f64, throw_on_boundary: bool) -> Self {
        // Fresh overlays start halfway down the left edge.
        let anchor = TouchDockAnchor::edge(Corner::Left, 0.5);
        Self {
            touch_size,
            container,
            rect: dock_rect(container, anchor, touch_size),
            anchor,
            drag: DragState::Idle,
            animation: None,
            throw_on_boundary,
        }
    }

    pub fn touch_rect(&self) -> Rect {
        self.rect
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    /// Publish the control's current rect as the observable region. Called
    /// once right after binding so the overlay starts click-through.
    pub fn publish_region(&self, surface: &mut dyn DockSurface) {
        surface.set_observable_region(self.rect);
    }

    /// Pointer press. Returns whether the press landed on the control and
    /// armed a drag gesture.
    pub fn on_press(&mut self, pos: Point, surface: &mut dyn DockSurface) -> bool {
        if !self.rect.contains(pos) {
            return false;
        }
        // A press always wins over an in-flight snap animation.
        if self.animation.take().is_some() {
            surface.set_animating(false);
        }
        self.drag = DragState::Dragging {
            grab: Point::new(pos.x - self.rect.x, pos.y - self.rect.y),
        };
        surface.set_pointer_capture(true);
        // Open up the full container so the drag keeps receiving input even
        // when the pointer leaves the control's normal hit area.
        surface.reset_observable_region();
        true
    }

    pub fn on_move(&mut self, pos: Point, surface: &mut dyn DockSurface, now: Instant) {
        let DragState::Dragging { grab } = self.drag else {
            return;
        };
        self.rect.x = pos.x - grab.x;
        self.rect.y = pos.y - grab.y;
        surface.invalidate();

        if self.throw_on_boundary
            && is_beyond_boundary(self.rect.origin(), self.touch_size, self.container)
        {
            debug!("drag escaped container, synthesizing release");
            self.on_release(surface, now);
        }
    }

    /// Pointer release (real or synthesized). Idempotent: a second release
    /// while idle is a no-op, so a synthesized release followed by the real
    /// pointer-up ends the gesture exactly once.
    pub fn on_release(&mut self, surface: &mut dyn DockSurface, now: Instant) {
        if !self.is_dragging() {
            return;
        }
        self.drag = DragState::Idle;
        surface.set_pointer_capture(false);

        let target = final_touch_position(self.container, self.rect.origin(), self.touch_size);
        // The anchor is re-derived on release; container resizes only ever
        // re-apply it.
        self.anchor = last_dock_anchor(
            self.container,
            Rect::new(target.x, target.y, self.touch_size, self.touch_size),
        );
        self.animation = Some(SnapAnimation {
            from: self.rect.origin(),
            to: target,
            started: now,
        });
        surface.set_animating(true);
    }

    /// Advance the snap animation. On completion the control's final rect
    /// becomes the observable region again.
    pub fn on_tick(&mut self, surface: &mut dyn DockSurface, now: Instant) {
        let Some(anim) = &self.animation else {
            return;
        };
        let t = now.saturating_duration_since(anim.started).as_secs_f64()
            / SNAP_ANIMATION.as_secs_f64();
        if t >= 1.0 {
            self.rect.x = anim.to.x;
            self.rect.y = anim.to.y;
            self.animation = None;
            surface.set_animating(false);
            surface.invalidate();
            surface.set_observable_region(self.rect);
        } else {
            let eased = 1.0 - (1.0 - t).powi(3);
            self.rect.x = anim.from.x + (anim.to.x - anim.from.x) * eased;
            self.rect.y = anim.from.y + (anim.to.y - anim.from.y) * eased;
            surface.invalidate();
        }
    }

    /// The container (game window client area) changed size. Re-derives the
    /// control's position from its dock anchor unless a drag is live.
    pub fn on_container_resize(&mut self, container: Size, surface: &mut dyn DockSurface) {
        self.container = container;
        if self.is_dragging() {
            // The region is already the full client area; refresh it for the
            // new bounds and leave the control under the pointer.
            surface.reset_observable_region();
            return;
        }
        if self.animation.take().is_some() {
            surface.set_animating(false);
        }
        self.rect = dock_rect(container, self.anchor, self.touch_size);
        surface.invalidate();
        surface.set_observable_region(self.rect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Event {
        Invalidate,
        SetRegion(Rect),
        ResetRegion,
        Capture(bool),
        Animating(bool),
    }

    #[derive(Default)]
    struct MockSurface {
        events: Vec<Event>,
    }

    impl DockSurface for MockSurface {
        fn invalidate(&mut self) {
            self.events.push(Event::Invalidate);
        }
        fn set_observable_region(&mut self, rect: Rect) {
            self.events.push(Event::SetRegion(rect));
        }
        fn reset_observable_region(&mut self) {
            self.events.push(Event::ResetRegion);
        }
        fn set_pointer_capture(&mut self, captured: bool) {
            self.events.push(Event::Capture(captured));
        }
        fn set_animating(&mut self, active: bool) {
            self.events.push(Event::Animating(active));
        }
    }

    const CONTAINER: Size = Size {
        width: 800.0,
        height: 600.0,
    };
    const TOUCH: f64 = 80.0;

    fn controller(throw: bool) -> TouchDockController {
        TouchDockController::new(CONTAINER, TOUCH, throw)
    }

    fn press_point(ctl: &TouchDockController) -> Point {
        let r = ctl.touch_rect();
        Point::new(r.x + 10.0, r.y + 10.0)
    }

    #[test]
    fn starts_docked_mid_left_edge() {
        let ctl = controller(false);
        let r = ctl.touch_rect();
        assert_eq!(r.x, 2.0);
        // scale 0.5 on a 600-high container: y = 300 - 2 - 40.
        assert_eq!(r.y, 258.0);
    }

    #[test]
    fn press_outside_control_is_ignored() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        assert!(!ctl.on_press(Point::new(400.0, 400.0), &mut surface));
        assert!(surface.events.is_empty());
        assert!(!ctl.is_dragging());
    }

    #[test]
    fn press_captures_and_opens_full_region() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        assert!(ctl.on_press(press_point(&ctl), &mut surface));
        assert_eq!(surface.events, vec![Event::Capture(true), Event::ResetRegion]);
        assert!(ctl.is_dragging());
    }

    #[test]
    fn move_tracks_pointer_minus_grab_offset() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        let start = ctl.touch_rect();
        let press = Point::new(start.x + 10.0, start.y + 10.0);
        ctl.on_press(press, &mut surface);
        ctl.on_move(Point::new(400.0, 300.0), &mut surface, Instant::now());
        let r = ctl.touch_rect();
        assert_eq!((r.x, r.y), (390.0, 290.0));
    }

    #[test]
    fn release_snaps_and_publishes_region_after_animation() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        let t0 = Instant::now();
        ctl.on_press(press_point(&ctl), &mut surface);
        // Drag near the top-right corner.
        ctl.on_move(Point::new(760.0, 20.0), &mut surface, t0);
        surface.events.clear();
        ctl.on_release(&mut surface, t0);
        assert_eq!(
            surface.events,
            vec![Event::Capture(false), Event::Animating(true)]
        );

        surface.events.clear();
        ctl.on_tick(&mut surface, t0 + SNAP_ANIMATION + Duration::from_millis(1));
        let r = ctl.touch_rect();
        assert_eq!((r.x, r.y), (718.0, 2.0));
        assert_eq!(
            surface.events,
            vec![
                Event::Animating(false),
                Event::Invalidate,
                Event::SetRegion(r)
            ]
        );
    }

    #[test]
    fn intermediate_tick_moves_without_publishing() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        let t0 = Instant::now();
        ctl.on_press(press_point(&ctl), &mut surface);
        ctl.on_move(Point::new(400.0, 300.0), &mut surface, t0);
        ctl.on_release(&mut surface, t0);
        surface.events.clear();
        ctl.on_tick(&mut surface, t0 + Duration::from_millis(100));
        assert_eq!(surface.events, vec![Event::Invalidate]);
    }

    #[test]
    fn duplicate_release_is_a_no_op() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        let t0 = Instant::now();
        ctl.on_press(press_point(&ctl), &mut surface);
        ctl.on_release(&mut surface, t0);
        surface.events.clear();
        ctl.on_release(&mut surface, t0);
        assert!(surface.events.is_empty());
    }

    #[test]
    fn boundary_throw_synthesizes_release_once() {
        let mut ctl = controller(true);
        let mut surface = MockSurface::default();
        let t0 = Instant::now();
        ctl.on_press(press_point(&ctl), &mut surface);
        // Way past the left edge: more than a third of the control outside.
        ctl.on_move(Point::new(-60.0, 300.0), &mut surface, t0);
        assert!(!ctl.is_dragging(), "gesture should have ended");
        assert!(surface.events.contains(&Event::Capture(false)));
        // The real pointer-up arriving afterwards must change nothing.
        surface.events.clear();
        ctl.on_release(&mut surface, t0);
        assert!(surface.events.is_empty());
    }

    #[test]
    fn boundary_throw_disabled_keeps_dragging() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        ctl.on_press(press_point(&ctl), &mut surface);
        ctl.on_move(Point::new(-60.0, 300.0), &mut surface, Instant::now());
        assert!(ctl.is_dragging());
    }

    #[test]
    fn press_interrupts_running_animation() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        let t0 = Instant::now();
        ctl.on_press(press_point(&ctl), &mut surface);
        ctl.on_move(Point::new(400.0, 300.0), &mut surface, t0);
        ctl.on_release(&mut surface, t0);
        ctl.on_tick(&mut surface, t0 + Duration::from_millis(50));

        surface.events.clear();
        let again = press_point(&ctl);
        assert!(ctl.on_press(again, &mut surface));
        assert_eq!(
            surface.events,
            vec![
                Event::Animating(false),
                Event::Capture(true),
                Event::ResetRegion
            ]
        );
        // No further ticks apply once interrupted.
        surface.events.clear();
        ctl.on_tick(&mut surface, t0 + SNAP_ANIMATION);
        assert!(surface.events.is_empty());
    }

    #[test]
    fn resize_rederives_position_from_anchor() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        let t0 = Instant::now();
        // Dock to the top edge at x=400 so the anchor carries a scale.
        ctl.on_press(press_point(&ctl), &mut surface);
        ctl.on_move(Point::new(410.0, 20.0), &mut surface, t0);
        ctl.on_release(&mut surface, t0);
        ctl.on_tick(&mut surface, t0 + SNAP_ANIMATION);
        let before = ctl.touch_rect();
        assert_eq!(before.y, 2.0);

        surface.events.clear();
        let grown = Size::new(1600.0, 900.0);
        ctl.on_container_resize(grown, &mut surface);
        let after = ctl.touch_rect();
        assert_eq!(after.y, 2.0);
        // Same fractional position along the doubled edge.
        let scale_before = (before.x + 2.0 + TOUCH / 2.0) / CONTAINER.width;
        let scale_after = (after.x + 2.0 + TOUCH / 2.0) / grown.width;
        assert!((scale_before - scale_after).abs() < 1e-9);
        assert!(surface.events.contains(&Event::SetRegion(after)));
    }

    #[test]
    fn resize_during_drag_leaves_control_alone() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        ctl.on_press(press_point(&ctl), &mut surface);
        ctl.on_move(Point::new(400.0, 300.0), &mut surface, Instant::now());
        let before = ctl.touch_rect();
        surface.events.clear();
        ctl.on_container_resize(Size::new(1024.0, 768.0), &mut surface);
        assert_eq!(ctl.touch_rect(), before);
        assert_eq!(surface.events, vec![Event::ResetRegion]);
    }

    #[test]
    fn resize_cancels_animation_and_docks_immediately() {
        let mut ctl = controller(false);
        let mut surface = MockSurface::default();
        let t0 = Instant::now();
        ctl.on_press(press_point(&ctl), &mut surface);
        ctl.on_move(Point::new(400.0, 20.0), &mut surface, t0);
        ctl.on_release(&mut surface, t0);

        surface.events.clear();
        ctl.on_container_resize(Size::new(1024.0, 768.0), &mut surface);
        assert!(surface.events.contains(&Event::Animating(false)));
        assert_eq!(ctl.touch_rect().y, 2.0);
    }
}
