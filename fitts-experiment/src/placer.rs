use fitts_core::{Condition, EdgeTracking, FormerTarget, Target};

/// Positions targets on the horizontal midline, alternating left and right
/// of the screen centre on every placement.
#[derive(Debug, Clone)]
pub struct TargetPlacer {
    screen_width: u32,
    screen_height: u32,
    current: Option<Target>,
    former: FormerTarget,
    next_on_left: bool,
    shown_at_ms: u64,
    edge: EdgeTracking,
}

impl TargetPlacer {
    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        Self {
            screen_width,
            screen_height,
            current: None,
            former: FormerTarget::default(),
            next_on_left: true,
            shown_at_ms: 0,
            edge: EdgeTracking::new(),
        }
    }

    /// Replaces the current target with one for `condition`.
    pub fn place(&mut self, condition: Condition, now_ms: u64) -> Target {
        self.former = self.current.map(|t| t.former()).unwrap_or_default();

        let size = condition.width;
        let center_x = (self.screen_width / 2) as i32;
        let offset = (condition.amplitude / 2) as i32;
        let on_left_side = self.next_on_left;
        let x = if on_left_side {
            center_x - offset
        } else {
            center_x + offset
        };

        let half = (size / 2) as i32;
        let max_x = self.screen_width as i32 - half;
        let x = if max_x >= half { x.clamp(half, max_x) } else { center_x };

        let target = Target {
            x,
            y: (self.screen_height / 2) as i32,
            size,
            on_left_side,
        };

        self.current = Some(target);
        self.next_on_left = !on_left_side;
        self.shown_at_ms = now_ms;
        self.edge = EdgeTracking::new();

        tracing::debug!(
            x = target.x,
            y = target.y,
            size = target.size,
            amplitude = condition.amplitude,
            left = on_left_side,
            "target placed"
        );
        target
    }

    pub fn current(&self) -> Option<&Target> {
        self.current.as_ref()
    }

    pub fn former(&self) -> FormerTarget {
        self.former
    }

    pub fn shown_at_ms(&self) -> u64 {
        self.shown_at_ms
    }

    pub fn edge(&self) -> &EdgeTracking {
        &self.edge
    }

    pub fn edge_mut(&mut self) -> &mut EdgeTracking {
        &mut self.edge
    }

    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    /// New targets use the new bounds; the one on screen stays where it is.
    pub fn resize(&mut self, screen_width: u32, screen_height: u32) {
        self.screen_width = screen_width;
        self.screen_height = screen_height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_alternate_on_every_placement() {
        let mut placer = TargetPlacer::new(1920, 1080);
        let mut last: Option<bool> = None;
        for (i, amplitude) in [200, 800, 400, 400, 600, 200].into_iter().enumerate() {
            let t = placer.place(Condition::new(amplitude, 50), i as u64);
            if let Some(prev) = last {
                assert_ne!(prev, t.on_left_side);
            }
            last = Some(t.on_left_side);
        }
    }

    #[test]
    fn geometry_follows_condition() {
        let mut placer = TargetPlacer::new(1920, 1080);
        let left = placer.place(Condition::new(400, 30), 0);
        assert_eq!((left.x, left.y, left.size), (760, 540, 30));
        assert!(left.on_left_side);

        let right = placer.place(Condition::new(600, 70), 10);
        assert_eq!((right.x, right.y, right.size), (1260, 540, 70));
        assert_eq!(placer.former(), FormerTarget { x: 760, y: 540, size: 30 });
        assert_eq!(placer.shown_at_ms(), 10);
    }

    #[test]
    fn first_former_target_is_zeroed() {
        let mut placer = TargetPlacer::new(800, 400);
        placer.place(Condition::new(200, 30), 0);
        assert_eq!(placer.former(), FormerTarget::default());
    }

    #[test]
    fn targets_stay_on_small_screens() {
        let mut placer = TargetPlacer::new(800, 400);
        let t = placer.place(Condition::new(800, 70), 0);
        assert_eq!(t.x, 35);
        let t = placer.place(Condition::new(800, 70), 0);
        assert_eq!(t.x, 765);
    }

    #[test]
    fn placement_resets_edge_tracking() {
        let mut placer = TargetPlacer::new(800, 400);
        placer.place(Condition::new(200, 30), 0);
        placer.edge_mut().observe(0.0, 5);
        placer.edge_mut().observe(4.0, 21);
        assert_eq!(placer.edge().overshoots(), 1);

        placer.place(Condition::new(200, 30), 30);
        assert_eq!(placer.edge(), &EdgeTracking::new());
    }
}
