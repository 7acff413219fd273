use serde::Serialize;

/// Target currently on screen, in integer screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Target {
    pub x: i32,
    pub y: i32,
    pub size: u32,
    pub on_left_side: bool,
}

/// Geometry of the previously shown target, kept for log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FormerTarget {
    pub x: i32,
    pub y: i32,
    pub size: u32,
}

impl Target {
    pub fn radius(&self) -> f64 {
        self.size as f64 / 2.0
    }

    pub fn center_distance(&self, x: i32, y: i32) -> f64 {
        let dx = (x - self.x) as f64;
        let dy = (y - self.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Distance to the nearest point of the target boundary, zero inside.
    pub fn edge_distance(&self, x: i32, y: i32) -> f64 {
        (self.center_distance(x, y) - self.radius()).max(0.0)
    }

    /// Hit test. The boundary itself counts as a hit.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.center_distance(x, y) <= self.radius()
    }

    pub fn former(&self) -> FormerTarget {
        FormerTarget {
            x: self.x,
            y: self.y,
            size: self.size,
        }
    }
}

/// Edge-entry and overshoot bookkeeping for a single target.
///
/// A fresh value is installed on every placement so nothing carries over
/// from the previous target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeTracking {
    entered_at_ms: Option<u64>,
    inside_last_frame: bool,
    overshoots: u32,
}

impl EdgeTracking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one logged frame.
    pub fn observe(&mut self, edge_distance: f64, now_ms: u64) {
        let inside = edge_distance == 0.0;
        if inside && self.entered_at_ms.is_none() {
            self.entered_at_ms = Some(now_ms);
        }
        if self.inside_last_frame && !inside {
            self.overshoots += 1;
        }
        self.inside_last_frame = inside;
    }

    pub fn has_entered(&self) -> bool {
        self.entered_at_ms.is_some()
    }

    pub fn entered_at_ms(&self) -> Option<u64> {
        self.entered_at_ms
    }

    /// Milliseconds since the cursor first touched the target, or -1.
    pub fn time_since_edge(&self, now_ms: u64) -> i64 {
        self.entered_at_ms
            .map(|t| now_ms.saturating_sub(t) as i64)
            .unwrap_or(-1)
    }

    pub fn overshoots(&self) -> u32 {
        self.overshoots
    }

    pub fn inside_last_frame(&self) -> bool {
        self.inside_last_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target {
            x: 100,
            y: 50,
            size: 40,
            on_left_side: true,
        }
    }

    #[test]
    fn boundary_click_is_a_hit() {
        let t = target();
        assert!(t.contains(120, 50));
        assert!(t.contains(100, 30));
        assert!(!t.contains(121, 50));
    }

    #[test]
    fn edge_distance_is_zero_inside() {
        let t = target();
        assert_eq!(t.edge_distance(105, 55), 0.0);
        assert_eq!(t.edge_distance(130, 50), 10.0);
        assert_eq!(t.center_distance(103, 54), 5.0);
    }

    #[test]
    fn overshoot_counts_only_inside_to_outside() {
        let mut edge = EdgeTracking::new();
        // outside, outside, inside, inside, outside, outside, inside, outside
        for (i, d) in [5.0, 3.0, 0.0, 0.0, 2.0, 4.0, 0.0, 1.0].into_iter().enumerate() {
            edge.observe(d, i as u64 * 16);
        }
        assert_eq!(edge.overshoots(), 2);
    }

    #[test]
    fn time_since_edge_latches_first_contact() {
        let mut edge = EdgeTracking::new();
        edge.observe(12.0, 100);
        assert_eq!(edge.time_since_edge(100), -1);

        edge.observe(0.0, 116);
        assert_eq!(edge.time_since_edge(116), 0);

        edge.observe(3.0, 132);
        edge.observe(0.0, 148);
        assert_eq!(edge.entered_at_ms(), Some(116));
        assert_eq!(edge.time_since_edge(160), 44);
    }
}
