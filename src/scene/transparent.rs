//! Back-to-front ordering of alpha-blended objects

use glam::Vec3;

/// When the transparent draw order is recomputed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransparentSortPolicy {
    /// Sort once from the initial camera position. Cheap, but the order goes
    /// stale as the camera moves.
    #[default]
    OnceAtLoad,
    /// Re-sort from the current camera position every frame
    PerFrame,
}

/// Indices of `positions` ordered farthest first from `eye`.
///
/// The sort is stable: equal distances keep their input order, and no
/// element is ever dropped.
pub fn sort_back_to_front(positions: &[Vec3], eye: Vec3) -> Vec<usize> {
    let mut order: Vec<usize> = (0..positions.len()).collect();
    order.sort_by(|&a, &b| {
        let da = positions[a].distance_squared(eye);
        let db = positions[b].distance_squared(eye);
        db.total_cmp(&da)
    });
    order
}

/// Positions of transparent objects and their current draw order
#[derive(Debug, Clone)]
pub struct TransparentSet {
    positions: Vec<Vec3>,
    order: Vec<usize>,
    policy: TransparentSortPolicy,
}

impl TransparentSet {
    /// Build the set and sort it once from `eye`
    pub fn new(positions: Vec<Vec3>, eye: Vec3, policy: TransparentSortPolicy) -> Self {
        let order = sort_back_to_front(&positions, eye);
        Self {
            positions,
            order,
            policy,
        }
    }

    pub fn policy(&self) -> TransparentSortPolicy {
        self.policy
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Called once per frame; re-sorts only under [`TransparentSortPolicy::PerFrame`]
    pub fn update(&mut self, eye: Vec3) {
        if self.policy == TransparentSortPolicy::PerFrame {
            self.order = sort_back_to_front(&self.positions, eye);
        }
    }

    /// Indices in draw order, farthest first
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Positions in draw order, farthest first
    pub fn draw_order(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.order.iter().map(|&i| self.positions[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn on_axis(distances: &[f32]) -> Vec<Vec3> {
        distances.iter().map(|&d| Vec3::new(0.0, 0.0, -d)).collect()
    }

    #[test]
    fn test_farthest_first() {
        let positions = on_axis(&[0.9, 2.1, 0.6, 1.3]);
        let drawn: Vec<f32> = TransparentSet::new(positions, Vec3::ZERO, TransparentSortPolicy::OnceAtLoad)
            .draw_order()
            .map(|p| -p.z)
            .collect();
        assert_eq!(drawn, vec![2.1, 1.3, 0.9, 0.6]);
    }

    #[test]
    fn test_equal_distances_are_kept() {
        let positions = vec![
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ];
        assert_eq!(sort_back_to_front(&positions, Vec3::ZERO), vec![2, 0, 1]);
    }

    #[rstest]
    #[case::once(TransparentSortPolicy::OnceAtLoad, vec![0, 1])]
    #[case::per_frame(TransparentSortPolicy::PerFrame, vec![1, 0])]
    fn test_policy_controls_resort(#[case] policy: TransparentSortPolicy, #[case] expected: Vec<usize>) {
        let positions = on_axis(&[2.0, 1.0]);
        let mut set = TransparentSet::new(positions, Vec3::ZERO, policy);
        assert_eq!(set.order(), &[0, 1]);

        // Walk past both objects
        set.update(Vec3::new(0.0, 0.0, -3.0));
        assert_eq!(set.order(), expected.as_slice());
    }
}
