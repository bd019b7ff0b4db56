//! Hair depth peeling
//!
//! Hair cards are drawn in two layer sets, top then under. For each set the
//! compositor peels up to `peel_count` layers: every layer is the nearest
//! hair surface strictly behind the previous one, lit in isolation and then
//! merged under a premultiplied accumulation target, so nearer layers stay
//! in front.
//!
//! Each set's [`CompositeOrder`] places the set as a whole behind or in front
//! of the sets composited before it. The planner peels the sets in
//! front-to-back placement order, so every layer goes under the single
//! running accumulation.
//!
//! The pass sequence is built as a [`PeelStep`] plan so it can be inspected
//! without a device; the renderer turns each step into GPU work.

use crate::core::config::CompositeOrder;
use crate::render::scene::BlendingMode;

/// Upper bound of the peel count
pub const MAX_PEEL_COUNT: u32 = 7;

pub const DEFAULT_PEEL_COUNT: u32 = 3;

/// Fragments with less alpha never become a layer
pub const HAIR_ALPHA_CUTOFF: f32 = 0.1;

/// Normalized view depth meaning "no previous layer"; the depth peel shader uses the same value
pub const FAR_SENTINEL: f32 = 1.0;

/// Number of peeled layers per set, always within `0..=MAX_PEEL_COUNT`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PeelCount(u32);

impl PeelCount {
    pub fn new(count: u32) -> Self {
        Self(count.min(MAX_PEEL_COUNT))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns false when already at the maximum
    pub fn increment(&mut self) -> bool {
        if self.0 >= MAX_PEEL_COUNT {
            return false;
        }
        self.0 += 1;
        true
    }

    /// Returns false when already zero
    pub fn decrement(&mut self) -> bool {
        if self.0 == 0 {
            return false;
        }
        self.0 -= 1;
        true
    }
}

impl Default for PeelCount {
    fn default() -> Self {
        Self(DEFAULT_PEEL_COUNT)
    }
}

/// One of the two hair card sets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerSet {
    Top,
    Under,
}

impl LayerSet {
    /// Sets in peel order
    pub const ALL: [LayerSet; 2] = [LayerSet::Top, LayerSet::Under];

    pub fn blending(self) -> BlendingMode {
        match self {
            LayerSet::Top => BlendingMode::HairTopLayer,
            LayerSet::Under => BlendingMode::HairUnderLayer,
        }
    }
}

/// A layer set as seen by the planner
#[derive(Clone, Copy, Debug)]
pub struct LayerSetPlan {
    pub set: LayerSet,
    pub order: CompositeOrder,
    /// Draw items in the set; empty sets record no passes
    pub items: usize,
}

/// One unit of GPU work in the peel sequence
///
/// Indices refer to the two view depth targets and the two accumulation
/// targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeelStep {
    /// Clear an accumulation target to transparent black
    ClearAccumulation { target: usize },
    /// Fill a view depth target with the far sentinel
    ResetPreviousDepth { target: usize },
    /// Copy scene depth into the hair depth buffer
    SeedHairDepth,
    /// Start the current view depth target from the previous one
    CarryPreviousDepth { from: usize, to: usize },
    /// Peel the nearest surface behind `previous` into `current`
    DepthPass { set: LayerSet, previous: usize, current: usize },
    /// Light the surfaces that passed the depth pass into the hair color target
    ColorPass { set: LayerSet },
    /// Merge the hair color target under accumulation `source` into `destination`
    CompositeLayer {
        set: LayerSet,
        source: usize,
        destination: usize,
    },
}

/// Steps of one frame and the accumulation target holding the result
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeelPlan {
    pub steps: Vec<PeelStep>,
    pub result: usize,
}

impl PeelPlan {
    /// Layers composited, over all sets
    pub fn layer_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, PeelStep::CompositeLayer { .. }))
            .count()
    }
}

/// Sets with items, nearest placement first
///
/// Over-composited sets come first with the last one frontmost, followed by
/// the under-composited sets in submission order.
fn front_to_back(sets: &[LayerSetPlan]) -> impl Iterator<Item = &LayerSetPlan> {
    let over = sets.iter().rev().filter(|s| s.order == CompositeOrder::BackToFront);
    let under = sets.iter().filter(|s| s.order == CompositeOrder::FrontToBack);
    over.chain(under).filter(|s| s.items > 0)
}

/// Build the pass sequence for one frame
///
/// `plan` is refilled in place so its step vector is reused across frames.
pub fn plan_peel(count: PeelCount, sets: &[LayerSetPlan], plan: &mut PeelPlan) {
    plan.steps.clear();
    let mut accumulation = 0;
    plan.steps.push(PeelStep::ClearAccumulation { target: accumulation });

    if count.get() > 0 {
        for layer_set in front_to_back(sets) {
            let (mut previous, mut current) = (0, 1);
            plan.steps.push(PeelStep::ResetPreviousDepth { target: previous });

            for _ in 0..count.get() {
                plan.steps.push(PeelStep::SeedHairDepth);
                plan.steps.push(PeelStep::CarryPreviousDepth { from: previous, to: current });
                plan.steps.push(PeelStep::DepthPass {
                    set: layer_set.set,
                    previous,
                    current,
                });
                plan.steps.push(PeelStep::ColorPass { set: layer_set.set });
                std::mem::swap(&mut previous, &mut current);

                plan.steps.push(PeelStep::CompositeLayer {
                    set: layer_set.set,
                    source: accumulation,
                    destination: 1 - accumulation,
                });
                accumulation = 1 - accumulation;
            }
        }
    }
    plan.result = accumulation;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec4;

    const FTB: CompositeOrder = CompositeOrder::FrontToBack;
    const BTF: CompositeOrder = CompositeOrder::BackToFront;

    /// A hair fragment covering one pixel
    #[derive(Clone, Copy, Debug)]
    struct HairSample {
        set: LayerSet,
        /// Normalized view depth, 0 at the eye and 1 at the far plane
        depth: f32,
        color: Vec4,
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct PixelPeel {
        /// Premultiplied
        color: Vec4,
        /// Distinct surfaces that became a layer
        surfaces: usize,
    }

    fn sample(set: LayerSet, depth: f32, color: Vec4) -> HairSample {
        HairSample { set, depth, color }
    }

    /// Straight-alpha `layer` behind a premultiplied accumulation
    fn under(accumulation: Vec4, layer: Vec4) -> Vec4 {
        let w = (1.0 - accumulation.w) * layer.w;
        (accumulation.truncate() + w * layer.truncate()).extend(accumulation.w + w)
    }

    /// Premultiplied `front` over premultiplied `back`
    fn over(front: Vec4, back: Vec4) -> Vec4 {
        front + (1.0 - front.w) * back
    }

    fn nearest_behind(samples: &[HairSample], set: LayerSet, previous: f32, scene_depth: f32) -> Option<HairSample> {
        samples
            .iter()
            .filter(|s| s.set == set && s.color.w >= HAIR_ALPHA_CUTOFF && s.depth < scene_depth)
            .filter(|s| previous >= FAR_SENTINEL || s.depth > previous)
            .min_by(|a, b| a.depth.total_cmp(&b.depth))
            .copied()
    }

    /// Peels one pixel set by set, merging each finished set at its order
    fn peel_pixel(samples: &[HairSample], scene_depth: f32, count: PeelCount, sets: &[(LayerSet, CompositeOrder)]) -> PixelPeel {
        let mut accumulation = Vec4::ZERO;
        let mut surfaces = 0;

        for &(set, order) in sets {
            let mut layers = Vec4::ZERO;
            let mut previous = FAR_SENTINEL;
            for _ in 0..count.get() {
                // No new surface: the previous depth carries forward
                if let Some(hit) = nearest_behind(samples, set, previous, scene_depth) {
                    previous = hit.depth;
                    surfaces += 1;
                    layers = under(layers, hit.color);
                }
            }
            accumulation = match order {
                CompositeOrder::FrontToBack => over(accumulation, layers),
                CompositeOrder::BackToFront => over(layers, accumulation),
            };
        }
        PixelPeel {
            color: accumulation,
            surfaces,
        }
    }

    /// Executes a plan for one pixel the way the GPU passes would
    fn run_plan(plan: &PeelPlan, samples: &[HairSample], scene_depth: f32) -> PixelPeel {
        let mut depth = [FAR_SENTINEL; 2];
        let mut accumulation = [Vec4::ZERO; 2];
        let mut layer = Vec4::ZERO;
        let mut surfaces = 0;

        for step in &plan.steps {
            match *step {
                PeelStep::ClearAccumulation { target } => accumulation[target] = Vec4::ZERO,
                PeelStep::ResetPreviousDepth { target } => depth[target] = FAR_SENTINEL,
                PeelStep::SeedHairDepth | PeelStep::ColorPass { .. } => {}
                PeelStep::CarryPreviousDepth { from, to } => depth[to] = depth[from],
                PeelStep::DepthPass { set, previous, current } => {
                    layer = match nearest_behind(samples, set, depth[previous], scene_depth) {
                        Some(hit) => {
                            depth[current] = hit.depth;
                            surfaces += 1;
                            hit.color
                        }
                        None => Vec4::ZERO,
                    };
                }
                PeelStep::CompositeLayer { source, destination, .. } => {
                    accumulation[destination] = under(accumulation[source], layer);
                }
            }
        }
        PixelPeel {
            color: accumulation[plan.result],
            surfaces,
        }
    }

    fn planned(count: u32, sets: &[(LayerSet, CompositeOrder)]) -> PeelPlan {
        let sets: Vec<LayerSetPlan> = sets
            .iter()
            .map(|&(set, order)| LayerSetPlan { set, order, items: 1 })
            .collect();
        let mut plan = PeelPlan::default();
        plan_peel(PeelCount::new(count), &sets, &mut plan);
        plan
    }

    fn both_sets() -> [(LayerSet, CompositeOrder); 2] {
        [(LayerSet::Top, FTB), (LayerSet::Under, FTB)]
    }

    fn stack(n: usize) -> Vec<HairSample> {
        (0..n)
            .map(|i| sample(LayerSet::Top, 0.1 + i as f32 * 0.05, Vec4::new(1.0, 0.5, 0.25, 0.5)))
            .collect()
    }

    fn assert_close(a: Vec4, b: Vec4) {
        assert!((a - b).abs().max_element() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn test_peel_count_clamping() {
        let mut count = PeelCount::default();
        assert_eq!(count.get(), 3);
        for _ in 0..4 {
            assert!(count.increment());
        }
        assert_eq!(count.get(), 7);
        assert!(!count.increment());
        assert_eq!(count.get(), 7);

        let mut zero = PeelCount::new(0);
        assert!(!zero.decrement());
        assert_eq!(zero.get(), 0);
        assert_eq!(PeelCount::new(12).get(), MAX_PEEL_COUNT);
    }

    #[test]
    fn test_zero_peels_is_transparent() {
        let result = peel_pixel(&stack(4), 1.0, PeelCount::new(0), &both_sets());
        assert_eq!(result.color, Vec4::ZERO);
        assert_eq!(result.surfaces, 0);

        let mut plan = PeelPlan::default();
        let sets = [LayerSetPlan { set: LayerSet::Top, order: FTB, items: 3 }];
        plan_peel(PeelCount::new(0), &sets, &mut plan);
        assert_eq!(plan.steps, vec![PeelStep::ClearAccumulation { target: 0 }]);
        assert_eq!(plan.result, 0);
        assert_eq!(run_plan(&plan, &stack(4), 1.0).color, Vec4::ZERO);
    }

    #[test]
    fn test_at_most_k_surfaces() {
        for k in 0..=MAX_PEEL_COUNT {
            let result = peel_pixel(&stack(5), 1.0, PeelCount::new(k), &both_sets());
            assert_eq!(result.surfaces, (k as usize).min(5));
            assert_eq!(run_plan(&planned(k, &both_sets()), &stack(5), 1.0).surfaces, result.surfaces);
        }
    }

    #[test]
    fn test_exhausted_pixel_does_not_repeel() {
        let samples = stack(2);
        let two = run_plan(&planned(2, &both_sets()), &samples, 1.0);
        let seven = run_plan(&planned(7, &both_sets()), &samples, 1.0);
        assert_eq!(seven.surfaces, 2);
        assert_eq!(two.color, seven.color);
    }

    #[test]
    fn test_near_surface_stays_in_front() {
        let near = sample(LayerSet::Top, 0.2, Vec4::new(1.0, 0.0, 0.0, 0.5));
        let far = sample(LayerSet::Top, 0.4, Vec4::new(0.0, 0.0, 1.0, 0.5));
        // near over far
        let expected = Vec4::new(0.5, 0.0, 0.25, 0.75);

        for order in [FTB, BTF] {
            // Submission order must not matter
            let result = run_plan(&planned(2, &[(LayerSet::Top, order)]), &[far, near], 1.0);
            assert_close(result.color, expected);
            assert!(result.color.x > result.color.z, "far layer drawn on top with {order:?}");
        }
    }

    #[test]
    fn test_back_to_front_set_goes_in_front() {
        let samples = [
            sample(LayerSet::Top, 0.3, Vec4::new(1.0, 0.0, 0.0, 1.0)),
            sample(LayerSet::Under, 0.2, Vec4::new(0.0, 1.0, 0.0, 1.0)),
        ];
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        let green = Vec4::new(0.0, 1.0, 0.0, 1.0);

        // Top is composited first and is opaque, so it hides the under set
        let behind = [(LayerSet::Top, FTB), (LayerSet::Under, FTB)];
        assert_eq!(peel_pixel(&samples, 1.0, PeelCount::new(1), &behind).color, red);
        assert_eq!(run_plan(&planned(1, &behind), &samples, 1.0).color, red);

        let in_front = [(LayerSet::Top, FTB), (LayerSet::Under, BTF)];
        assert_eq!(peel_pixel(&samples, 1.0, PeelCount::new(1), &in_front).color, green);
        let plan = planned(1, &in_front);
        assert_eq!(run_plan(&plan, &samples, 1.0).color, green);

        let first = plan.steps.iter().find_map(|s| match s {
            PeelStep::CompositeLayer { set, .. } => Some(*set),
            _ => None,
        });
        assert_eq!(first, Some(LayerSet::Under));
    }

    #[test]
    fn test_plan_matches_set_by_set_reference() {
        let samples = [
            sample(LayerSet::Top, 0.15, Vec4::new(0.9, 0.2, 0.1, 0.4)),
            sample(LayerSet::Top, 0.35, Vec4::new(0.1, 0.8, 0.3, 0.6)),
            sample(LayerSet::Top, 0.55, Vec4::new(0.2, 0.2, 0.9, 0.7)),
            sample(LayerSet::Under, 0.25, Vec4::new(0.6, 0.6, 0.1, 0.5)),
            sample(LayerSet::Under, 0.45, Vec4::new(0.3, 0.1, 0.7, 0.3)),
        ];
        for top in [FTB, BTF] {
            for under_set in [FTB, BTF] {
                let sets = [(LayerSet::Top, top), (LayerSet::Under, under_set)];
                for k in 0..=4 {
                    let reference = peel_pixel(&samples, 0.5, PeelCount::new(k), &sets);
                    let result = run_plan(&planned(k, &sets), &samples, 0.5);
                    assert_eq!(result.surfaces, reference.surfaces);
                    assert_close(result.color, reference.color);
                }
            }
        }
    }

    #[test]
    fn test_occluded_and_transparent_samples_skipped() {
        let samples = [
            sample(LayerSet::Top, 0.6, Vec4::ONE),
            sample(LayerSet::Top, 0.2, Vec4::new(1.0, 1.0, 1.0, 0.05)),
        ];
        let result = peel_pixel(&samples, 0.5, PeelCount::new(3), &both_sets());
        assert_eq!(result.surfaces, 0);
        assert_eq!(result.color, Vec4::ZERO);
    }

    #[test]
    fn test_plan_sequence() {
        let sets = [
            LayerSetPlan { set: LayerSet::Top, order: FTB, items: 1 },
            LayerSetPlan { set: LayerSet::Under, order: FTB, items: 0 },
        ];
        let mut plan = PeelPlan::default();
        plan_peel(PeelCount::new(2), &sets, &mut plan);

        use PeelStep::*;
        let top = LayerSet::Top;
        assert_eq!(
            plan.steps,
            vec![
                ClearAccumulation { target: 0 },
                ResetPreviousDepth { target: 0 },
                SeedHairDepth,
                CarryPreviousDepth { from: 0, to: 1 },
                DepthPass { set: top, previous: 0, current: 1 },
                ColorPass { set: top },
                CompositeLayer { set: top, source: 0, destination: 1 },
                SeedHairDepth,
                CarryPreviousDepth { from: 1, to: 0 },
                DepthPass { set: top, previous: 1, current: 0 },
                ColorPass { set: top },
                CompositeLayer { set: top, source: 1, destination: 0 },
            ]
        );
        assert_eq!(plan.result, 0);
        assert_eq!(plan.layer_count(), 2);
    }

    #[test]
    fn test_plan_reuses_steps_and_tracks_result() {
        let sets = [
            LayerSetPlan { set: LayerSet::Top, order: FTB, items: 4 },
            LayerSetPlan { set: LayerSet::Under, order: FTB, items: 2 },
        ];
        let mut plan = PeelPlan::default();
        plan_peel(PeelCount::new(3), &sets, &mut plan);
        assert_eq!(plan.layer_count(), 6);
        assert_eq!(plan.result, 0);

        let capacity = plan.steps.capacity();
        plan_peel(PeelCount::new(1), &sets, &mut plan);
        assert_eq!(plan.layer_count(), 2);
        assert_eq!(plan.steps.capacity(), capacity);

        plan_peel(PeelCount::new(3), &sets[..1], &mut plan);
        assert_eq!(plan.result, 1);
    }
}
