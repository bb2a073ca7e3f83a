use bevy::math::UVec2;

use bevy_hiz::{
    buffer_size,
    clamp_lod,
    PyramidOp,
    PyramidPlan,
    MAXIMUM_BUFFER_SIZE,
};


#[test]
fn end_to_end_800x600() {
    let plan = PyramidPlan::for_viewport(UVec2::new(800, 600)).unwrap();

    assert_eq!(plan.size(), 1024);
    assert_eq!(plan.level_count(), 10);
    assert_eq!(plan.total_levels(), 11);

    // a viewer request beyond the chain clamps to the last valid level
    assert_eq!(clamp_lod(15, plan.total_levels()), 10);
    assert_eq!(clamp_lod(0, plan.total_levels()), 0);
}

#[test]
fn end_to_end_degenerate_viewport() {
    // 1x1 resolves to a single-texel base with no reduction level: no
    // pyramid is built and the viewer falls back to pass-through
    assert_eq!(buffer_size(UVec2::new(1, 1)), 1);
    assert!(PyramidPlan::for_viewport(UVec2::new(1, 1)).is_none());
}

#[test]
fn end_to_end_maximum_clamp() {
    let plan = PyramidPlan::for_viewport(UVec2::new(4000, 3000)).unwrap();

    assert_eq!(plan.size(), MAXIMUM_BUFFER_SIZE);
    assert_eq!(plan.level_count(), 11);
}

#[test]
fn rebuilt_plans_share_their_shape() {
    let first = PyramidPlan::for_viewport(UVec2::new(1000, 540)).unwrap();
    let second = PyramidPlan::for_viewport(UVec2::new(1000, 540)).unwrap();

    assert_eq!(first, second);

    // one blit, then acquire/reduce/copy per level, plus the releases
    let reduces = first
        .ops()
        .iter()
        .filter(|op| matches!(op, PyramidOp::Reduce { .. }))
        .count();
    assert_eq!(reduces as u32, first.level_count());
}

#[test]
fn shrink_and_grow_restores_the_original_chain() {
    let original = PyramidPlan::for_viewport(UVec2::new(1920, 1080)).unwrap();
    let shrunk = PyramidPlan::for_viewport(UVec2::new(640, 480)).unwrap();
    let restored = PyramidPlan::for_viewport(UVec2::new(1920, 1080)).unwrap();

    assert_eq!(shrunk.size(), 1024);
    assert_eq!(original, restored);

    // every acquired temporary is released within the same sequence
    for plan in [&original, &shrunk, &restored] {
        let acquired = plan
            .ops()
            .iter()
            .filter(|op| matches!(op, PyramidOp::AcquireTemporary { .. }))
            .count();
        let released = plan
            .ops()
            .iter()
            .filter(|op| matches!(op, PyramidOp::ReleaseTemporary { .. }))
            .count();

        assert_eq!(acquired, released);
    }
}
