use bevy::prelude::*;

pub use pyramid::{
    buffer_size,
    reduction_level_count,
    PyramidOp,
    PyramidPlan,
    ReduceSource,
    TemporaryId,
    MAXIMUM_BUFFER_SIZE,
};
pub use render::{
    HiZBuffer,
    HiZPyramids,
    ViewPyramid,
    HIZ_TEXTURE_FORMAT,
};
pub use viewer::{
    clamp_lod,
    HiZViewer,
};

pub mod pyramid;
pub mod render;
pub mod utils;
pub mod viewer;


pub struct HiZPlugin;

impl Plugin for HiZPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            render::HiZRenderPlugin,
            viewer::HiZViewerPlugin,
        ));
    }
}
