use bevy::{
    asset::{
        load_internal_asset,
        weak_handle,
    },
    core_pipeline::{
        core_3d::graph::{
            Core3d,
            Node3d,
        },
        fullscreen_vertex_shader::fullscreen_shader_vertex_state,
    },
    ecs::query::QueryItem,
    prelude::*,
    render::{
        extract_component::{
            ExtractComponent,
            ExtractComponentPlugin,
        },
        render_graph::{
            NodeRunError,
            RenderGraphApp,
            RenderGraphContext,
            ViewNode,
            ViewNodeRunner,
        },
        render_resource::*,
        renderer::{
            RenderContext,
            RenderDevice,
        },
        view::ViewTarget,
        Render,
        RenderApp,
        RenderSet,
    },
};
use static_assertions::const_assert_eq;

use crate::render::{
    HiZNode,
    HiZPyramids,
};


const HIZ_VIEWER_SHADER_HANDLE: Handle<Shader> =
    weak_handle!("f40a1f2c-83d7-4ab3-b0c8-6ed11d54de21");


/// Renders a single pyramid level full-screen for inspection.
///
/// `lod` is clamped into the pyramid's valid range; with no pyramid
/// built for the camera, the image is passed through unmodified.
#[derive(Component, Clone, Copy, Debug, Default, Reflect, ExtractComponent)]
#[reflect(Component, Default)]
pub struct HiZViewer {
    pub lod: u32,
}

/// Clamp a requested LOD index into `[0, total_levels - 1]`.
pub fn clamp_lod(requested: u32, total_levels: u32) -> u32 {
    requested.min(total_levels.saturating_sub(1))
}


#[derive(Default)]
pub struct HiZViewerPlugin;

impl Plugin for HiZViewerPlugin {
    fn build(&self, app: &mut App) {
        load_internal_asset!(
            app,
            HIZ_VIEWER_SHADER_HANDLE,
            "viewer.wgsl",
            Shader::from_wgsl
        );

        app.register_type::<HiZViewer>();
        app.add_plugins(ExtractComponentPlugin::<HiZViewer>::default());

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .add_systems(
                Render,
                prepare_viewer_pipelines.in_set(RenderSet::PrepareResources),
            )
            .add_render_graph_node::<ViewNodeRunner<HiZViewerNode>>(Core3d, HiZNode::Viewer)
            .add_render_graph_edges(
                Core3d,
                (
                    HiZNode::BuildPyramid,
                    HiZNode::Viewer,
                    Node3d::Tonemapping,
                ),
            );
    }

    fn finish(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .init_resource::<HiZViewerPipeline>()
            .init_resource::<SpecializedRenderPipelines<HiZViewerPipeline>>();
    }
}


#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct HiZViewerUniform {
    lod: u32,
    _padding: [u32; 3],
}

const_assert_eq!(std::mem::size_of::<HiZViewerUniform>(), 16);


#[derive(Resource)]
pub struct HiZViewerPipeline {
    pub layout: BindGroupLayout,
}

impl FromWorld for HiZViewerPipeline {
    fn from_world(world: &mut World) -> Self {
        let render_device = world.resource::<RenderDevice>();

        let layout = render_device.create_bind_group_layout(
            Some("hiz_viewer_layout"),
            &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: false },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: BufferSize::new(
                            std::mem::size_of::<HiZViewerUniform>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        );

        Self { layout }
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HiZViewerPipelineKey {
    pub target_format: TextureFormat,
}

impl SpecializedRenderPipeline for HiZViewerPipeline {
    type Key = HiZViewerPipelineKey;

    fn specialize(&self, key: Self::Key) -> RenderPipelineDescriptor {
        RenderPipelineDescriptor {
            label: Some("hiz_viewer_pipeline".into()),
            layout: vec![self.layout.clone()],
            push_constant_ranges: vec![],
            vertex: fullscreen_shader_vertex_state(),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: MultisampleState::default(),
            fragment: Some(FragmentState {
                shader: HIZ_VIEWER_SHADER_HANDLE,
                shader_defs: vec![],
                entry_point: "viewer".into(),
                targets: vec![Some(ColorTargetState {
                    format: key.target_format,
                    blend: None,
                    write_mask: ColorWrites::ALL,
                })],
            }),
            zero_initialize_workgroup_memory: false,
        }
    }
}


#[derive(Component)]
pub struct HiZViewerPipelineId(pub CachedRenderPipelineId);

pub fn prepare_viewer_pipelines(
    mut commands: Commands,
    pipeline_cache: Res<PipelineCache>,
    mut pipelines: ResMut<SpecializedRenderPipelines<HiZViewerPipeline>>,
    viewer_pipeline: Res<HiZViewerPipeline>,
    views: Query<(Entity, &ViewTarget), With<HiZViewer>>,
) {
    for (entity, view_target) in &views {
        let id = pipelines.specialize(
            &pipeline_cache,
            &viewer_pipeline,
            HiZViewerPipelineKey {
                target_format: view_target.main_texture_format(),
            },
        );

        commands.entity(entity).insert(HiZViewerPipelineId(id));
    }
}


/// Draws the clamped pyramid level full-screen, or leaves the image
/// untouched when no pyramid exists for the view.
#[derive(Default)]
pub struct HiZViewerNode;

impl ViewNode for HiZViewerNode {
    type ViewQuery = (
        Entity,
        &'static ViewTarget,
        &'static HiZViewer,
        &'static HiZViewerPipelineId,
    );

    fn run<'w>(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext<'w>,
        (entity, view_target, viewer, pipeline_id): QueryItem<'w, Self::ViewQuery>,
        world: &'w World,
    ) -> Result<(), NodeRunError> {
        let pyramids = world.resource::<HiZPyramids>();
        let viewer_pipeline = world.resource::<HiZViewerPipeline>();
        let pipeline_cache = world.resource::<PipelineCache>();

        // no pyramid this frame: pass the image through unmodified
        let Some(pyramid) = pyramids.get(entity) else {
            return Ok(());
        };

        let Some(pipeline) = pipeline_cache.get_render_pipeline(pipeline_id.0) else {
            return Ok(());
        };

        let uniform = HiZViewerUniform {
            lod: clamp_lod(viewer.lod, pyramid.total_levels()),
            _padding: [0; 3],
        };

        let render_device = render_context.render_device().clone();
        let uniform_buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("hiz_viewer_uniform"),
            contents: bytemuck::bytes_of(&uniform),
            usage: BufferUsages::UNIFORM,
        });

        let bind_group = render_device.create_bind_group(
            "hiz_viewer_bind_group",
            &viewer_pipeline.layout,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&pyramid.all_mips),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        );

        let post_process = view_target.post_process_write();

        let mut pass = render_context.begin_tracked_render_pass(RenderPassDescriptor {
            label: Some("hiz_viewer"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: post_process.destination,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(wgpu::Color::BLACK),
                    store: StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_render_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::clamp_lod;

    #[test]
    fn lod_clamps_into_the_valid_range() {
        // 11 usable levels: indices 0..=10
        assert_eq!(clamp_lod(0, 11), 0);
        assert_eq!(clamp_lod(10, 11), 10);
        assert_eq!(clamp_lod(15, 11), 10);
        assert_eq!(clamp_lod(u32::MAX, 11), 10);
    }

    #[test]
    fn lod_of_an_empty_pyramid_is_zero() {
        assert_eq!(clamp_lod(3, 0), 0);
    }
}
