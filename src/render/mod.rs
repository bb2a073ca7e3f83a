use std::collections::HashMap;

use bevy::{
    asset::{
        load_internal_asset,
        weak_handle,
    },
    core_pipeline::{
        core_3d::{
            graph::{
                Core3d,
                Node3d,
            },
        },
        fullscreen_vertex_shader::fullscreen_shader_vertex_state,
    },
    ecs::query::QueryItem,
    prelude::*,
    render::{
        camera::ExtractedCamera,
        extract_component::{
            ExtractComponent,
            ExtractComponentPlugin,
        },
        render_graph::{
            NodeRunError,
            RenderGraphApp,
            RenderGraphContext,
            RenderLabel,
            ViewNode,
            ViewNodeRunner,
        },
        render_resource::*,
        renderer::{
            RenderContext,
            RenderDevice,
        },
        view::{
            Msaa,
            ViewDepthTexture,
        },
        Render,
        RenderApp,
        RenderSet,
    },
};

use crate::pyramid::{
    PyramidOp,
    PyramidPlan,
    ReduceSource,
    TemporaryId,
};


const HIZ_BLIT_SHADER_HANDLE: Handle<Shader> =
    weak_handle!("0d2569db-6f94-4ab5-85a6-52cdbd1c8797");
const HIZ_REDUCE_SHADER_HANDLE: Handle<Shader> =
    weak_handle!("9b5a8c1e-4e3d-4cf6-9a47-3f9c6de00b11");

/// Storage format of the pyramid and its transient targets: two linear
/// half channels carrying a (nearest, farthest) depth pair.
pub const HIZ_TEXTURE_FORMAT: TextureFormat = TextureFormat::Rg16Float;


/// Enables hi-z pyramid construction for a camera.
///
/// The pyramid is rebuilt from the camera's depth every frame and is
/// readable from the render world through [`HiZPyramids`].
#[derive(Component, Clone, Copy, Debug, Default, Reflect, ExtractComponent)]
#[reflect(Component, Default)]
pub struct HiZBuffer;


#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub enum HiZNode {
    BuildPyramid,
    Viewer,
}


#[derive(Default)]
pub struct HiZRenderPlugin;

impl Plugin for HiZRenderPlugin {
    fn build(&self, app: &mut App) {
        load_internal_asset!(
            app,
            HIZ_BLIT_SHADER_HANDLE,
            "hiz_blit.wgsl",
            Shader::from_wgsl
        );

        load_internal_asset!(
            app,
            HIZ_REDUCE_SHADER_HANDLE,
            "hiz_reduce.wgsl",
            Shader::from_wgsl
        );

        app.register_type::<HiZBuffer>();
        app.add_plugins(ExtractComponentPlugin::<HiZBuffer>::default());
        app.add_systems(PostUpdate, configure_depth_texture_usage);

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .init_resource::<HiZPyramids>()
            .add_systems(
                Render,
                (
                    prepare_hiz_pyramids.in_set(RenderSet::PrepareResources),
                    prepare_hiz_pipelines.in_set(RenderSet::PrepareResources),
                ),
            )
            .add_render_graph_node::<ViewNodeRunner<HiZBuildNode>>(
                Core3d,
                HiZNode::BuildPyramid,
            )
            .add_render_graph_edges(
                Core3d,
                (
                    Node3d::EndMainPass,
                    HiZNode::BuildPyramid,
                    Node3d::Tonemapping,
                ),
            );
    }

    fn finish(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .init_resource::<HiZPipelines>()
            .init_resource::<SpecializedRenderPipelines<HiZPipelines>>();
    }
}


/// The blit pass samples the camera's depth texture, so the camera has
/// to keep its depth texture bindable.
fn configure_depth_texture_usage(
    mut cameras: Query<
        &mut Camera3d,
        (With<HiZBuffer>, Or<(Added<HiZBuffer>, Added<Camera3d>)>),
    >,
) {
    for mut camera in &mut cameras {
        camera.depth_texture_usages =
            (TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING).into();
    }
}


/// The mip-chained storage and cached command plan of one view's pyramid.
pub struct ViewPyramid {
    pub texture: Texture,
    /// View over the whole mip chain, for consumers.
    pub all_mips: TextureView,
    /// One render-attachment/binding view per mip level.
    pub mip_views: Vec<TextureView>,
    /// Rebuilt only when `texture` is reallocated; replayed every frame.
    pub plan: PyramidPlan,
}

impl ViewPyramid {
    fn new(render_device: &RenderDevice, plan: PyramidPlan) -> Self {
        let size = plan.size();

        let texture = render_device.create_texture(&TextureDescriptor {
            label: Some("hiz_pyramid"),
            size: Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: plan.total_levels(),
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: HIZ_TEXTURE_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT
                | TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let all_mips = texture.create_view(&TextureViewDescriptor {
            label: Some("hiz_pyramid_view"),
            ..default()
        });

        let mip_views = (0..plan.total_levels())
            .map(|level| {
                texture.create_view(&TextureViewDescriptor {
                    label: Some("hiz_pyramid_mip_view"),
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    ..default()
                })
            })
            .collect();

        Self {
            texture,
            all_mips,
            mip_views,
            plan,
        }
    }

    /// Side length of the base level.
    pub fn size(&self) -> u32 {
        self.plan.size()
    }

    /// Usable mip levels, base level included.
    pub fn total_levels(&self) -> u32 {
        self.plan.total_levels()
    }
}


/// Pyramid storage per view, exclusively owned by the builder.
///
/// An absent entry means no pyramid was produced for that view this
/// frame (degenerate viewport, pipelines still compiling, or no
/// [`HiZBuffer`]); consumers treat absence as "no pyramid".
#[derive(Resource, Default)]
pub struct HiZPyramids {
    views: HashMap<Entity, ViewPyramid>,
}

impl HiZPyramids {
    pub fn get(&self, view: Entity) -> Option<&ViewPyramid> {
        self.views.get(&view)
    }
}


/// Sizes, (re)allocates, and releases pyramid storage for every hi-z
/// view, rebuilding the cached command plan only on reallocation.
pub fn prepare_hiz_pyramids(
    render_device: Res<RenderDevice>,
    mut pyramids: ResMut<HiZPyramids>,
    views: Query<(Entity, &ExtractedCamera), With<HiZBuffer>>,
) {
    for (entity, camera) in &views {
        let viewport = camera.physical_viewport_size.unwrap_or(UVec2::ZERO);

        let Some(plan) = PyramidPlan::for_viewport(viewport) else {
            // degenerate viewport: release storage and skip this frame
            pyramids.views.remove(&entity);
            continue;
        };

        let unchanged = pyramids
            .views
            .get(&entity)
            .is_some_and(|pyramid| pyramid.size() == plan.size());
        if unchanged {
            continue;
        }

        // release before reallocating; the plan is rebuilt with the storage
        pyramids.views.remove(&entity);

        debug!(
            "allocating hi-z pyramid: {0}x{0}, {1} mip levels",
            plan.size(),
            plan.total_levels(),
        );

        pyramids
            .views
            .insert(entity, ViewPyramid::new(&render_device, plan));
    }

    // release storage owned by views that no longer build a pyramid
    pyramids.views.retain(|entity, _| views.contains(*entity));
}


#[derive(Resource)]
pub struct HiZPipelines {
    pub blit_layout: BindGroupLayout,
    pub blit_layout_multisampled: BindGroupLayout,
    pub reduce_layout: BindGroupLayout,
}

impl FromWorld for HiZPipelines {
    fn from_world(world: &mut World) -> Self {
        let render_device = world.resource::<RenderDevice>();

        let depth_entry = |multisampled| BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStages::FRAGMENT,
            ty: BindingType::Texture {
                sample_type: TextureSampleType::Depth,
                view_dimension: TextureViewDimension::D2,
                multisampled,
            },
            count: None,
        };

        let blit_layout = render_device
            .create_bind_group_layout(Some("hiz_blit_layout"), &[depth_entry(false)]);

        let blit_layout_multisampled = render_device.create_bind_group_layout(
            Some("hiz_blit_layout_multisampled"),
            &[depth_entry(true)],
        );

        let reduce_layout = render_device.create_bind_group_layout(
            Some("hiz_reduce_layout"),
            &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: false },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        );

        Self {
            blit_layout,
            blit_layout_multisampled,
            reduce_layout,
        }
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HiZPipelineKey {
    Blit { multisampled: bool },
    Reduce,
}

impl SpecializedRenderPipeline for HiZPipelines {
    type Key = HiZPipelineKey;

    fn specialize(&self, key: Self::Key) -> RenderPipelineDescriptor {
        let (label, layout, shader, entry_point, shader_defs): (
            &str,
            BindGroupLayout,
            Handle<Shader>,
            &str,
            Vec<ShaderDefVal>,
        ) = match key {
            HiZPipelineKey::Blit {
                multisampled: false,
            } => (
                "hiz_blit_pipeline",
                self.blit_layout.clone(),
                HIZ_BLIT_SHADER_HANDLE,
                "blit",
                vec![],
            ),
            HiZPipelineKey::Blit { multisampled: true } => (
                "hiz_blit_pipeline_multisampled",
                self.blit_layout_multisampled.clone(),
                HIZ_BLIT_SHADER_HANDLE,
                "blit",
                vec!["MULTISAMPLED".into()],
            ),
            HiZPipelineKey::Reduce => (
                "hiz_reduce_pipeline",
                self.reduce_layout.clone(),
                HIZ_REDUCE_SHADER_HANDLE,
                "reduce",
                vec![],
            ),
        };

        RenderPipelineDescriptor {
            label: Some(label.to_string().into()),
            layout: vec![layout],
            push_constant_ranges: vec![],
            vertex: fullscreen_shader_vertex_state(),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: MultisampleState::default(),
            fragment: Some(FragmentState {
                shader,
                shader_defs,
                entry_point: entry_point.to_string().into(),
                targets: vec![Some(ColorTargetState {
                    format: HIZ_TEXTURE_FORMAT,
                    blend: None,
                    write_mask: ColorWrites::ALL,
                })],
            }),
            zero_initialize_workgroup_memory: false,
        }
    }
}


/// The specialized pipelines of one hi-z view.
#[derive(Component)]
pub struct HiZViewPipelines {
    pub blit: CachedRenderPipelineId,
    pub reduce: CachedRenderPipelineId,
}

pub fn prepare_hiz_pipelines(
    mut commands: Commands,
    pipeline_cache: Res<PipelineCache>,
    mut pipelines: ResMut<SpecializedRenderPipelines<HiZPipelines>>,
    hiz_pipelines: Res<HiZPipelines>,
    views: Query<(Entity, &Msaa), With<HiZBuffer>>,
) {
    for (entity, msaa) in &views {
        let blit = pipelines.specialize(
            &pipeline_cache,
            &hiz_pipelines,
            HiZPipelineKey::Blit {
                multisampled: msaa.samples() > 1,
            },
        );
        let reduce =
            pipelines.specialize(&pipeline_cache, &hiz_pipelines, HiZPipelineKey::Reduce);

        commands
            .entity(entity)
            .insert(HiZViewPipelines { blit, reduce });
    }
}


struct TransientTarget {
    texture: Texture,
    view: TextureView,
}

/// Replays the view's cached [`PyramidPlan`] into the frame's command
/// encoder, repopulating every mip level from the current depth source.
#[derive(Default)]
pub struct HiZBuildNode;

impl ViewNode for HiZBuildNode {
    type ViewQuery = (
        Entity,
        &'static ViewDepthTexture,
        &'static HiZViewPipelines,
    );

    fn run<'w>(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext<'w>,
        (entity, depth, view_pipelines): QueryItem<'w, Self::ViewQuery>,
        world: &'w World,
    ) -> Result<(), NodeRunError> {
        let pyramids = world.resource::<HiZPyramids>();
        let pipelines = world.resource::<HiZPipelines>();
        let pipeline_cache = world.resource::<PipelineCache>();

        // no storage was prepared for this view this frame
        let Some(pyramid) = pyramids.get(entity) else {
            return Ok(());
        };

        // pipelines still compiling or unsupported: no pyramid this frame
        let (Some(blit_pipeline), Some(reduce_pipeline)) = (
            pipeline_cache.get_render_pipeline(view_pipelines.blit),
            pipeline_cache.get_render_pipeline(view_pipelines.reduce),
        ) else {
            return Ok(());
        };

        let blit_layout = if depth.texture.sample_count() > 1 {
            &pipelines.blit_layout_multisampled
        } else {
            &pipelines.blit_layout
        };

        let render_device = render_context.render_device().clone();
        let mut temporaries: HashMap<TemporaryId, TransientTarget> = HashMap::new();

        for op in pyramid.plan.ops() {
            match op {
                PyramidOp::BlitDepth => {
                    let bind_group = render_device.create_bind_group(
                        "hiz_blit_bind_group",
                        blit_layout,
                        &[BindGroupEntry {
                            binding: 0,
                            resource: BindingResource::TextureView(depth.view()),
                        }],
                    );

                    let mut pass =
                        render_context.begin_tracked_render_pass(RenderPassDescriptor {
                            label: Some("hiz_blit"),
                            color_attachments: &[Some(RenderPassColorAttachment {
                                view: &pyramid.mip_views[0],
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

                    pass.set_render_pipeline(blit_pipeline);
                    pass.set_bind_group(0, &bind_group, &[]);
                    pass.draw(0..3, 0..1);
                }
                PyramidOp::AcquireTemporary { id, size } => {
                    let texture = render_device.create_texture(&TextureDescriptor {
                        label: Some("hiz_temporary"),
                        size: Extent3d {
                            width: *size,
                            height: *size,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: TextureDimension::D2,
                        format: HIZ_TEXTURE_FORMAT,
                        usage: TextureUsages::RENDER_ATTACHMENT
                            | TextureUsages::TEXTURE_BINDING
                            | TextureUsages::COPY_SRC,
                        view_formats: &[],
                    });
                    let view = texture.create_view(&TextureViewDescriptor::default());

                    temporaries.insert(*id, TransientTarget { texture, view });
                }
                PyramidOp::Reduce { source, target } => {
                    let source_view = match source {
                        ReduceSource::BaseLevel => &pyramid.mip_views[0],
                        ReduceSource::Temporary(id) => &temporaries[id].view,
                    };

                    let bind_group = render_device.create_bind_group(
                        "hiz_reduce_bind_group",
                        &pipelines.reduce_layout,
                        &[BindGroupEntry {
                            binding: 0,
                            resource: BindingResource::TextureView(source_view),
                        }],
                    );

                    let mut pass =
                        render_context.begin_tracked_render_pass(RenderPassDescriptor {
                            label: Some("hiz_reduce"),
                            color_attachments: &[Some(RenderPassColorAttachment {
                                view: &temporaries[target].view,
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

                    pass.set_render_pipeline(reduce_pipeline);
                    pass.set_bind_group(0, &bind_group, &[]);
                    pass.draw(0..3, 0..1);
                }
                PyramidOp::CopyToLevel {
                    source,
                    level,
                    size,
                } => {
                    render_context.command_encoder().copy_texture_to_texture(
                        temporaries[source].texture.as_image_copy(),
                        wgpu::TexelCopyTextureInfo {
                            texture: &pyramid.texture,
                            mip_level: *level,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        Extent3d {
                            width: *size,
                            height: *size,
                            depth_or_array_layers: 1,
                        },
                    );
                }
                PyramidOp::ReleaseTemporary { id } => {
                    temporaries.remove(id);
                }
            }
        }

        debug_assert!(temporaries.is_empty(), "transient targets leaked");

        Ok(())
    }
}
