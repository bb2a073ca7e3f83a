use bevy::{
    app::AppExit,
    core_pipeline::tonemapping::Tonemapping,
    prelude::*,
    render::view::Msaa,
};

use bevy_hiz::{
    HiZBuffer,
    HiZPlugin,
    HiZViewer,
};


// windowed smoke test: drives the full blit/reduce/copy chain and the
// viewer pass for a handful of frames, then exits. run with:
//   cargo run --bin test_pyramid --features testing

const TEST_FRAMES: u32 = 60;


fn main() {
    let mut app = App::new();

    app.insert_resource(ClearColor(Color::srgb_u8(0, 0, 0)));
    app.add_plugins(
        DefaultPlugins
            .set(WindowPlugin {
                primary_window: Some(Window {
                    mode: bevy::window::WindowMode::Windowed,
                    present_mode: bevy::window::PresentMode::AutoVsync,
                    resolution: (800.0, 600.0).into(),
                    title: "bevy_hiz pyramid test".to_string(),
                    ..default()
                }),
                ..default()
            }),
    );

    app.add_plugins(HiZPlugin);

    app.add_systems(Startup, setup);
    app.add_systems(Update, exit_after_frames);

    app.run();
}


fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::new(2.0, 2.0, 2.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.8, 0.7, 0.6))),
        Name::new("occluder"),
    ));

    commands.spawn((
        DirectionalLight::default(),
        Transform::from_rotation(Quat::from_rotation_x(-0.8)),
        Name::new("sun"),
    ));

    // 800x600 viewport: expects an 11-level pyramid; the out-of-range
    // viewer request exercises the clamp path
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 2.0, 6.0).looking_at(Vec3::ZERO, Vec3::Y),
        Tonemapping::None,
        Msaa::Off,
        HiZBuffer,
        HiZViewer { lod: 15 },
        Name::new("camera"),
    ));
}


fn exit_after_frames(
    mut frames: Local<u32>,
    mut exit: EventWriter<AppExit>,
) {
    *frames += 1;

    if *frames > TEST_FRAMES {
        exit.write(AppExit::Success);
    }
}
