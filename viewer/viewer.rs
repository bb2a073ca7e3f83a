use bevy::{
    app::AppExit,
    diagnostic::{
        DiagnosticsStore,
        FrameTimeDiagnosticsPlugin,
    },
    prelude::*,
};
use bevy_args::{
    parse_args,
    BevyArgsPlugin,
};
use bevy_panorbit_camera::{
    PanOrbitCamera,
    PanOrbitCameraPlugin,
};

use bevy_hiz::{
    utils::{
        setup_hooks,
        HiZViewerArgs,
    },
    HiZBuffer,
    HiZPlugin,
    HiZViewer,
};


fn viewer_app() {
    let config = parse_args::<HiZViewerArgs>();
    let mut app = App::new();

    app.insert_resource(ClearColor(Color::srgb_u8(0, 0, 0)));
    app.add_plugins(
        DefaultPlugins
            .set(ImagePlugin::default_nearest())
            .set(WindowPlugin {
                primary_window: Some(Window {
                    mode: bevy::window::WindowMode::Windowed,
                    present_mode: bevy::window::PresentMode::AutoVsync,
                    prevent_default_event_handling: false,
                    resolution: (config.width, config.height).into(),
                    title: config.name.clone(),
                    ..default()
                }),
                ..default()
            }),
    );
    app.add_plugins(BevyArgsPlugin::<HiZViewerArgs>::default());
    app.add_plugins(PanOrbitCameraPlugin);
    app.add_plugins(HiZPlugin);

    if config.press_esc_close {
        app.add_systems(Update, esc_close);
    }

    if config.show_overlay {
        app.add_plugins(FrameTimeDiagnosticsPlugin::default());
        app.add_systems(Startup, overlay_setup);
        app.add_systems(Update, overlay_update);
    }

    app.add_systems(Startup, setup_scene);
    app.add_systems(Update, step_lod);

    app.run();
}


fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    config: Res<HiZViewerArgs>,
) {
    commands.spawn((
        Mesh3d(meshes.add(Plane3d::default().mesh().size(60.0, 60.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.3, 0.4, 0.3))),
        Name::new("ground"),
    ));

    // a depth-varied grid of boxes so every pyramid level has structure
    let box_mesh = meshes.add(Cuboid::new(1.5, 3.0, 1.5));
    let box_material = materials.add(Color::srgb(0.7, 0.6, 0.5));

    for x in -3i32..=3 {
        for z in -3i32..=3 {
            let height = 1.5 + 1.2 * ((x * x + z * z) as f32).sqrt();

            commands.spawn((
                Mesh3d(box_mesh.clone()),
                MeshMaterial3d(box_material.clone()),
                Transform::from_xyz(x as f32 * 4.0, height * 0.5, z as f32 * 4.0)
                    .with_scale(Vec3::new(1.0, height / 3.0, 1.0)),
                Name::new("box"),
            ));
        }
    }

    commands.spawn((
        DirectionalLight {
            illuminance: 8_000.0,
            shadows_enabled: false,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(EulerRot::XYZ, -0.9, 0.4, 0.0)),
        Name::new("sun"),
    ));

    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(16.0, 12.0, 16.0).looking_at(Vec3::ZERO, Vec3::Y),
        HiZBuffer,
        HiZViewer { lod: config.lod },
        PanOrbitCamera {
            allow_upside_down: true,
            ..default()
        },
        Name::new("camera"),
    ));
}


fn step_lod(
    keys: Res<ButtonInput<KeyCode>>,
    mut viewers: Query<&mut HiZViewer>,
) {
    for mut viewer in &mut viewers {
        if keys.just_pressed(KeyCode::ArrowUp) {
            viewer.lod = viewer.lod.saturating_add(1).min(16);
        }

        if keys.just_pressed(KeyCode::ArrowDown) {
            viewer.lod = viewer.lod.saturating_sub(1);
        }
    }
}


pub fn esc_close(
    keys: Res<ButtonInput<KeyCode>>,
    mut exit: EventWriter<AppExit>,
) {
    if keys.just_pressed(KeyCode::Escape) {
        exit.write(AppExit::Success);
    }
}


#[derive(Component)]
struct OverlayText;

fn overlay_setup(mut commands: Commands) {
    commands.spawn((
        Text::new(""),
        TextFont {
            font_size: 24.0,
            ..default()
        },
        TextColor(Color::WHITE),
        Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(8.0),
            left: Val::Px(12.0),
            ..default()
        },
        OverlayText,
    ));
}

fn overlay_update(
    diagnostics: Res<DiagnosticsStore>,
    viewers: Query<&HiZViewer>,
    mut overlay: Query<&mut Text, With<OverlayText>>,
) {
    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|fps| fps.smoothed())
        .unwrap_or(0.0);
    let lod = viewers.iter().next().map_or(0, |viewer| viewer.lod);

    for mut text in &mut overlay {
        text.0 = format!("fps: {fps:.1}\nlod: {lod} (arrow keys)");
    }
}


pub fn main() {
    setup_hooks();
    viewer_app();
}
