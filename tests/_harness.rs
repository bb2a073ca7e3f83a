use std::sync::{Arc, Mutex};

use bevy::prelude::*;

use bevy_hiz::HiZPlugin;


// windowed harness for manually driven pipeline tests; the CPU-side
// properties live in pyramid.rs and run headless


#[derive(Resource)]
pub struct TestHarness {
    pub resolution: (f32, f32),
}

pub fn test_harness_app(
    harness: TestHarness,
) -> App {
    let mut app = App::new();

    app.insert_resource(ClearColor(Color::srgb_u8(0, 0, 0)));
    app.add_plugins(
        DefaultPlugins
        .set(WindowPlugin {
            primary_window: Some(Window {
                mode: bevy::window::WindowMode::Windowed,
                present_mode: bevy::window::PresentMode::AutoVsync,
                prevent_default_event_handling: false,
                resolution: harness.resolution.into(),
                title: "bevy_hiz pipeline test".to_string(),
                ..default()
            }),
            ..default()
        }),
    );

    app.add_plugins(HiZPlugin);

    app.insert_resource(harness);

    app
}


pub struct TestState {
    pub test_completed: bool,
}

impl Default for TestState {
    fn default() -> Self {
        TestState {
            test_completed: false,
        }
    }
}

pub type TestStateArc = Arc<Mutex<TestState>>;
