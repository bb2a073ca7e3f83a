use bevy::prelude::*;
use bevy_args::{
    Deserialize,
    Parser,
    Serialize,
};


#[derive(
    Debug,
    Resource,
    Serialize,
    Deserialize,
    Parser,
)]
#[command(about = "bevy_hiz viewer", version, long_about = None)]
pub struct HiZViewerArgs {
    #[arg(long, default_value = "true")]
    pub press_esc_close: bool,

    #[arg(long, default_value = "true")]
    pub show_overlay: bool,

    #[arg(long, default_value = "1920.0")]
    pub width: f32,

    #[arg(long, default_value = "1080.0")]
    pub height: f32,

    #[arg(long, default_value = "bevy_hiz")]
    pub name: String,

    #[arg(long, default_value = "0")]
    pub lod: u32,
}

impl Default for HiZViewerArgs {
    fn default() -> HiZViewerArgs {
        HiZViewerArgs {
            press_esc_close: true,
            show_overlay: true,
            width: 1920.0,
            height: 1080.0,
            name: "bevy_hiz".to_string(),
            lod: 0,
        }
    }
}


pub fn setup_hooks() {
    #[cfg(debug_assertions)]
    #[cfg(target_arch = "wasm32")]
    {
        console_error_panic_hook::set_once();
    }
}


pub fn log(_msg: &str) {
    #[cfg(debug_assertions)]
    #[cfg(target_arch = "wasm32")]
    {
        web_sys::console::log_1(&_msg.into());
    }
    #[cfg(debug_assertions)]
    #[cfg(not(target_arch = "wasm32"))]
    {
        println!("{}", _msg);
    }
}
