// src/ui/panel.rs
//! The "Scene Editor" panel
//!
//! Edits [`SceneParameters`] in place. The scene reads the same struct later
//! in the frame, so every change is visible immediately.

use crate::gfx::scene::SceneParameters;

/// Lowest reflectivity the panel lets through; the specular exponent is
/// meaningless below one.
pub const MIN_REFLECTIVITY: i32 = 1;

/// Step of the reflectivity input's +/- buttons.
pub const REFLECTIVITY_STEP: i32 = 2;

/// The panel is held at this size every frame.
pub const PANEL_SIZE: [f32; 2] = [400.0, 200.0];

/// Builds the parameter panel.
///
/// Returns true if any value changed this frame.
pub fn scene_editor_panel(ui: &imgui::Ui, params: &mut SceneParameters) -> bool {
    let mut changed = false;

    ui.window("Scene Editor")
        .size(PANEL_SIZE, imgui::Condition::Always)
        .position([20.0, 20.0], imgui::Condition::FirstUseEver)
        .build(|| {
            changed |= ui.color_edit3("Sky Color", &mut params.sky_color);
            changed |= ui.color_edit3("Ground Color", &mut params.ground_color);
            changed |= ui.color_edit3("Light Color", &mut params.light_color);
            changed |= ui
                .input_float3("Light Position", &mut params.light_position)
                .build();

            changed |= ui
                .slider_config("Ambient Strength", 0.0, 1.0)
                .display_format("%.2f")
                .build(&mut params.ambient_strength);
            changed |= ui
                .slider_config("Specular Strength", 0.0, 1.0)
                .display_format("%.2f")
                .build(&mut params.specular_strength);

            if ui
                .input_int("Reflectivity", &mut params.reflectivity)
                .step(REFLECTIVITY_STEP)
                .build()
            {
                params.reflectivity = clamp_reflectivity(params.reflectivity);
                changed = true;
            }
        });

    changed
}

/// Keeps a typed-in reflectivity usable as a specular exponent.
pub fn clamp_reflectivity(value: i32) -> i32 {
    value.max(MIN_REFLECTIVITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frame(ctx: &mut imgui::Context, params: &mut SceneParameters) -> bool {
        let ui = ctx.frame();
        let changed = scene_editor_panel(ui, params);
        ctx.render();
        changed
    }

    #[test]
    fn test_panel_without_input_changes_nothing() {
        let mut ctx = imgui::Context::create();
        ctx.set_ini_filename(None);
        ctx.io_mut().display_size = [1200.0, 800.0];
        ctx.io_mut().delta_time = 1.0 / 60.0;
        ctx.fonts().build_rgba32_texture();

        let mut params = SceneParameters::default();
        for _ in 0..3 {
            assert!(!run_frame(&mut ctx, &mut params));
        }
        assert_eq!(params, SceneParameters::default());
    }

    #[test]
    fn test_clamp_reflectivity() {
        assert_eq!(clamp_reflectivity(8), 8);
        assert_eq!(clamp_reflectivity(1), 1);
        assert_eq!(clamp_reflectivity(0), 1);
        assert_eq!(clamp_reflectivity(-6), 1);
        assert_eq!(clamp_reflectivity(256), 256);
    }

    #[test]
    fn test_default_reflectivity_survives_step() {
        let mut value = SceneParameters::default().reflectivity;
        for _ in 0..4 {
            value = clamp_reflectivity(value - REFLECTIVITY_STEP);
        }
        assert_eq!(value, MIN_REFLECTIVITY);
        assert_eq!(clamp_reflectivity(value + REFLECTIVITY_STEP), 3);
    }
}
