//! Renderer configuration.

/// Configuration shared by the window, the render targets and every render pass.
///
/// All sizes are in physical pixels.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RenderSettings {
    /// Title of the window opened by the main loop.
    pub title: String,
    /// Width of the window and of the full-resolution render targets.
    pub width: u32,
    /// Height of the window and of the full-resolution render targets.
    pub height: u32,
    /// Is vsync enabled?
    pub vsync: bool,
    /// Side of the square shadow maps. `None` uses the window width.
    pub shadow_resolution: Option<u32>,
    /// Number of horizontal + vertical blur iterations of the bloom chain.
    pub bloom_iterations: u32,
    /// Attenuation value past which a light no longer contributes.
    pub falloff_threshold: f32,
    /// Maximum reflection-of-a-reflection depth. Clamped to [`MAX_REFLECTION_DEPTH`].
    pub reflection_depth: u32,
    /// Re-render cube-map reflections every frame instead of once at start-up.
    pub dynamic_environment_maps: bool,
    /// Maximum anisotropy of reflection and material textures.
    pub anisotropy: u16,
    /// Log notification-level driver diagnostics too.
    pub verbose_diagnostics: bool,
}

/// Deepest reflection recursion the renderer supports.
pub const MAX_REFLECTION_DEPTH: u32 = 1;

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            title: "deferred3d".to_string(),
            width: 1280,
            height: 1024,
            vsync: true,
            shadow_resolution: None,
            bloom_iterations: 5,
            falloff_threshold: 256.0,
            reflection_depth: MAX_REFLECTION_DEPTH,
            dynamic_environment_maps: false,
            anisotropy: 4,
            verbose_diagnostics: false,
        }
    }
}

impl RenderSettings {
    /// Sets the window title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the window size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    /// Enables or disables vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Sets the side of the square shadow maps.
    pub fn with_shadow_resolution(mut self, resolution: u32) -> Self {
        self.shadow_resolution = Some(resolution.max(1));
        self
    }

    /// Sets the number of bloom blur iterations (at least one).
    pub fn with_bloom_iterations(mut self, iterations: u32) -> Self {
        self.bloom_iterations = iterations.max(1);
        self
    }

    /// Sets the reflection recursion depth.
    pub fn with_reflection_depth(mut self, depth: u32) -> Self {
        self.reflection_depth = depth.min(MAX_REFLECTION_DEPTH);
        self
    }

    /// Re-render cube-map reflections every frame.
    pub fn with_dynamic_environment_maps(mut self, dynamic: bool) -> Self {
        self.dynamic_environment_maps = dynamic;
        self
    }

    /// Side of the square shadow maps.
    pub fn shadow_resolution(&self) -> u32 {
        self.shadow_resolution.unwrap_or(self.width)
    }

    /// Effective reflection recursion depth.
    pub fn reflection_depth(&self) -> u32 {
        self.reflection_depth.min(MAX_REFLECTION_DEPTH)
    }

    /// Width over height of the full-resolution targets.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Number of mip levels allocated for a texture whose largest side is `size`.
///
/// This is `ceil(log2(size))`, with a minimum of one level.
pub fn mip_levels(size: u32) -> u32 {
    if size <= 1 {
        1
    } else {
        (size as f32).log2().ceil() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_levels_follow_ceil_log2() {
        assert_eq!(mip_levels(1280), 11);
        assert_eq!(mip_levels(1024), 10);
        assert_eq!(mip_levels(1000), 10);
        assert_eq!(mip_levels(2), 1);
        assert_eq!(mip_levels(1), 1);
    }

    #[test]
    fn shadow_resolution_defaults_to_width() {
        let settings = RenderSettings::default().with_size(640, 480);
        assert_eq!(settings.shadow_resolution(), 640);
        assert_eq!(settings.with_shadow_resolution(256).shadow_resolution(), 256);
    }

    #[test]
    fn reflection_depth_is_clamped() {
        let settings = RenderSettings::default().with_reflection_depth(7);
        assert_eq!(settings.reflection_depth(), MAX_REFLECTION_DEPTH);
    }
}
