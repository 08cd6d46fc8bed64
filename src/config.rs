//! Render configuration for the wind layer.
//!
//! [`RenderConfig`] is built with chained `with_*` calls and can be changed
//! later through validated `set_*` methods. The layer snapshots it at the
//! start of every frame, so changes never apply mid-frame.
//!
//! ```ignore
//! let config = RenderConfig::new()
//!     .with_particle_count(65_536)
//!     .with_fade_opacity(0.97)
//!     .with_color(ColorMode::from_hex_list(&["#ffffff"])?);
//! ```

use crate::error::ConfigError;

/// Scale from the user-facing speed factor to per-frame degrees.
///
/// An empirically tuned constant; the speed factor is an opaque multiplier
/// on top of it, not a physical unit.
pub const SPEED_SCALE: f32 = 0.01;

/// Speed mapped to the end of the color gradient.
pub const REFERENCE_MAX_SPEED: f32 = 15.0;

/// Alpha of a freshly drawn particle.
pub const PARTICLE_ALPHA: f32 = 0.8;

/// Linear RGB color with components in 0.0-1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const CYAN: Rgb = Rgb::new(0.0, 1.0, 1.0);
    pub const RED: Rgb = Rgb::new(1.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Result<Self, ConfigError> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidColor(hex.to_string()));
        }
        let value =
            u32::from_str_radix(digits, 16).map_err(|_| ConfigError::InvalidColor(hex.to_string()))?;
        Ok(Self::new(
            ((value >> 16) & 0xff) as f32 / 255.0,
            ((value >> 8) & 0xff) as f32 / 255.0,
            (value & 0xff) as f32 / 255.0,
        ))
    }

    /// Linear interpolation towards `other`.
    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        Rgb::new(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
        )
    }

    /// As `[r, g, b, 1.0]` for a uniform upload.
    pub fn to_array4(self) -> [f32; 4] {
        [self.r, self.g, self.b, 1.0]
    }
}

/// How particles are colored.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorMode {
    /// Every particle has the same color.
    Solid(Rgb),
    /// Color ramps from the first to the second stop with normalized speed.
    Gradient(Rgb, Rgb),
}

impl ColorMode {
    /// Build from hex strings: one color is solid, two or more a gradient
    /// between the first two.
    pub fn from_hex_list(colors: &[&str]) -> Result<Self, ConfigError> {
        match colors {
            [] => Err(ConfigError::EmptyColorList),
            [single] => Ok(ColorMode::Solid(Rgb::from_hex(single)?)),
            [first, second, ..] => Ok(ColorMode::Gradient(
                Rgb::from_hex(first)?,
                Rgb::from_hex(second)?,
            )),
        }
    }

    /// Color of a particle moving at `speed`.
    pub fn color_for_speed(&self, speed: f32) -> Rgb {
        match *self {
            ColorMode::Solid(c) => c,
            ColorMode::Gradient(c0, c1) => {
                let t = (speed / REFERENCE_MAX_SPEED).clamp(0.0, 1.0);
                c0.lerp(c1, t)
            }
        }
    }

    /// `(color0, color1, is_gradient)` as laid out in the draw uniforms.
    pub(crate) fn gpu_stops(&self) -> ([f32; 4], [f32; 4], u32) {
        match *self {
            ColorMode::Solid(c) => (c.to_array4(), Rgb::BLACK.to_array4(), 0),
            ColorMode::Gradient(c0, c1) => (c0.to_array4(), c1.to_array4(), 1),
        }
    }
}

impl Default for ColorMode {
    fn default() -> Self {
        ColorMode::Gradient(Rgb::CYAN, Rgb::RED)
    }
}

/// Particle simulation and trail settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderConfig {
    /// Requested number of particles (rounded up to a square texture).
    pub particle_count: u32,
    /// Opaque speed multiplier, scaled by [`SPEED_SCALE`] per frame.
    pub speed_factor: f32,
    /// Per-frame probability that a particle respawns (0.0-1.0).
    pub drop_rate: f32,
    /// Opacity the previous frame keeps each frame (0.0-1.0).
    pub fade_opacity: f32,
    /// Particle size in pixels.
    pub particle_size: f32,
    /// Particle coloring.
    pub color: ColorMode,
}

impl RenderConfig {
    /// Create a configuration with default settings.
    ///
    /// - `particle_count`: 32768
    /// - `speed_factor`: 0.8
    /// - `drop_rate`: 0.003
    /// - `fade_opacity`: 0.96
    /// - `particle_size`: 2.0
    /// - `color`: cyan to red gradient
    pub fn new() -> Self {
        Self {
            particle_count: 32_768,
            speed_factor: 0.8,
            drop_rate: 0.003,
            fade_opacity: 0.96,
            particle_size: 2.0,
            color: ColorMode::default(),
        }
    }

    /// Set the number of particles. Zero is ignored.
    pub fn with_particle_count(mut self, count: u32) -> Self {
        // Builder form keeps the previous value rather than failing
        let _ = self.set_particle_count(count);
        self
    }

    /// Set the speed multiplier.
    pub fn with_speed_factor(mut self, factor: f32) -> Self {
        self.set_speed_factor(factor);
        self
    }

    /// Set the per-frame respawn probability (clamped to 0.0-1.0).
    pub fn with_drop_rate(mut self, rate: f32) -> Self {
        self.set_drop_rate(rate);
        self
    }

    /// Set the trail fade opacity (clamped to 0.0-1.0).
    pub fn with_fade_opacity(mut self, opacity: f32) -> Self {
        self.set_fade_opacity(opacity);
        self
    }

    /// Set the particle size in pixels.
    pub fn with_particle_size(mut self, size: f32) -> Self {
        self.set_particle_size(size);
        self
    }

    /// Set the coloring mode.
    pub fn with_color(mut self, color: ColorMode) -> Self {
        self.color = color;
        self
    }

    /// Change the particle count.
    ///
    /// Zero is rejected and the current count is kept.
    pub fn set_particle_count(&mut self, count: u32) -> Result<(), ConfigError> {
        if count == 0 {
            log::warn!("Rejected particle count 0, keeping {}", self.particle_count);
            return Err(ConfigError::ZeroParticleCount);
        }
        self.particle_count = count;
        Ok(())
    }

    /// Change the speed multiplier. Non-finite values are ignored.
    pub fn set_speed_factor(&mut self, factor: f32) {
        if factor.is_finite() {
            self.speed_factor = factor;
        } else {
            log::warn!("Ignoring non-finite speed factor");
        }
    }

    /// Change the respawn probability, clamped to 0.0-1.0.
    pub fn set_drop_rate(&mut self, rate: f32) {
        self.drop_rate = clamp_unit(rate, self.drop_rate);
    }

    /// Change the fade opacity, clamped to 0.0-1.0.
    pub fn set_fade_opacity(&mut self, opacity: f32) {
        self.fade_opacity = clamp_unit(opacity, self.fade_opacity);
    }

    /// Change the particle size. Negative or non-finite sizes are ignored.
    pub fn set_particle_size(&mut self, size: f32) {
        if size.is_finite() && size >= 0.0 {
            self.particle_size = size;
        } else {
            log::warn!("Ignoring particle size {}", size);
        }
    }

    /// Change the coloring mode.
    pub fn set_color(&mut self, color: ColorMode) {
        self.color = color;
    }

    /// Side length of the square particle-state texture.
    pub fn state_resolution(&self) -> u32 {
        state_resolution(self.particle_count)
    }

    /// Number of particles actually simulated (resolution squared).
    ///
    /// Widened to `u64`: the square of the largest resolution does not fit
    /// in `u32`.
    pub fn state_texel_count(&self) -> u64 {
        let res = self.state_resolution() as u64;
        res * res
    }

    /// Per-frame step multiplier applied to sampled velocities.
    #[inline]
    pub fn step_factor(&self) -> f32 {
        self.speed_factor * SPEED_SCALE
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// `ceil(sqrt(count))`, computed exactly in integers.
pub fn state_resolution(count: u32) -> u32 {
    let mut res = (count as f64).sqrt().ceil() as u32;
    // Guard against float rounding on either side
    while (res as u64) * (res as u64) < count as u64 {
        res += 1;
    }
    while res > 1 && ((res - 1) as u64) * ((res - 1) as u64) >= count as u64 {
        res -= 1;
    }
    res.max(1)
}

fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::new();
        assert_eq!(config.particle_count, 32_768);
        assert!((config.speed_factor - 0.8).abs() < 1e-6);
        assert!((config.drop_rate - 0.003).abs() < 1e-6);
        assert!((config.fade_opacity - 0.96).abs() < 1e-6);
        assert!((config.particle_size - 2.0).abs() < 1e-6);
        assert_eq!(config.color, ColorMode::Gradient(Rgb::CYAN, Rgb::RED));
    }

    #[test]
    fn test_builder() {
        let config = RenderConfig::new()
            .with_particle_count(100)
            .with_speed_factor(2.0)
            .with_drop_rate(0.01)
            .with_fade_opacity(0.9)
            .with_particle_size(3.0)
            .with_color(ColorMode::Solid(Rgb::RED));
        assert_eq!(config.particle_count, 100);
        assert!((config.step_factor() - 0.02).abs() < 1e-6);
        assert!((config.drop_rate - 0.01).abs() < 1e-6);
        assert!((config.fade_opacity - 0.9).abs() < 1e-6);
        assert!((config.particle_size - 3.0).abs() < 1e-6);
        assert_eq!(config.color, ColorMode::Solid(Rgb::RED));
    }

    #[test]
    fn test_drop_rate_and_fade_clamping() {
        let mut config = RenderConfig::new();
        config.set_drop_rate(1.5);
        assert_eq!(config.drop_rate, 1.0);
        config.set_drop_rate(-0.5);
        assert_eq!(config.drop_rate, 0.0);
        config.set_fade_opacity(2.0);
        assert_eq!(config.fade_opacity, 1.0);
        config.set_fade_opacity(f32::NAN);
        assert_eq!(config.fade_opacity, 1.0);
    }

    #[test]
    fn test_zero_particle_count_rejected() {
        let mut config = RenderConfig::new().with_particle_count(500);
        assert_eq!(config.set_particle_count(0), Err(ConfigError::ZeroParticleCount));
        assert_eq!(config.particle_count, 500);

        let config = RenderConfig::new().with_particle_count(0);
        assert_eq!(config.particle_count, 32_768);
    }

    #[test]
    fn test_invalid_particle_size_ignored() {
        let mut config = RenderConfig::new();
        config.set_particle_size(-1.0);
        config.set_particle_size(f32::INFINITY);
        assert!((config.particle_size - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_state_resolution() {
        assert_eq!(state_resolution(1), 1);
        assert_eq!(state_resolution(4), 2);
        assert_eq!(state_resolution(5), 3);
        assert_eq!(state_resolution(10_000), 100);
        assert_eq!(state_resolution(10_001), 101);
        assert_eq!(state_resolution(32_768), 182);
        assert_eq!(RenderConfig::new().state_texel_count(), 182 * 182);
    }

    #[test]
    fn test_largest_particle_count_does_not_overflow() {
        let config = RenderConfig::new().with_particle_count(u32::MAX);
        assert_eq!(config.state_resolution(), 65_536);
        assert_eq!(config.state_texel_count(), 1u64 << 32);
    }

    #[test]
    fn test_hex_parsing() {
        assert_eq!(Rgb::from_hex("#00FFFF").unwrap(), Rgb::CYAN);
        assert_eq!(Rgb::from_hex("ff0000").unwrap(), Rgb::RED);
        assert!(matches!(Rgb::from_hex("#fff"), Err(ConfigError::InvalidColor(_))));
        assert!(matches!(Rgb::from_hex("#gg0000"), Err(ConfigError::InvalidColor(_))));
        // Sign prefixes are not hex digits
        assert!(matches!(Rgb::from_hex("+12345"), Err(ConfigError::InvalidColor(_))));
        assert!(matches!(Rgb::from_hex("#-12345"), Err(ConfigError::InvalidColor(_))));
    }

    #[test]
    fn test_color_list_semantics() {
        assert_eq!(
            ColorMode::from_hex_list(&["#ff0000"]).unwrap(),
            ColorMode::Solid(Rgb::RED)
        );
        assert_eq!(
            ColorMode::from_hex_list(&["#00ffff", "#ff0000", "#000000"]).unwrap(),
            ColorMode::Gradient(Rgb::CYAN, Rgb::RED)
        );
        assert_eq!(ColorMode::from_hex_list(&[]), Err(ConfigError::EmptyColorList));
    }

    #[test]
    fn test_gradient_speed_mapping() {
        let mode = ColorMode::Gradient(Rgb::BLACK, Rgb::new(1.0, 1.0, 1.0));
        assert_eq!(mode.color_for_speed(0.0), Rgb::BLACK);
        let half = mode.color_for_speed(REFERENCE_MAX_SPEED * 0.5);
        assert!((half.r - 0.5).abs() < 1e-6);
        // Clamped above the reference speed
        assert_eq!(mode.color_for_speed(100.0), Rgb::new(1.0, 1.0, 1.0));
        assert_eq!(ColorMode::Solid(Rgb::RED).color_for_speed(50.0), Rgb::RED);
    }

    #[test]
    fn test_gpu_stops() {
        let (c0, c1, gradient) = ColorMode::Solid(Rgb::RED).gpu_stops();
        assert_eq!(c0, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(c1, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(gradient, 0);
        let (_, _, gradient) = ColorMode::default().gpu_stops();
        assert_eq!(gradient, 1);
    }
}
