//! WGSL snippets shared by the GPU programs, with CPU mirrors.
//!
//! # Available Functions
//!
//! ## Random & Hash
//! - `hash(n: u32) -> u32` - Hash a u32 to pseudo-random u32
//! - `hash3(p: vec3<u32>) -> u32` - Hash a 3D coordinate to pseudo-random u32
//! - `rand_unit(index: u32, seed: u32, stream: u32) -> f32` - Random float in [0, 1]
//!
//! ## Geography
//! - `mercator(lonlat: vec2<f32>) -> vec2<f32>` - Web Mercator in radians
//! - `field_coord(pos, min, max) -> vec2<f32>` - Normalized field coordinate
//! - `inside_unit(t: vec2<f32>) -> bool` - Closed unit-square test
//!
//! The hash functions are integer-only, so [`hash`], [`hash3`] and
//! [`random_unit`] reproduce the GPU draws bit for bit.

/// WGSL code for random/hash functions.
pub const RANDOM_WGSL: &str = r#"
fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

fn hash3(p: vec3<u32>) -> u32 {
    return hash(p.x + hash(p.y + hash(p.z)));
}

// Random float in [0, 1] for one particle, frame seed, and stream
fn rand_unit(index: u32, seed: u32, stream: u32) -> f32 {
    return f32(hash3(vec3<u32>(index, seed, stream))) / 4294967295.0;
}
"#;

/// WGSL code for projection and field addressing.
pub const GEO_WGSL: &str = r#"
const PI: f32 = 3.141592653589793;
const MAX_MERCATOR_LAT: f32 = 85.05112878;

fn mercator(lonlat: vec2<f32>) -> vec2<f32> {
    let lat = radians(clamp(lonlat.y, -MAX_MERCATOR_LAT, MAX_MERCATOR_LAT));
    return vec2<f32>(radians(lonlat.x), log(tan(PI / 4.0 + lat / 2.0)));
}

fn field_coord(pos: vec2<f32>, field_min: vec2<f32>, field_max: vec2<f32>) -> vec2<f32> {
    return (pos - field_min) / (field_max - field_min);
}

fn inside_unit(t: vec2<f32>) -> bool {
    return t.x >= 0.0 && t.x <= 1.0 && t.y >= 0.0 && t.y <= 1.0;
}

// Nearest texel for a normalized coordinate already known to be inside
fn field_texel(t: vec2<f32>, size: vec2<u32>) -> vec2<i32> {
    let cell = vec2<u32>(t * vec2<f32>(size));
    return vec2<i32>(min(cell, size - vec2<u32>(1u)));
}
"#;

/// Stream index for the per-frame drop draw.
pub const STREAM_DROP: u32 = 0;
/// Stream index for a reseeded longitude.
pub const STREAM_LON: u32 = 1;
/// Stream index for a reseeded latitude.
pub const STREAM_LAT: u32 = 2;

/// CPU mirror of the WGSL `hash`.
#[inline]
pub fn hash(n: u32) -> u32 {
    let mut x = n;
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

/// CPU mirror of the WGSL `hash3`.
#[inline]
pub fn hash3(p: [u32; 3]) -> u32 {
    hash(p[0].wrapping_add(hash(p[1].wrapping_add(hash(p[2])))))
}

/// CPU mirror of the WGSL `rand_unit`.
#[inline]
pub fn random_unit(index: u32, seed: u32, stream: u32) -> f32 {
    hash3([index, seed, stream]) as f32 / 4_294_967_295.0
}

/// All shared snippets, for prepending to a program.
pub fn all_utils_wgsl() -> String {
    format!("{RANDOM_WGSL}\n{GEO_WGSL}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_known_values() {
        assert_eq!(hash(0), 0);
        assert_ne!(hash(1), hash(2));
    }

    #[test]
    fn test_random_unit_range() {
        for i in 0..10_000 {
            let r = random_unit(i, 12345, STREAM_DROP);
            assert!((0.0..=1.0).contains(&r));
        }
    }

    #[test]
    fn test_streams_are_independent() {
        // Same particle and seed, different streams, should not track each other
        let n = 10_000;
        let mut both_low = 0;
        for i in 0..n {
            let a = random_unit(i, 7, STREAM_DROP);
            let b = random_unit(i, 7, STREAM_LON);
            if a < 0.1 && b < 0.1 {
                both_low += 1;
            }
        }
        // Independent draws give ~1% (100); correlated ones would give ~10%
        assert!(both_low < 200, "streams correlated: {}", both_low);
    }

    #[test]
    fn test_random_unit_mean() {
        let n = 20_000;
        let mean: f32 = (0..n).map(|i| random_unit(i, 99, STREAM_LAT)).sum::<f32>() / n as f32;
        assert!((mean - 0.5).abs() < 0.02, "mean {}", mean);
    }

    #[test]
    fn test_snippets_validate() {
        let module = naga::front::wgsl::parse_str(&all_utils_wgsl()).expect("parse");
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator.validate(&module).expect("validate");
    }
}
