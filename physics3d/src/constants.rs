/*!
Tuning constants for the physics-behavior layer.

These centralize the parameters used by world stepping, collision layer
packing, joint tuning presets and the ragdoll state presets. Keeping them
together makes tuning easier and helps ensure deterministic behavior across
platforms.

Notes
- Distances are in meters unless a `_PX` suffix says otherwise, time in
  seconds.
- Favor practical world-space tolerances over machine epsilon for robust
  behavior.
*/

/// Practical small value for comparisons (norms, time deltas, ratios).
pub const EPSILON: f32 = 1.0 / (1 << 16) as f32;

/// Default presentation-to-simulation scale: pixels per meter.
pub const DEFAULT_WORLD_SCALE: f32 = 100.0;

/// Largest frame delta simulated with a single solver sub-step (seconds).
/// Longer frames are split into two sub-steps to preserve stability under
/// low frame rates.
pub const MAX_SINGLE_STEP_DELTA: f32 = 1.0 / 55.0;

/// There are 4 bits for static layers and 4 bits for dynamic layers.
pub const STATIC_LAYERS_MASK: u8 = 0x0f;
/// High nibble of the 8-bit layer byte, reserved for dynamic bodies.
pub const DYNAMIC_LAYERS_MASK: u8 = 0xf0;
/// All collision layers.
pub const ALL_LAYERS_MASK: u8 = 0xff;

/// Extra solver iterations applied to bodies touched by a "Stable" joint.
pub const STABLE_EXTRA_ITERATIONS: (u32, u32) = (8, 4);
/// Extra solver iterations applied to bodies touched by an "UltraStable" joint.
pub const ULTRA_STABLE_EXTRA_ITERATIONS: (u32, u32) = (12, 6);
/// Solver priority for "Stable" joints.
pub const STABLE_PRIORITY: u8 = 100;
/// Solver priority for "UltraStable" joints.
pub const ULTRA_STABLE_PRIORITY: u8 = 150;

/// Fallback total mass (mass units) used by ragdoll mass redistribution when
/// no dynamic member yields a usable mass.
pub const DEFAULT_RAGDOLL_TOTAL_MASS: f32 = 75.0;

/// Ragdoll state presets: (linear damping, angular damping, joint friction,
/// joint spring frequency, joint spring damping).
pub const RAGDOLL_LIMP_PRESET: (f32, f32, f32, f32, f32) = (2.0, 2.0, 0.0, 0.0, 0.0);
pub const RAGDOLL_STIFF_PRESET: (f32, f32, f32, f32, f32) = (0.3, 0.5, 100.0, 10.0, 0.5);
pub const RAGDOLL_ACTIVE_PRESET: (f32, f32, f32, f32, f32) = (0.5, 0.5, 5.0, 2.0, 0.3);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_masks_partition_the_byte() {
        assert_eq!(STATIC_LAYERS_MASK & DYNAMIC_LAYERS_MASK, 0);
        assert_eq!(STATIC_LAYERS_MASK | DYNAMIC_LAYERS_MASK, ALL_LAYERS_MASK);
    }

    #[test]
    fn preset_friction_bands_are_ordered() {
        // Limp < Active < Stiff is relied upon by the ragdoll state machine.
        assert!(RAGDOLL_LIMP_PRESET.2 < RAGDOLL_ACTIVE_PRESET.2);
        assert!(RAGDOLL_ACTIVE_PRESET.2 < RAGDOLL_STIFF_PRESET.2);
    }
}
