/*!
Collision layer/mask bitsets.

Each behavior carries an 8-bit layer byte ("which groups am I in") and an
8-bit mask byte ("which groups do I collide with"). The byte is split: the
low nibble holds static layers, the high nibble dynamic layers. Bodies only
ever occupy the nibble matching their motion type, so objects can't register
in the wrong broad-phase group; static bodies accept all collisions because
it's the mask of dynamic objects that matters.
*/

use num_traits::PrimInt;
use rapier3d::prelude::{Group, InteractionGroups, InteractionTestMode};

use crate::body::BodyType;
use crate::constants::{ALL_LAYERS_MASK, DYNAMIC_LAYERS_MASK, STATIC_LAYERS_MASK};

/// A pure bitmask container generic over its storage integer.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct BitmaskFlags<T: PrimInt> {
    pub bits: T,
}

impl<T: PrimInt> BitmaskFlags<T> {
    pub fn new(bits: T) -> Self {
        Self { bits }
    }

    /// Set the bit at `index`.
    pub fn add(&mut self, index: u8) {
        self.bits = self.bits | (T::one() << index as usize);
    }

    /// Clear the bit at `index`.
    pub fn remove(&mut self, index: u8) {
        self.bits = self.bits & !(T::one() << index as usize);
    }

    /// Whether the bit at `index` is set.
    pub fn has(&self, index: u8) -> bool {
        (self.bits & (T::one() << index as usize)) != T::zero()
    }

    pub fn clear(&mut self) {
        self.bits = T::zero();
    }
}

/// Per-behavior collision layer/mask configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionLayers {
    /// Which layers this body belongs to.
    pub layers: BitmaskFlags<u8>,
    /// Which layers this body collides with.
    pub masks: BitmaskFlags<u8>,
}

impl Default for CollisionLayers {
    fn default() -> Self {
        Self {
            layers: BitmaskFlags::new(ALL_LAYERS_MASK),
            masks: BitmaskFlags::new(ALL_LAYERS_MASK),
        }
    }
}

impl CollisionLayers {
    pub fn new(layers: u8, masks: u8) -> Self {
        Self {
            layers: BitmaskFlags::new(layers),
            masks: BitmaskFlags::new(masks),
        }
    }

    /// Layer bits reduced to the nibble matching the body type, so bodies
    /// never register in the wrong layer group.
    pub fn layers_for(&self, body_type: BodyType) -> u8 {
        if body_type == BodyType::Static {
            self.layers.bits & STATIC_LAYERS_MASK
        } else {
            self.layers.bits & DYNAMIC_LAYERS_MASK
        }
    }

    /// Mask bits according to the body type. Static objects accept all
    /// collisions as it's the mask of dynamic objects that matters.
    pub fn masks_for(&self, body_type: BodyType) -> u8 {
        if body_type == BodyType::Static {
            ALL_LAYERS_MASK
        } else {
            self.masks.bits
        }
    }

    /// Convert to rapier interaction groups for a body of the given type.
    pub fn interaction_groups(&self, body_type: BodyType) -> InteractionGroups {
        InteractionGroups::new(
            Group::from_bits_truncate(self.layers_for(body_type) as u32),
            Group::from_bits_truncate(self.masks_for(body_type) as u32),
            InteractionTestMode::default(),
        )
    }

    /// Whether a body with these settings may collide against `other`.
    pub fn can_collide(&self, body_type: BodyType, other: &Self, other_type: BodyType) -> bool {
        (self.masks_for(body_type) & other.layers_for(other_type)) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmask_add_remove_has() {
        let mut flags = BitmaskFlags::<u8>::default();
        assert!(!flags.has(3));
        flags.add(3);
        assert!(flags.has(3));
        flags.remove(3);
        assert!(!flags.has(3));
    }

    #[test]
    fn static_bodies_occupy_only_static_bits_but_accept_everything() {
        let layers = CollisionLayers::new(ALL_LAYERS_MASK, 0x01);
        assert_eq!(layers.layers_for(BodyType::Static), STATIC_LAYERS_MASK);
        assert_eq!(layers.masks_for(BodyType::Static), ALL_LAYERS_MASK);
    }

    #[test]
    fn dynamic_bodies_use_their_configured_mask() {
        let layers = CollisionLayers::new(ALL_LAYERS_MASK, 0x30);
        assert_eq!(layers.layers_for(BodyType::Dynamic), DYNAMIC_LAYERS_MASK);
        assert_eq!(layers.masks_for(BodyType::Dynamic), 0x30);
    }

    #[test]
    fn can_collide_uses_mask_against_layers() {
        // A dynamic body masking only the static nibble still hits statics.
        let a = CollisionLayers::new(ALL_LAYERS_MASK, STATIC_LAYERS_MASK);
        let b = CollisionLayers::new(ALL_LAYERS_MASK, ALL_LAYERS_MASK);
        assert!(a.can_collide(BodyType::Dynamic, &b, BodyType::Static));
        // But not other dynamic bodies: their layers live in the high nibble.
        assert!(!a.can_collide(BodyType::Dynamic, &b, BodyType::Dynamic));
    }
}
