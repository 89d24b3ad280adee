//! Layer masks used to gate component/emitter audibility against the
//! world's active listeners and meters (§3, "all-mic layer mask").

use bitflags::bitflags;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct LayerMask: u32 {
        const NONE = 0;
        const ALL = u32::MAX;
    }
}

impl LayerMask {
    #[inline]
    pub fn single(bit: u32) -> Self {
        LayerMask::from_bits_truncate(1u32 << bit)
    }

    #[inline]
    pub fn intersects_mask(self, other: LayerMask) -> bool {
        self.intersects(other)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_bits_do_not_intersect_by_default() {
        let a = LayerMask::single(0);
        let b = LayerMask::single(1);
        assert!(!a.intersects_mask(b));
        assert!(a.intersects_mask(a));
    }

    #[test]
    fn all_intersects_anything_nonempty() {
        assert!(LayerMask::ALL.intersects_mask(LayerMask::single(5)));
        assert!(!LayerMask::ALL.intersects_mask(LayerMask::NONE));
    }
}
