use ash::vk;

/// 队列的用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// graphics + compute + transfer
    Universal,
    /// 独立的 async compute 队列
    Compute,
    /// 独立的 DMA 队列
    Transfer,
}

impl QueueRole {
    pub const ALL: [QueueRole; 3] = [QueueRole::Universal, QueueRole::Compute, QueueRole::Transfer];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// 每种用途对应的 queue family index
///
/// 未找到的用途保持为 [`vk::QUEUE_FAMILY_IGNORED`]，使用时会回落到 universal。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyAssignment {
    families: [u32; 3],
}

impl QueueFamilyAssignment {
    /// 只扫描一次，每种用途取第一个满足条件的 family
    ///
    /// - universal：带有 GRAPHICS
    /// - compute：带有 COMPUTE，但不带 GRAPHICS
    /// - transfer：带有 TRANSFER，但既不带 GRAPHICS 也不带 COMPUTE
    pub fn from_properties(props: &[vk::QueueFamilyProperties]) -> Self {
        let mut families = [vk::QUEUE_FAMILY_IGNORED; 3];

        let mut try_assign = |role: QueueRole, family: usize| {
            if families[role.index()] == vk::QUEUE_FAMILY_IGNORED {
                families[role.index()] = family as u32;
            }
        };

        for (family, prop) in props.iter().enumerate() {
            if prop.queue_count == 0 {
                continue;
            }
            let flags = prop.queue_flags;
            if flags.contains(vk::QueueFlags::GRAPHICS) {
                try_assign(QueueRole::Universal, family);
            } else if flags.contains(vk::QueueFlags::COMPUTE) {
                try_assign(QueueRole::Compute, family);
            } else if flags.contains(vk::QueueFlags::TRANSFER) {
                try_assign(QueueRole::Transfer, family);
            }
        }

        Self { families }
    }

    #[inline]
    pub fn has_universal(&self) -> bool {
        self.families[QueueRole::Universal.index()] != vk::QUEUE_FAMILY_IGNORED
    }

    /// 该用途是否有独立的 family
    #[inline]
    pub fn is_dedicated(&self, role: QueueRole) -> bool {
        self.families[role.index()] != vk::QUEUE_FAMILY_IGNORED
    }

    /// 扫描得到的原始值，可能是 [`vk::QUEUE_FAMILY_IGNORED`]
    #[inline]
    pub fn raw_family(&self, role: QueueRole) -> u32 {
        self.families[role.index()]
    }

    /// 实际使用的 family，缺失的用途回落到 universal
    #[inline]
    pub fn family(&self, role: QueueRole) -> u32 {
        match self.families[role.index()] {
            vk::QUEUE_FAMILY_IGNORED => self.families[QueueRole::Universal.index()],
            family => family,
        }
    }

    /// 需要创建的 family，去重且有序
    pub fn distinct_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> =
            self.families.iter().copied().filter(|f| *f != vk::QUEUE_FAMILY_IGNORED).collect();
        families.sort_unstable();
        families.dedup();
        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_typical_discrete_gpu() {
        let props = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let assignment = QueueFamilyAssignment::from_properties(&props);
        assert_eq!(assignment.family(QueueRole::Universal), 0);
        assert_eq!(assignment.family(QueueRole::Compute), 1);
        assert_eq!(assignment.family(QueueRole::Transfer), 2);
        assert_eq!(assignment.distinct_families(), vec![0, 1, 2]);
    }

    #[test]
    fn test_single_family_collapses_to_universal() {
        let props = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
        let assignment = QueueFamilyAssignment::from_properties(&props);
        assert!(assignment.has_universal());
        assert!(!assignment.is_dedicated(QueueRole::Compute));
        assert_eq!(assignment.raw_family(QueueRole::Transfer), vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(assignment.family(QueueRole::Compute), 0);
        assert_eq!(assignment.family(QueueRole::Transfer), 0);
        assert_eq!(assignment.distinct_families(), vec![0]);
    }

    #[test]
    fn test_compute_transfer_family_is_not_transfer_role() {
        // COMPUTE|TRANSFER 在 TRANSFER-only 之前，也只能作为 compute
        let props = [
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER | vk::QueueFlags::SPARSE_BINDING),
        ];
        let assignment = QueueFamilyAssignment::from_properties(&props);
        assert_eq!(assignment.family(QueueRole::Universal), 1);
        assert_eq!(assignment.family(QueueRole::Compute), 0);
        assert_eq!(assignment.family(QueueRole::Transfer), 2);
    }

    #[test]
    fn test_first_match_wins() {
        let props = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::COMPUTE),
        ];
        let assignment = QueueFamilyAssignment::from_properties(&props);
        assert_eq!(assignment.family(QueueRole::Universal), 0);
        assert_eq!(assignment.family(QueueRole::Compute), 2);
    }

    #[test]
    fn test_no_graphics_family() {
        let props = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::TRANSFER)];
        let assignment = QueueFamilyAssignment::from_properties(&props);
        assert!(!assignment.has_universal());
        assert_eq!(assignment.distinct_families(), vec![0, 1]);
    }

    #[test]
    fn test_empty_family_is_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let props = [empty, family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(QueueFamilyAssignment::from_properties(&props).family(QueueRole::Universal), 1);
    }
}
