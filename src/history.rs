// ============================================================================
// SNAPSHOT HISTORY — single-slot baseline per operation family
// ============================================================================
//
// A family (arithmetic, boolean, rotation, distortion) groups toggleable
// transforms that must never compound.  The first application inside a
// family captures the base image; every later application re-runs against
// that baseline, and `restore` hands it back.

use std::fmt;

use crate::canvas::PixelBuffer;
use crate::error::{EngineError, Result};

/// Groups of mutually exclusive, re-applicable transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationFamily {
    Arithmetic,
    Boolean,
    Rotation,
    Distortion,
}

impl OperationFamily {
    pub fn all() -> &'static [OperationFamily] {
        &[
            OperationFamily::Arithmetic,
            OperationFamily::Boolean,
            OperationFamily::Rotation,
            OperationFamily::Distortion,
        ]
    }

    fn slot(self) -> usize {
        match self {
            OperationFamily::Arithmetic => 0,
            OperationFamily::Boolean => 1,
            OperationFamily::Rotation => 2,
            OperationFamily::Distortion => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OperationFamily::Arithmetic => "arithmetic",
            OperationFamily::Boolean => "boolean",
            OperationFamily::Rotation => "rotation",
            OperationFamily::Distortion => "distortion",
        }
    }
}

impl fmt::Display for OperationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The image as it was right before a family's first application.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub baseline: PixelBuffer,
    pub label: String,
}

/// One optional baseline per family.
#[derive(Clone, Debug, Default)]
pub struct SnapshotManager {
    slots: [Option<Snapshot>; 4],
}

impl SnapshotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone `current` into the family's slot unless one is already held.
    /// Returns `true` when a new snapshot was taken.
    pub fn capture_if_absent(&mut self, family: OperationFamily, current: &PixelBuffer, label: &str) -> bool {
        let slot = &mut self.slots[family.slot()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(Snapshot { baseline: current.clone(), label: label.to_string() });
        crate::log_info!(
            "snapshot captured for {} ({}) at {}x{}",
            family,
            label,
            current.width(),
            current.height()
        );
        true
    }

    pub fn get(&self, family: OperationFamily) -> Option<&Snapshot> {
        self.slots[family.slot()].as_ref()
    }

    /// The baseline an application of `family` must start from.
    pub fn baseline(&self, family: OperationFamily) -> Option<&PixelBuffer> {
        self.get(family).map(|s| &s.baseline)
    }

    pub fn contains(&self, family: OperationFamily) -> bool {
        self.slots[family.slot()].is_some()
    }

    /// Take the baseline out of its slot, leaving the slot empty.
    pub fn take(&mut self, family: OperationFamily) -> Result<Snapshot> {
        let snapshot = self.slots[family.slot()].take().ok_or(EngineError::NoSnapshot(family))?;
        crate::log_info!("snapshot restored for {} ({})", family, snapshot.label);
        Ok(snapshot)
    }

    /// Drop the family's baseline without restoring it.
    pub fn clear(&mut self, family: OperationFamily) {
        if self.slots[family.slot()].take().is_some() {
            crate::log_info!("snapshot cleared for {}", family);
        }
    }

    pub fn clear_all(&mut self) {
        for family in OperationFamily::all() {
            self.clear(*family);
        }
    }

    /// Bytes held by all baselines.
    pub fn memory_bytes(&self) -> usize {
        self.slots.iter().flatten().map(|s| s.baseline.data().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_only_once_per_family() {
        let mut mgr = SnapshotManager::new();
        let first = PixelBuffer::new_filled(2, 2, [1, 1, 1, 255]);
        let second = PixelBuffer::new_filled(2, 2, [9, 9, 9, 255]);
        assert!(mgr.capture_if_absent(OperationFamily::Boolean, &first, "AND"));
        assert!(!mgr.capture_if_absent(OperationFamily::Boolean, &second, "OR"));
        let snap = mgr.get(OperationFamily::Boolean).unwrap();
        assert_eq!(snap.baseline, first);
        assert_eq!(snap.label, "AND");
    }

    #[test]
    fn families_are_independent() {
        let mut mgr = SnapshotManager::new();
        let img = PixelBuffer::new(1, 1);
        mgr.capture_if_absent(OperationFamily::Rotation, &img, "rotate");
        assert!(mgr.contains(OperationFamily::Rotation));
        assert!(!mgr.contains(OperationFamily::Arithmetic));
        mgr.clear(OperationFamily::Arithmetic);
        assert!(mgr.contains(OperationFamily::Rotation));
        assert_eq!(mgr.memory_bytes(), 4);
    }

    #[test]
    fn take_empties_the_slot() {
        let mut mgr = SnapshotManager::new();
        let img = PixelBuffer::new(3, 1);
        mgr.capture_if_absent(OperationFamily::Distortion, &img, "noise");
        assert_eq!(mgr.take(OperationFamily::Distortion).unwrap().baseline, img);
        assert!(matches!(
            mgr.take(OperationFamily::Distortion),
            Err(EngineError::NoSnapshot(OperationFamily::Distortion))
        ));
    }

    #[test]
    fn clear_all_drops_everything() {
        let mut mgr = SnapshotManager::new();
        let img = PixelBuffer::new(1, 1);
        for family in OperationFamily::all() {
            mgr.capture_if_absent(*family, &img, family.name());
        }
        mgr.clear_all();
        assert!(OperationFamily::all().iter().all(|f| !mgr.contains(*f)));
    }
}
