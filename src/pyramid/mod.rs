use bevy::math::UVec2;


/// Largest side length of the pyramid's base level.
///
/// Viewports larger than this are clamped, trading base-level precision
/// for bounded GPU memory.
pub const MAXIMUM_BUFFER_SIZE: u32 = 2048;


/// Side length of the pyramid's base level for a viewport.
///
/// The next power of two of the larger viewport dimension, clamped to
/// [`MAXIMUM_BUFFER_SIZE`]. A zero-sized viewport resolves to 1.
pub fn buffer_size(viewport: UVec2) -> u32 {
    viewport
        .x
        .max(viewport.y)
        .next_power_of_two()
        .min(MAXIMUM_BUFFER_SIZE)
}

/// Number of reduction levels beyond the base level.
///
/// `floor(log2(size))`; zero means the pyramid is degenerate and no
/// chain is built.
pub fn reduction_level_count(size: u32) -> u32 {
    debug_assert!(size > 0);
    size.ilog2()
}


/// Identifier of a transient render target used during one replay of a
/// [`PyramidPlan`]. Derived from the reduction level index, so ids are
/// stable across frames and across plan rebuilds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TemporaryId(pub u32);

/// Source of a reduce pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceSource {
    /// Mip level 0 of the pyramid storage (first reduction only).
    BaseLevel,
    /// The previous reduction level's temporary.
    Temporary(TemporaryId),
}

/// One operation of the per-frame command sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PyramidOp {
    /// Convert the depth source into mip level 0 of the pyramid storage.
    BlitDepth,
    /// Request a transient square render target of the given side length.
    AcquireTemporary { id: TemporaryId, size: u32 },
    /// Downsample `source` into the temporary `target` at half resolution.
    Reduce {
        source: ReduceSource,
        target: TemporaryId,
    },
    /// Copy the full temporary into the given mip level of the storage.
    CopyToLevel {
        source: TemporaryId,
        level: u32,
        size: u32,
    },
    /// Release a transient target. Emitted one level late so the reduce
    /// pass of the following level can still read it.
    ReleaseTemporary { id: TemporaryId },
}

/// The command sequence that repopulates every mip level of a pyramid
/// from the current depth source.
///
/// A pure function of `size`: building a plan twice for the same size
/// yields an equal value, so the render layer memoizes it per storage
/// generation and replays it verbatim every frame. The sequence is
///
/// 1. blit depth into the base level,
/// 2. per reduction level: acquire a half-size temporary, reduce into
///    it, copy it into the next mip, release the *previous* temporary,
/// 3. release the final temporary.
///
/// Releasing earlier would let a reduce pass read freed storage;
/// releasing later would leak one transient per rebuild.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PyramidPlan {
    size: u32,
    level_count: u32,
    ops: Vec<PyramidOp>,
}

impl PyramidPlan {
    /// Build the plan for a viewport, or `None` when the viewport is
    /// degenerate (no reduction level would exist).
    pub fn for_viewport(viewport: UVec2) -> Option<Self> {
        let size = buffer_size(viewport);
        if reduction_level_count(size) == 0 {
            return None;
        }

        Some(Self::new(size))
    }

    /// Build the plan for a base level of side `size`.
    ///
    /// `size` must be a power of two greater than 1.
    pub fn new(size: u32) -> Self {
        debug_assert!(size.is_power_of_two());

        let level_count = reduction_level_count(size);
        let mut ops = Vec::with_capacity(2 + 4 * level_count as usize);

        ops.push(PyramidOp::BlitDepth);

        let mut side = size;
        for level in 0..level_count {
            let id = TemporaryId(level);
            side = (side >> 1).max(1);

            ops.push(PyramidOp::AcquireTemporary { id, size: side });

            let source = if level == 0 {
                ReduceSource::BaseLevel
            } else {
                ReduceSource::Temporary(TemporaryId(level - 1))
            };
            ops.push(PyramidOp::Reduce { source, target: id });

            ops.push(PyramidOp::CopyToLevel {
                source: id,
                level: level + 1,
                size: side,
            });

            if level >= 1 {
                ops.push(PyramidOp::ReleaseTemporary {
                    id: TemporaryId(level - 1),
                });
            }
        }

        ops.push(PyramidOp::ReleaseTemporary {
            id: TemporaryId(level_count - 1),
        });

        Self {
            size,
            level_count,
            ops,
        }
    }

    /// Side length of the base level.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of reduction levels beyond the base level.
    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    /// Usable mip levels, base level included.
    pub fn total_levels(&self) -> u32 {
        self.level_count + 1
    }

    /// Nominal side length of mip level `level`.
    pub fn level_size(&self, level: u32) -> u32 {
        debug_assert!(level <= self.level_count);
        (self.size >> level).max(1)
    }

    /// The operations, in submission order.
    pub fn ops(&self) -> &[PyramidOp] {
        &self.ops
    }
}
