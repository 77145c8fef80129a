//! Free space search for inline data.

use std::ops::Range;

use serde_derive::Deserialize;

use crate::error::AssembleError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Lowest fitting offset at or after the search start.
    #[default]
    FirstFit,
    /// Smallest fitting run, lowest offset on ties.
    BestFit,
}

/// Which bytes of the image count as free and how runs of them are picked.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreeSpace {
    #[serde(deserialize_with = "crate::config::deserialize_bases_u8")]
    pub byte: u8,

    #[serde(deserialize_with = "crate::config::deserialize_bases_usize")]
    pub start: usize,

    /// Runs shorter than this are never used.
    #[serde(deserialize_with = "crate::config::deserialize_bases_usize")]
    pub min_run: usize,

    #[serde(deserialize_with = "crate::config::deserialize_bases_usize")]
    pub align: usize,

    pub strategy: Strategy,

    /// Search again from offset 0 when nothing fits after `start`.
    pub wrap: bool,
}

impl Default for FreeSpace {
    fn default() -> Self {
        Self {
            byte: 0xFF,
            start: 0,
            min_run: 0,
            align: 4,
            strategy: Strategy::FirstFit,
            wrap: true,
        }
    }
}

/// Hands out runs of free bytes, never the same byte twice and never a
/// byte that was reserved.
pub struct Allocator<'a> {
    image: &'a [u8],
    policy: &'a FreeSpace,
    taken: Vec<Range<usize>>,
}

impl<'a> Allocator<'a> {
    pub fn new(image: &'a [u8], policy: &'a FreeSpace) -> Self {
        Self {
            image,
            policy,
            taken: Vec::new(),
        }
    }

    /// Marks a range as in use. Ranges are kept sorted and merged.
    pub fn reserve(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let at = self.taken.partition_point(|r| r.end < range.start);
        let mut merged = range;
        while at < self.taken.len() && self.taken[at].start <= merged.end {
            let r = self.taken.remove(at);
            merged = merged.start.min(r.start)..merged.end.max(r.end);
        }
        self.taken.insert(at, merged);
    }

    pub fn is_taken(&self, offset: usize) -> bool {
        let at = self.taken.partition_point(|r| r.end <= offset);
        self.taken.get(at).is_some_and(|r| r.start <= offset)
    }

    /// Maximal runs of free, unreserved bytes starting at or after `from`.
    fn runs(&self, from: usize) -> Vec<Range<usize>> {
        let mut runs = Vec::new();
        let mut start = None;
        for offset in from..self.image.len() {
            let free = self.image[offset] == self.policy.byte && !self.is_taken(offset);
            match (free, start) {
                (true, None) => start = Some(offset),
                (false, Some(s)) => {
                    runs.push(s..offset);
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            runs.push(s..self.image.len());
        }
        runs
    }

    /// Where `len` bytes would go inside `run`, if they fit. Offset 0 is
    /// never handed out since it encodes as a null pointer.
    fn fit(&self, run: &Range<usize>, len: usize) -> Option<usize> {
        if run.len() < self.policy.min_run {
            return None;
        }
        let align = self.policy.align.max(1);
        let at = run.start.max(1).div_ceil(align) * align;
        (at + len <= run.end).then_some(at)
    }

    fn search(&self, from: usize, len: usize) -> Option<usize> {
        let runs = self.runs(from);
        match self.policy.strategy {
            Strategy::FirstFit => runs.iter().find_map(|run| self.fit(run, len)),
            Strategy::BestFit => runs
                .iter()
                .filter_map(|run| self.fit(run, len).map(|at| (run.len(), at)))
                .min()
                .map(|(_, at)| at),
        }
    }

    /// Finds room for `len` bytes and reserves it.
    pub fn allocate(&mut self, len: usize) -> Result<u32, AssembleError> {
        let mut found = self.search(self.policy.start, len);
        if found.is_none() && self.policy.wrap && self.policy.start > 0 {
            tracing::trace!("no free space after ${:08X}, wrapping", self.policy.start);
            found = self.search(0, len);
        }
        let at = found.ok_or(AssembleError::FreeSpaceExhausted(len))?;
        self.reserve(at..at + len);
        Ok(at as u32)
    }
}
