//! Global flag table: descriptors and segment allocation.

use anyhow::{bail, Result};
use std::collections::BTreeMap;

use crate::FlagId;

#[derive(Clone, Debug)]
pub struct Flag {
    pub id: FlagId,
    pub name: String,
    /// Fixed flags are never reclaimed.
    pub fixed: bool,
}

/// The flag-id allocator and registry.
///
/// Populated explicitly at init; wall flags are allocated on demand from the
/// tail of the `0x200` segment during write-back.
pub struct FlagTable {
    flags: BTreeMap<FlagId, Flag>,
    pub always_true: FlagId,
    pub calm: FlagId,
}

impl FlagTable {
    pub fn new() -> Self {
        let mut table = FlagTable {
            flags: BTreeMap::new(),
            always_true: 0x2f0,
            calm: 0x283,
        };
        table.insert(Flag {
            id: 0x2f0,
            name: "AlwaysTrue".to_string(),
            fixed: true,
        });
        table.insert(Flag {
            id: 0x283,
            name: "CalmedSea".to_string(),
            fixed: true,
        });
        table
    }

    pub fn insert(&mut self, flag: Flag) {
        self.flags.insert(flag.id, flag);
    }

    pub fn get(&self, id: FlagId) -> Option<&Flag> {
        self.flags.get(&id)
    }

    /// Allocates the first free id in `[0x280, 0x300)`.  Only the `0x200`
    /// segment supports allocation.
    pub fn alloc(&mut self, segment: FlagId) -> Result<FlagId> {
        if segment != 0x200 {
            bail!("Cannot allocate flag outside the 2xx segment");
        }
        for id in 0x280..0x300 {
            if !self.flags.contains_key(&id) {
                self.insert(Flag {
                    id,
                    name: format!("Wall {:02x}", id & 0xff),
                    fixed: true,
                });
                return Ok(id);
            }
        }
        bail!("No free flags");
    }

    pub fn free(&mut self, id: FlagId) {
        self.flags.remove(&id);
    }
}

impl Default for FlagTable {
    fn default() -> Self {
        FlagTable::new()
    }
}
