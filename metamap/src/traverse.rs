//! Structural connectivity over a metalocation's screen grid.
//!
//! No tile-level search here: each screen carries pre-classified connected
//! segments per traversal mode, and adjacent screens share connection-point
//! keys by construction, so a union-find over `pos << 8 | point` gives the
//! full reachability relation directly.

use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use metamap_game::metascreen::ConnectionType;
use metamap_game::unionfind::UnionFind;
use metamap_game::{GameData, MetascreenId, Pos, TileId};

use crate::metalocation::Metalocation;

#[derive(Default)]
pub struct TraverseOpts<'a> {
    /// Overlay screens to use in place of the current grid.
    pub with: Option<&'a BTreeMap<Pos, MetascreenId>>,
    /// Do not assume any flags are set (walls stay unbroken).
    pub no_flagged: bool,
    /// Assume flight.
    pub flight: bool,
}

/// Result of a traversal: every connection point maps to its full reachable
/// set.  Sets live in an arena; the index maps points to arena slots.
pub struct Traversal {
    pub sets: Vec<BTreeSet<TileId>>,
    pub index: HashMap<TileId, usize>,
}

impl Traversal {
    pub fn reachable(&self, point: TileId) -> Option<&BTreeSet<TileId>> {
        self.index.get(&point).map(|&i| &self.sets[i])
    }

    pub fn connected(&self, a: TileId, b: TileId) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&ia), Some(&ib)) => ia == ib,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl Metalocation {
    /// Unions each screen's connected segments for the requested traversal
    /// mode and returns the resulting point partition.
    pub fn traverse(&self, game: &GameData, opts: &TraverseOpts) -> Traversal {
        let mut uf = UnionFind::new(0x20000);
        let mode = (if opts.flight { 2 } else { 0 }) | (if opts.no_flagged { 1 } else { 0 });
        for pos in self.all_pos() {
            let mid = opts
                .with
                .and_then(|m| m.get(&pos).copied())
                .unwrap_or_else(|| self.get(pos));
            for segment in &game.metascreen(mid).connections[mode] {
                if segment.is_empty() {
                    continue; // e.g. empty screen
                }
                let keys: Vec<u32> = segment
                    .iter()
                    .map(|&c| ((pos as u32) << 8) + c as u32)
                    .collect();
                uf.union(&keys);
            }
        }

        let sets: Vec<BTreeSet<TileId>> = uf
            .sets()
            .into_iter()
            .map(|s| s.into_iter().map(|k| k as TileId).collect())
            .collect();
        let mut index = HashMap::new();
        for (i, set) in sets.iter().enumerate() {
            for &point in set {
                index.insert(point, i);
            }
        }
        Traversal { sets, index }
    }

    /// Maps a traversal point back to the exit type it represents, if it is
    /// one.  Edge exits only count on the matching grid boundary.
    pub fn exit_type(&self, game: &GameData, point: TileId) -> Option<ConnectionType> {
        if point & 0xf0 != 0xe0 {
            return None;
        }
        let pos = point >> 8;
        let scr = game.metascreen(self.get(pos));
        let ctype = scr.data.exits.get((point & 0xf) as usize)?.ctype;
        match ctype {
            ConnectionType::EdgeTop if pos >> 4 != 0 => None,
            ConnectionType::EdgeLeft if pos & 0xf != 0 => None,
            ConnectionType::EdgeBottom if pos >> 4 != self.height() - 1 => None,
            ConnectionType::EdgeRight if pos & 0xf != self.width() - 1 => None,
            _ => Some(ctype),
        }
    }
}
