//! Cross-location state and bidirectional exit-graph maintenance.
//!
//! Every exit is co-owned by two metalocations, so any operation that
//! touches both ends goes through the `MetaWorld`.  The invariant: for each
//! `(pos, type) -> (dest, destType)` entry, the destination's table holds
//! the reciprocal entry pointing back.  Raw mutation through
//! `set_exit_one_way` can break this; the operations here restore it.
//! Stale reciprocals are always read before anything is written.

use anyhow::{Context, Result};
use hashbrown::HashSet;
use std::collections::BTreeMap;

use metamap_game::flags::FlagTable;
use metamap_game::location::Location;
use metamap_game::metascreen::ConnectionType;
use metamap_game::{GameData, LocationId, MetascreenId, MetatilesetId, Pos};

use crate::metalocation::{ExitSpec, Metalocation};

pub struct MetaWorld {
    pub locations: BTreeMap<LocationId, Location>,
    pub metas: BTreeMap<LocationId, Metalocation>,
    pub flags: FlagTable,
}

impl MetaWorld {
    pub fn new() -> Self {
        MetaWorld {
            locations: BTreeMap::new(),
            metas: BTreeMap::new(),
            flags: FlagTable::new(),
        }
    }

    pub fn add_location(&mut self, location: Location) {
        self.locations.insert(location.id, location);
    }

    pub fn location(&self, id: LocationId) -> Result<&Location> {
        self.locations
            .get(&id)
            .with_context(|| format!("No location record {id:02x}"))
    }

    pub fn location_mut(&mut self, id: LocationId) -> Result<&mut Location> {
        self.locations
            .get_mut(&id)
            .with_context(|| format!("No location record {id:02x}"))
    }

    pub fn meta(&self, id: LocationId) -> Result<&Metalocation> {
        self.metas
            .get(&id)
            .with_context(|| format!("No metalocation for {id:02x}"))
    }

    pub fn meta_mut(&mut self, id: LocationId) -> Result<&mut Metalocation> {
        self.metas
            .get_mut(&id)
            .with_context(|| format!("No metalocation for {id:02x}"))
    }

    /// Builds the metalocation for a record if it isn't built yet.
    pub fn build_meta(
        &mut self,
        id: LocationId,
        game: &GameData,
        tileset: Option<MetatilesetId>,
    ) -> Result<()> {
        if self.metas.contains_key(&id) {
            return Ok(());
        }
        let meta = Metalocation::of(&self.locations, id, game, &self.flags, tileset)?;
        self.metas.insert(id, meta);
        Ok(())
    }

    /// Installs a freshly built metalocation, replacing any previous one.
    pub fn install_meta(&mut self, meta: Metalocation) {
        self.metas.insert(meta.id, meta);
    }

    pub fn take_meta(&mut self, id: LocationId) -> Result<Metalocation> {
        self.metas
            .remove(&id)
            .with_context(|| format!("No metalocation for {id:02x}"))
    }

    ////////////////////////////////////////////////////////////////
    // Exit-graph maintenance

    /// Connects two exit specs bidirectionally.
    pub fn connect(&mut self, a: ExitSpec, b: ExitSpec, game: &GameData) -> Result<()> {
        self.attach(
            (a.0 >> 8) as LocationId,
            a.0 & 0xff,
            (b.0 >> 8) as LocationId,
            b.0 & 0xff,
            Some(a.1),
            Some(b.1),
            game,
        )
    }

    /// Attaches an exit/entrance pair in both directions.  If either side
    /// had a previous partner, the two stale partners are re-pointed at
    /// each other; a single stale partner is deleted unless it is one of
    /// the endpoints being attached (patching the reverse of a one-way
    /// exit must not remove the forward edge).
    #[allow(clippy::too_many_arguments)]
    pub fn attach(
        &mut self,
        src: LocationId,
        src_pos: Pos,
        dest: LocationId,
        dest_pos: Pos,
        src_type: Option<ConnectionType>,
        dest_type: Option<ConnectionType>,
        game: &GameData,
    ) -> Result<()> {
        let src_type = match src_type {
            Some(t) => t,
            None => self.meta(src)?.pick_type_from_exits(src_pos, game)?,
        };
        let dest_type = match dest_type {
            Some(t) => t,
            None => self.meta(dest)?.pick_type_from_exits(dest_pos, game)?,
        };
        let dest_tile = (dest as i32) << 8 | dest_pos;
        let src_tile = (src as i32) << 8 | src_pos;
        // Read both stale reciprocals before mutating anything.
        let prev_dest = self.meta(src)?.get_exit(src_pos, src_type);
        let prev_src = self.meta(dest)?.get_exit(dest_pos, dest_type);
        if let (Some(pd), Some(ps)) = (prev_dest, prev_src) {
            if pd == (dest_tile, dest_type) && ps == (src_tile, src_type) {
                return Ok(()); // already attached exactly like this
            }
        }
        self.meta_mut(src)?
            .set_exit_one_way(src_pos, src_type, (dest_tile, dest_type));
        self.meta_mut(dest)?
            .set_exit_one_way(dest_pos, dest_type, (src_tile, src_type));
        if let (Some(prev_dest), Some(prev_src)) = (prev_dest, prev_src) {
            // Hook the two stale partners up to each other.
            let (pd_tile, pd_type) = prev_dest;
            let (ps_tile, ps_type) = prev_src;
            self.meta_mut((ps_tile >> 8) as LocationId)?
                .set_exit_one_way(ps_tile & 0xff, ps_type, prev_dest);
            self.meta_mut((pd_tile >> 8) as LocationId)?
                .set_exit_one_way(pd_tile & 0xff, pd_type, prev_src);
        } else if let Some((p_tile, p_type)) = prev_src.or(prev_dest) {
            if (p_tile, p_type) != (src_tile, src_type)
                && (p_tile, p_type) != (dest_tile, dest_type)
            {
                self.meta_mut((p_tile >> 8) as LocationId)?
                    .delete_exit(p_tile & 0xff, p_type);
            }
        }
        Ok(())
    }

    /// Moves exits within one metalocation.  For each move the destination's
    /// reciprocal is read and repointed before the source entry is deleted.
    pub fn move_exits(
        &mut self,
        id: LocationId,
        moves: &[(Pos, ConnectionType, Pos, ConnectionType)],
    ) -> Result<()> {
        let mut new_exits: Vec<(Pos, ConnectionType, ExitSpec)> = Vec::new();
        for &(old_pos, old_type, new_pos, new_type) in moves {
            let dest_exit = self
                .meta(id)?
                .get_exit(old_pos, old_type)
                .with_context(|| format!("No exit to move at {old_pos:02x} {old_type}"))?;
            let (dest_tile, dest_type) = dest_exit;
            self.meta_mut((dest_tile >> 8) as LocationId)?
                .set_exit_one_way(
                    dest_tile & 0xff,
                    dest_type,
                    ((id as i32) << 8 | new_pos, new_type),
                );
            new_exits.push((new_pos, new_type, dest_exit));
            self.meta_mut(id)?.delete_exit(old_pos, old_type);
        }
        for (pos, ctype, spec) in new_exits {
            self.meta_mut(id)?.set_exit_one_way(pos, ctype, spec);
        }
        Ok(())
    }

    pub fn move_exit(
        &mut self,
        id: LocationId,
        prev: Pos,
        next: Pos,
        prev_type: Option<ConnectionType>,
        next_type: Option<ConnectionType>,
        game: &GameData,
    ) -> Result<()> {
        let prev_type = match prev_type {
            Some(t) => t,
            None => self.meta(id)?.pick_type_from_exits(prev, game)?,
        };
        let next_type = match next_type {
            Some(t) => t,
            None => self.meta(id)?.pick_type_from_screens(next, game)?,
        };
        self.move_exits(id, &[(prev, prev_type, next, next_type)])
    }

    /// Hands every exit and pit sitting on a non-placeholder screen of the
    /// target layout over from `from` to `to`.
    pub fn move_exits_and_pits_to(
        &mut self,
        from: LocationId,
        to: LocationId,
        game: &GameData,
    ) -> Result<()> {
        let moved: HashSet<Pos> = {
            let target = self.meta(to)?;
            target
                .all_pos()
                .into_iter()
                .filter(|&p| !game.metascreen(target.get(p)).data.delete)
                .collect()
        };
        for (pos, ctype, (dest_tile, dest_type)) in self.meta(from)?.exits_vec() {
            if !moved.contains(&pos) {
                continue;
            }
            self.meta_mut((dest_tile >> 8) as LocationId)?
                .set_exit_one_way(dest_tile & 0xff, dest_type, ((to as i32) << 8 | pos, ctype));
            self.meta_mut(to)?
                .set_exit_one_way(pos, ctype, (dest_tile, dest_type));
            self.meta_mut(from)?.delete_exit(pos, ctype);
        }
        for (pos, dest) in self.meta(from)?.pits_vec() {
            if !moved.contains(&pos) {
                continue;
            }
            self.meta_mut(to)?.set_pit(pos, dest);
            self.meta_mut(from)?.pits.remove(&pos);
        }
        Ok(())
    }

    /// Given a matched pair (e.g. the halves of a seamless scroll pair),
    /// keeps only mutually-consistent non-seamless edges: consistent ones
    /// are copied onto whichever side lacks them, inconsistent ones are
    /// dropped from both.
    pub fn reconcile_exits(&mut self, a: LocationId, b: LocationId) -> Result<()> {
        let mut add: Vec<(LocationId, Pos, ConnectionType, ExitSpec)> = Vec::new();
        let mut del: Vec<(LocationId, Pos, ConnectionType)> = Vec::new();
        for &id in &[a, b] {
            for (pos, ctype, (dest_tile, dest_type)) in self.meta(id)?.exits_vec() {
                if dest_type.is_seamless() {
                    continue;
                }
                let reverse = self
                    .metas
                    .get(&((dest_tile >> 8) as LocationId))
                    .and_then(|m| m.get_exit(dest_tile & 0xff, dest_type));
                if let Some((rev_tile, rev_type)) = reverse {
                    if (rev_tile >> 8) as LocationId == id
                        && rev_tile & 0xff == pos
                        && rev_type == ctype
                    {
                        add.push((
                            if id == a { b } else { a },
                            pos,
                            ctype,
                            (dest_tile, dest_type),
                        ));
                        continue;
                    }
                }
                del.push((id, pos, ctype));
            }
        }
        for (id, pos, ctype) in del {
            self.meta_mut(id)?.delete_exit(pos, ctype);
        }
        for (id, pos, ctype, spec) in add {
            self.meta_mut(id)?.set_exit_one_way(pos, ctype, spec);
        }
        Ok(())
    }

    /// Splices columns out of / into a metalocation's grid: exits in the
    /// deleted columns expire, and exits, flags, and spawns at or past the
    /// insertion point shift by the net column delta.
    pub fn splice_columns(
        &mut self,
        id: LocationId,
        left: i32,
        deleted: i32,
        inserted: i32,
        screens: &[Vec<MetascreenId>],
        game: &GameData,
    ) -> Result<()> {
        let delta = inserted - deleted;
        self.meta_mut(id)?
            .splice_columns_grid(left, deleted, inserted, screens, game);
        let mut moves = Vec::new();
        for (pos, ctype, _) in self.meta(id)?.exits_vec() {
            let x = pos & 0xf;
            if x < left + deleted {
                if x >= left {
                    self.meta_mut(id)?.delete_exit(pos, ctype);
                }
                continue;
            }
            moves.push((pos, ctype, pos + delta, ctype));
        }
        self.move_exits(id, &moves)?;

        // Shift flags and spawns in the parent record.
        let parent = self.location_mut(id)?;
        let xt0 = (left + deleted) << 4;
        for spawn in &mut parent.spawns {
            if spawn.xt < xt0 {
                continue;
            }
            spawn.xt += delta << 4;
        }
        let mut flags = std::mem::take(&mut parent.flags);
        flags.retain_mut(|flag| {
            let xs = flag.screen & 0xf;
            if xs < left + deleted {
                return xs < left;
            }
            flag.screen += delta;
            true
        });
        parent.flags = flags;
        Ok(())
    }
}

impl Default for MetaWorld {
    fn default() -> Self {
        MetaWorld::new()
    }
}
