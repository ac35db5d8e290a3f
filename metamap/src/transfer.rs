//! Re-derives exits, pits, and spawns for a freshly generated layout from
//! the original layout's semantics.
//!
//! The flow for one location: take the original metalocation out of the
//! world, build the new layout, run `transfer_exits` (and the local
//! `transfer_flags`/`transfer_pits`), `transfer_spawns`, then install the
//! new metalocation.  `shuffle_pits` runs after every location is installed
//! so pit landings resolve against final layouts.

use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use log::error;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use metamap_game::location::WallKind;
use metamap_game::metascreen::{ConnectionType, Feature};
use metamap_game::pos::{add_delta, distance, yt_add, yt_diff};
use metamap_game::{GameData, LocationId, Pos};

use crate::metalocation::{ExitSpec, Metalocation};
use crate::world::MetaWorld;

/// Landmark classes for spawn relocation, in decreasing reach.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MatchKind {
    Arena,
    Exit,
    Poi,
}

impl MetaWorld {
    /// Takes ownership of the original layout's exits: pools the new
    /// layout's eligible exit screens per type and pops one per original
    /// exit, repointing reciprocals that referred back to the original.
    ///
    /// `meta` is the new (detached) layout; `orig` the layout it replaces,
    /// with the same location id.  Pool exhaustion fails the attempt.
    pub fn transfer_exits(
        &mut self,
        meta: &mut Metalocation,
        orig: &Metalocation,
        rng: &mut StdRng,
        game: &GameData,
    ) -> Result<()> {
        let mut pools: BTreeMap<ConnectionType, Vec<Pos>> = BTreeMap::new();
        let mut self_exits: BTreeMap<ConnectionType, BTreeSet<Pos>> = BTreeMap::new();
        for pos in meta.all_pos() {
            let scr = game.metascreen(meta.get(pos));
            for e in &scr.data.exits {
                // Edge exits only count on the matching boundary.
                match e.ctype {
                    ConnectionType::EdgeTop if pos >> 4 != 0 => continue,
                    ConnectionType::EdgeLeft if pos & 0xf != 0 => continue,
                    ConnectionType::EdgeBottom if pos >> 4 < meta.height() - 1 => continue,
                    ConnectionType::EdgeRight if pos & 0xf < meta.width() - 1 => continue,
                    _ => {}
                }
                pools.entry(e.ctype).or_default().push(pos);
            }
        }
        for pool in pools.values_mut() {
            pool.shuffle(rng);
        }
        for (opos, ctype, (dest_tile, dest_type)) in orig.exits_vec() {
            if self_exits.get(&ctype).is_some_and(|s| s.contains(&opos)) {
                continue;
            }
            let pos = pools
                .get_mut(&ctype)
                .and_then(|p| p.pop())
                .with_context(|| {
                    format!(
                        "Could not transfer exit {ctype} in {:02x}: no eligible screen",
                        meta.id
                    )
                })?;
            let eloc = (dest_tile >> 8) as LocationId;
            let epos = dest_tile & 0xff;
            let etype = dest_type;
            if eloc == orig.id {
                // Self-exit: both ends live in this location, so just pick a
                // second screen of the right type and skip the reciprocal
                // when we come to it.
                let npos = pools
                    .get_mut(&etype)
                    .and_then(|p| p.pop())
                    .with_context(|| {
                        format!("Could not transfer self-exit {etype} in {:02x}", meta.id)
                    })?;
                meta.set_exit_one_way(pos, ctype, ((meta.id as i32) << 8 | npos, etype));
                meta.set_exit_one_way(npos, etype, ((meta.id as i32) << 8 | pos, ctype));
                self_exits.entry(etype).or_default().insert(epos);
                continue;
            }
            let ret = self
                .meta(eloc)?
                .get_exit(epos, etype)
                .with_context(|| {
                    format!("No reciprocal exit in {eloc:02x} at {epos:02x} {etype}")
                })?;
            if (ret.0 >> 8) as LocationId == meta.id && ret.0 & 0xff == opos && ret.1 == ctype {
                self.meta_mut(eloc)?
                    .set_exit_one_way(epos, etype, ((meta.id as i32) << 8 | pos, ctype));
            }
            meta.set_exit_one_way(pos, ctype, (dest_tile, dest_type));
        }
        Ok(())
    }

    /// Ensures every pit lands somewhere sensible in its destination map.
    ///
    /// For each pit screen, the nearest exit leading to one of the original
    /// destinations anchors a source→destination delta triangle; the pit
    /// lands on the nearest eligible screen to the translated target, with
    /// spike screens taking priority by descending spike-edge count.
    pub fn shuffle_pits(
        &mut self,
        id: LocationId,
        _rng: &mut StdRng,
        game: &GameData,
    ) -> Result<()> {
        let mut meta = self.take_meta(id)?;
        let result = self.shuffle_pits_inner(&mut meta, game);
        self.install_meta(meta);
        result
    }

    fn shuffle_pits_inner(&mut self, meta: &mut Metalocation, game: &GameData) -> Result<()> {
        if meta.pits_vec().is_empty() {
            return Ok(());
        }
        let dests: BTreeSet<LocationId> = meta
            .pits_vec()
            .iter()
            .map(|&(_, d)| (d >> 8) as LocationId)
            .collect();
        meta.pits.clear();

        // Pair each pit screen with a target position in whichever
        // destination its nearest matching exit leads to.
        let mut pits: BTreeMap<LocationId, Vec<(Pos, Pos)>> = BTreeMap::new();
        for pos in meta.all_pos() {
            if !game.metascreen(meta.get(pos)).has_feature(Feature::Pit) {
                continue;
            }
            let mut closest: (Pos, Option<LocationId>, i32) = (-1, None, i32::MAX);
            for (exit_pos, _, (dest_tile, _)) in meta.exits_vec() {
                let dist = distance(pos, exit_pos);
                let dloc = (dest_tile >> 8) as LocationId;
                if dests.contains(&dloc) && dist < closest.2 {
                    let (dh, dw) = if dloc == meta.id {
                        (meta.height(), meta.width())
                    } else {
                        let dmeta = self.meta(dloc)?;
                        (dmeta.height(), dmeta.width())
                    };
                    let dpos = dest_tile & 0xff;
                    closest = (add_delta(pos, dpos, exit_pos, dh, dw), Some(dloc), dist);
                }
            }
            if let (target, Some(dloc), _) = closest {
                pits.entry(dloc).or_default().push((pos, target));
            }
        }
        for &dest in &dests {
            let list = pits.entry(dest).or_default();
            // No direct exit toward this destination: push a large delta
            // toward the bottom of the map.
            if list.is_empty() {
                list.push((0, 0xf0));
            }
        }

        for (dest_id, list) in pits {
            let (eligible, spikes, dheight, dwidth) = {
                let dmeta: &Metalocation = if dest_id == meta.id {
                    &*meta
                } else {
                    self.meta(dest_id)?
                };
                let mut eligible: [Vec<Pos>; 2] = [Vec::new(), Vec::new()];
                let mut spikes: HashMap<Pos, i32> = HashMap::new();
                for pos in dmeta.all_pos() {
                    let scr = game.metascreen(dmeta.get(pos));
                    if scr.has_feature(Feature::River) || scr.has_feature(Feature::Empty) {
                        continue;
                    }
                    let open = |d: usize| scr.edge(d) != ' ';
                    if open(0) && open(2) {
                        eligible[0].push(pos);
                    }
                    // Spike screens are always horizontal-eligible so a
                    // viable landing exists wherever spikes do.
                    if (open(1) && open(3)) || scr.has_feature(Feature::Spikes) {
                        eligible[1].push(pos);
                    }
                    if scr.has_feature(Feature::Spikes) {
                        let count = scr
                            .data
                            .edges
                            .as_deref()
                            .map(|e| e.chars().filter(|&c| c == 's').count() as i32)
                            .unwrap_or(0);
                        spikes.insert(pos, count);
                    }
                }
                (eligible, spikes, dmeta.height(), dmeta.width())
            };

            // Walk the pits for this destination, keeping a running delta so
            // neighboring pits land near each other.
            let mut delta: (Pos, Pos) = (0, 0);
            for &(upstairs, downstairs) in &list {
                let scr = game.metascreen(meta.get(upstairs));
                let dir = if scr.edge(1) == 'c' && scr.edge(3) == 'c' { 1 } else { 0 };
                let target = add_delta(downstairs, delta.0, delta.1, dheight, dwidth);
                let mut closest: (Pos, i32, i32) = (-1, i32::MAX, 0);
                for &pos in &eligible[dir] {
                    let spike_count = spikes.get(&pos).copied().unwrap_or(0);
                    if spike_count < closest.2 {
                        continue;
                    }
                    let dist = distance(target, pos);
                    if dist < closest.1 {
                        closest = (pos, dist, spike_count);
                    }
                }
                if closest.0 < 0 {
                    bail!("No eligible pit destination in {dest_id:02x}");
                }
                delta = (closest.0, target);
                meta.set_pit(upstairs, (dest_id as i32) << 8 | closest.0);
            }
        }
        Ok(())
    }

    /// Moves NPCs, triggers, chests, and obstacle spawns onto the new
    /// layout, by proximity to paired landmarks (arenas, matched exits,
    /// POI) plus structural pools for platforms, statues, and walls.
    pub fn transfer_spawns(
        &mut self,
        meta: &Metalocation,
        orig: &Metalocation,
        rng: &mut StdRng,
        game: &GameData,
    ) -> Result<()> {
        let mut reverse_exits: HashMap<ExitSpec, (i32, i32)> = HashMap::new();
        // Pit screens of the new layout, with orientation (0=vert, 1=horiz).
        let mut pits: VecDeque<(Pos, usize)> = VecDeque::new();
        let mut statues: Vec<(Pos, i32)> = Vec::new();
        // Landmark rows: (old y, old x, new y, new x, max sq distance, kind),
        // all in full `yt`/`xt` tile coordinates.
        let mut map: Vec<(i32, i32, i32, i32, i32, MatchKind)> = Vec::new();
        let mut walls: Vec<(i32, i32)> = Vec::new();
        let mut bridges: Vec<(i32, i32)> = Vec::new();
        let mut arenas: Vec<(i32, i32)> = Vec::new();

        for &(is_new, loc) in &[(true, meta), (false, orig)] {
            for pos in loc.all_pos() {
                let scr = game.metascreen(loc.get(pos));
                let y = pos & 0xf0;
                let x = (pos & 0xf) << 4;
                if is_new && scr.has_feature(Feature::Pit) {
                    let dir = if scr.edge_index('c') == Some(5) { 0 } else { 1 };
                    pits.push_back((pos, dir));
                } else if is_new && !scr.data.statues.is_empty() {
                    for (i, &row) in scr.data.statues.iter().enumerate() {
                        let parity = ((pos & 0xf) ^ (pos >> 4) ^ i as i32) & 1;
                        let col: i32 = if parity != 0 { 0x5 } else { 0xa };
                        statues.push((pos, (row as i32) << 4 | col));
                    }
                }
                if is_new && scr.has_feature(Feature::Wall) {
                    let wall = scr.data.wall.context("missing wall prop")?;
                    walls.push((y | (wall >> 4) as i32, x | (wall & 0xf) as i32));
                } else if is_new && scr.has_feature(Feature::Bridge) {
                    let wall = scr.data.wall.context("missing wall prop")?;
                    bridges.push((y | (wall >> 4) as i32, x | (wall & 0xf) as i32));
                }
                if !scr.has_feature(Feature::Arena) {
                    continue;
                }
                if is_new {
                    arenas.push((y | 8, x | 8));
                } else {
                    let (ny, nx) = arenas.pop().with_context(|| {
                        format!("Arena count mismatch in {:02x}", meta.id)
                    })?;
                    map.push((y | 8, x | 8, ny, nx, 144, MatchKind::Arena)); // 12 tiles
                }
            }
            if is_new {
                arenas.shuffle(rng);
                statues.shuffle(rng);
            }
        }

        // Pair up exits between the layouts: the new layout's exits key by
        // destination spec, the original's look their partner up.
        for &(is_new, loc) in &[(true, meta), (false, orig)] {
            for (pos, ctype, spec) in loc.exits_vec() {
                let scr = game.metascreen(loc.get(pos));
                let conn = scr
                    .find_exit_by_type(ctype)
                    .with_context(|| format!("Invalid exit: {} {ctype}", scr.name()))?;
                let e0 = conn.exits.first().copied().unwrap_or(0) as i32;
                let y0 = (pos >> 4) << 4 | (e0 >> 4);
                let x0 = (pos & 0xf) << 4 | (e0 & 0xf);
                if is_new {
                    reverse_exits.insert(spec, (y0, x0));
                } else if (spec.0 >> 8) as LocationId != meta.id {
                    // Self-exits never pair.
                    let &(ny, nx) = reverse_exits.get(&spec).with_context(|| {
                        format!("Missing reciprocal for spawn transfer in {:02x}", meta.id)
                    })?;
                    map.push((y0, x0, ny, nx, 25, MatchKind::Exit)); // 5 tiles
                }
            }
        }

        // POI queue by priority, shuffled within each band.
        let mut ppoi: [Vec<(i32, i32)>; 6] = Default::default();
        for pos in meta.all_pos() {
            let scr = game.metascreen(meta.get(pos));
            for &(p, dy, dx) in &scr.data.poi {
                let y = ((pos & 0xf0) << 4) + dy as i32;
                let x = ((pos & 0x0f) << 8) + dx as i32;
                ppoi[p as usize].push((y, x));
            }
        }
        for poi in ppoi.iter_mut() {
            poi.shuffle(rng);
        }
        let mut all_poi: VecDeque<(i32, i32)> = ppoi.into_iter().flatten().collect();

        let loc = self
            .locations
            .get_mut(&meta.id)
            .with_context(|| format!("No location record {:02x}", meta.id))?;
        let mut order: Vec<usize> = (0..loc.spawns.len()).collect();
        order.shuffle(rng);
        for i in order {
            let spawn = &mut loc.spawns[i];
            if spawn.is_monster() {
                let platform = game
                    .platform_monsters
                    .iter()
                    .position(|&m| m == spawn.monster_id());
                if let (Some(platform), Some(&(pos, dir))) = (platform, pits.front()) {
                    pits.pop_front();
                    spawn.id = game.platform_monsters[platform & 2 | dir];
                    spawn.set_screen(pos);
                    spawn.set_tile(if dir != 0 { 0x73 } else { 0x47 });
                } else if game.statue_monster == Some(spawn.monster_id()) {
                    if let Some((screen, tile)) = statues.pop() {
                        spawn.set_screen(screen);
                        spawn.set_tile(tile as u8);
                    }
                }
                continue; // monsters are re-placed wholesale afterwards
            }
            if spawn.is_wall() {
                let kind = spawn.wall_kind();
                let pool = if kind == Some(WallKind::Bridge) {
                    &mut bridges
                } else {
                    &mut walls
                };
                let (y, x) = pool.pop().with_context(|| {
                    format!(
                        "Not enough {kind:?} screens in new metalocation {}",
                        loc.name
                    )
                })?;
                spawn.yt = y;
                spawn.xt = x;
                continue;
            }
            if spawn.is_npc() || spawn.is_boss() || spawn.is_trigger() || spawn.is_generic() {
                let mut best: (i32, i32, i32) = (-1, -1, i32::MAX);
                for &(y0, x0, y1, x1, dmax, kind) in &map {
                    if kind != MatchKind::Arena && spawn.is_boss() {
                        continue; // bosses need an arena
                    }
                    let d = yt_diff(spawn.yt, y0).pow(2) + (spawn.xt - x0).pow(2);
                    if d <= dmax && d < best.2 {
                        best = (
                            yt_add(spawn.yt, yt_diff(y1, y0)),
                            spawn.xt + x1 - x0,
                            d,
                        );
                    }
                }
                if best.2 < i32::MAX {
                    spawn.yt = best.0;
                    spawn.xt = best.1;
                    continue;
                }
            }
            // No landmark in budget.  Triggers and bosses may not fall back.
            if spawn.is_trigger() || spawn.is_boss() {
                bail!(
                    "Could not place {} {} {:02x}",
                    loc.name,
                    if spawn.is_boss() { "boss" } else { "trigger" },
                    spawn.id
                );
            }
            let (y, x) = all_poi
                .pop_front()
                .with_context(|| format!("Ran out of POI for {}", loc.name))?;
            // Future dual spawns stacked on this one follow it.
            map.push((spawn.y() >> 4, spawn.x() >> 4, y >> 4, x >> 4, 4, MatchKind::Poi));
            spawn.set_y(y);
            spawn.set_x(x);
        }
        Ok(())
    }

    /// Re-places every used monster spawn through the location's placement
    /// pools.  Call only after `write` has projected the new screens.
    pub fn replace_monsters(
        &mut self,
        id: LocationId,
        rng: &mut StdRng,
        game: &GameData,
    ) -> Result<()> {
        let loc = self
            .locations
            .get_mut(&id)
            .with_context(|| format!("No location record {id:02x}"))?;
        if loc.swim {
            return Ok(()); // water maps keep their monsters off land
        }
        let mut placer = loc.monster_placer(game);
        for spawn in &mut loc.spawns {
            if !spawn.used || !spawn.is_monster() {
                continue;
            }
            let Some(monster) = game.monsters.get(&spawn.monster_id()) else {
                continue;
            };
            match placer.place(monster, rng) {
                None => {
                    error!(
                        "no valid location for monster {:02x} in {}",
                        spawn.id, loc.name
                    );
                    spawn.used = false;
                }
                Some(_)
                    if monster.placement == metamap_game::location::Placement::Bird =>
                {
                    // Birds spawn offscreen on a timer.
                    spawn.set_y(0xfd0);
                    spawn.set_x(0x7f0);
                    spawn.timed = true;
                }
                Some(pos) => {
                    spawn.set_screen(pos >> 8);
                    spawn.set_tile((pos & 0xff) as u8);
                }
            }
        }
        Ok(())
    }
}
