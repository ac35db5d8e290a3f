//! Projection of a metalocation back onto its raw location record.

use anyhow::{bail, Context, Result};
use hashbrown::HashSet;

use metamap_game::location::{Entrance, ExitRecord, FlagRecord, PitRecord};
use metamap_game::metascreen::ScreenFlag;
use metamap_game::unionfind::UnionFind;
use metamap_game::{FlagId, GameData, LocationId, Pos};

use crate::world::MetaWorld;

impl MetaWorld {
    /// Saves a metalocation's state back into its raw record: screens,
    /// exits (with destination entrance allocation), flags, and pits.
    pub fn write(&mut self, id: LocationId, game: &GameData) -> Result<()> {
        let meta = self.meta(id)?.clone();
        self.location_mut(id)?.exits.clear();

        let mut seamless_pos: HashSet<Pos> = HashSet::new();
        for (src_pos, src_type, (dest_tile, dest_type)) in meta.exits_vec() {
            let dest = (dest_tile >> 8) as LocationId;
            let mut dest_pos = dest_tile & 0xff;
            let dest_mid = if dest == id {
                meta.get(dest_pos)
            } else {
                self.meta(dest)?.get(dest_pos)
            };
            let src_scr = game.metascreen(meta.get(src_pos));
            let dest_scr = game.metascreen(dest_mid);
            let (Some(src_exit), Some(dest_exit)) = (
                src_scr.find_exit_by_type(src_type),
                dest_scr.find_exit_by_type(dest_type),
            ) else {
                bail!(
                    "Missing exit def: from {id:02x} @ {src_pos:02x}:{src_type} {} \
                     to {dest:02x} @ {dest_pos:02x}:{dest_type} {}",
                    src_scr.name(),
                    dest_scr.name()
                );
            };
            let mut entrance = 0x20u8;
            if dest_exit.ctype.is_seamless() {
                seamless_pos.insert(src_pos);
            } else {
                let mut dest_coord = dest_exit.entrance;
                if dest_coord > 0xefff {
                    // Straddling doorway: entrance renders a screen below.
                    dest_pos += 0x10;
                    dest_coord -= 0x10000;
                }
                entrance = self
                    .location_mut(dest)?
                    .find_or_add_entrance(dest_pos, dest_coord as u16) as u8;
            }
            let loc = self.location_mut(id)?;
            for &tile in &src_exit.exits {
                let mut screen = src_pos;
                let mut tile = tile;
                if tile & 0xf0 == 0xf0 {
                    screen += 0x10;
                    tile &= 0xf;
                }
                loc.exits.push(ExitRecord {
                    screen,
                    tile,
                    dest,
                    entrance,
                });
            }
        }

        {
            let loc = self.location_mut(id)?;
            loc.width = meta.width();
            loc.height = meta.height();
            loc.screens = (0..meta.height())
                .map(|y| {
                    (0..meta.width())
                        .map(|x| game.metascreen(meta.get(y << 4 | x)).sid())
                        .collect()
                })
                .collect();
            let mts = game.metatileset(meta.tileset);
            loc.tileset = mts.tileset_id;
            loc.tile_effects = mts.effects_id;
        }

        // Screen-level reachability from any exit, over open non-seamless
        // edges, decides which wall screens actually need a flag.
        let mut uf = UnionFind::new(0x10000);
        for pos in meta.all_pos() {
            if seamless_pos.contains(&pos) {
                continue;
            }
            let scr = game.metascreen(meta.get(pos));
            let below = pos + 16;
            let right = pos + 1;
            if !seamless_pos.contains(&below) && scr.edge(2) != ' ' {
                uf.union(&[pos as u32, below as u32]);
            }
            if !seamless_pos.contains(&right) && scr.edge(3) != ' ' {
                uf.union(&[pos as u32, right as u32]);
            }
            uf.union(&[pos as u32]);
        }
        let mut reachable: HashSet<Pos> = HashSet::new();
        for set in uf.sets() {
            if set
                .iter()
                .any(|&p| meta.exits_vec().iter().any(|&(ep, _, _)| ep == p as Pos))
            {
                reachable.extend(set.iter().map(|&p| p as Pos));
            }
        }

        let mut free_flags: Vec<FlagId> = meta.free_flags.iter().copied().collect();
        let mut records: Vec<FlagRecord> = Vec::new();
        for screen in meta.all_pos() {
            let scr = game.metascreen(meta.get(screen));
            let flag: Option<FlagId> = if scr.data.wall.is_some() && reachable.contains(&screen) {
                Some(match free_flags.pop() {
                    Some(f) => f,
                    None => self.flags.alloc(0x200)?,
                })
            } else if scr.data.flag == Some(ScreenFlag::Always) {
                Some(self.flags.always_true)
            } else if scr.data.flag == Some(ScreenFlag::Calm) {
                Some(self.flags.calm)
            } else if scr.data.flag == Some(ScreenFlag::CustomFalse) {
                meta.custom_flags.get(&screen).copied()
            } else if scr.data.flag == Some(ScreenFlag::CustomTrue) {
                Some(
                    meta.custom_flags
                        .get(&screen)
                        .copied()
                        .unwrap_or(self.flags.always_true),
                )
            } else {
                None
            };
            if let Some(flag) = flag {
                records.push(FlagRecord { screen, flag });
            }
        }

        let loc = self.location_mut(id)?;
        loc.flags = records;
        loc.pits = meta
            .pits_vec()
            .into_iter()
            .map(|(from_screen, to)| PitRecord {
                from_screen,
                to_screen: to & 0xff,
                dest: (to >> 8) as LocationId,
            })
            .collect();
        Ok(())
    }

    /// Rewrites entrance index 0 from the connection type recorded at
    /// construction, if any.
    pub fn write_entrance0(&mut self, id: LocationId, game: &GameData) -> Result<()> {
        let meta = self.meta(id)?;
        let Some(entrance0) = meta.entrance0 else {
            return Ok(());
        };
        let mut found: Option<Entrance> = None;
        for (pos, ctype, _) in meta.exits_vec() {
            if ctype != entrance0 {
                continue;
            }
            let exit = game
                .metascreen(meta.get(pos))
                .find_exit_by_type(ctype)
                .with_context(|| format!("Missing exit def for {ctype} @ {pos:02x}"))?;
            found = Some(Entrance::new(pos, (exit.entrance & 0xffff) as u16));
            break;
        }
        if let Some(entrance) = found {
            let loc = self.location_mut(id)?;
            if loc.entrances.is_empty() {
                loc.entrances.push(entrance);
            } else {
                loc.entrances[0] = entrance;
            }
        }
        Ok(())
    }
}
