//! The raw location record: the byte-table-backed entity owning screens,
//! entrances, exits, flags, pits, and spawns for one game location.
//!
//! The binary codec for these tables lives elsewhere; this module models the
//! decoded records and the tile-level queries the map engine needs.

use hashbrown::{HashMap, HashSet};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::tileset::{EFFECT_IMPASSABLE, EFFECT_NO_WALK};
use crate::unionfind::UnionFind;
use crate::{EntranceIdx, FlagId, GameData, LocationId, MonsterId, Pos, ScreenId, TileId, TilesetId};

/// A rendered entrance coordinate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrance {
    pub screen: Pos,
    /// Pixel coordinate within the screen (`YyXx`).
    pub coord: u16,
    pub used: bool,
}

impl Entrance {
    pub fn new(screen: Pos, coord: u16) -> Self {
        Entrance {
            screen,
            coord,
            used: true,
        }
    }

    /// Full 11-bit pixel x.
    pub fn x(&self) -> i32 {
        (self.screen & 0xf) << 8 | (self.coord & 0xff) as i32
    }

    /// Full 12-bit pixel y.
    pub fn y(&self) -> i32 {
        (self.screen >> 4) << 8 | (self.coord >> 8) as i32
    }

    /// Tile within the screen (`yt << 4 | xt`).
    pub fn tile(&self) -> u8 {
        ((self.coord >> 8) as u8 & 0xf0) | ((self.coord >> 4) as u8 & 0x0f)
    }
}

/// A raw exit tile: one tile-sized warp to a destination entrance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub screen: Pos,
    /// Tile within the screen (`yt << 4 | xt`).
    pub tile: u8,
    pub dest: LocationId,
    /// Destination entrance index; bit 0x20 marks a seamless transition.
    pub entrance: u8,
}

impl ExitRecord {
    pub fn is_seamless(&self) -> bool {
        self.entrance & 0x20 != 0
    }

    /// Full y tile coordinate.
    pub fn yt(&self) -> i32 {
        (self.screen & 0xf0) | (self.tile >> 4) as i32
    }
}

/// Mapping from a screen position to the flag gating it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub screen: Pos,
    pub flag: FlagId,
}

/// A one-way vertical transition: no reverse edge, no entrance coordinate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitRecord {
    pub from_screen: Pos,
    pub to_screen: Pos,
    pub dest: LocationId,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallKind {
    Wall,
    Bridge,
}

/// An entity spawn slot.  Coordinates are stored as full tile bytes
/// (`ys << 4 | yt`, `xs << 4 | xt`); pixel getters shift by 4.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spawn {
    pub yt: i32,
    pub xt: i32,
    /// Spawn class: 0=monster, 1=npc/boss, 2=chest/trigger, 3=wall, 4=generic.
    pub kind: u8,
    pub id: u8,
    pub timed: bool,
    pub used: bool,
}

impl Spawn {
    pub fn new(kind: u8, id: u8, yt: i32, xt: i32) -> Self {
        Spawn {
            yt,
            xt,
            kind,
            id,
            timed: false,
            used: true,
        }
    }

    pub fn y(&self) -> i32 {
        self.yt << 4
    }

    pub fn x(&self) -> i32 {
        self.xt << 4
    }

    pub fn set_y(&mut self, y: i32) {
        self.yt = y >> 4;
    }

    pub fn set_x(&mut self, x: i32) {
        self.xt = x >> 4;
    }

    pub fn screen(&self) -> Pos {
        (self.yt & 0xf0) | (self.xt >> 4)
    }

    pub fn set_screen(&mut self, pos: Pos) {
        self.yt = (pos & 0xf0) | (self.yt & 0xf);
        self.xt = (pos & 0xf) << 4 | (self.xt & 0xf);
    }

    pub fn tile(&self) -> u8 {
        ((self.yt as u8) & 0xf) << 4 | (self.xt as u8) & 0xf
    }

    pub fn set_tile(&mut self, tile: u8) {
        self.yt = (self.yt & 0xf0) | (tile >> 4) as i32;
        self.xt = (self.xt & 0xf0) | (tile & 0xf) as i32;
    }

    pub fn monster_id(&self) -> MonsterId {
        self.id
    }

    pub fn is_monster(&self) -> bool {
        self.kind == 0
    }

    pub fn is_npc(&self) -> bool {
        self.kind == 1 && self.id < 0xc0
    }

    pub fn is_boss(&self) -> bool {
        self.kind == 1 && self.id >= 0xc0
    }

    pub fn is_chest(&self) -> bool {
        self.kind == 2 && self.id < 0x80
    }

    pub fn is_trigger(&self) -> bool {
        self.kind == 2 && self.id >= 0x80
    }

    pub fn is_wall(&self) -> bool {
        self.kind == 3 && (self.id & 0xf) < 4
    }

    pub fn is_generic(&self) -> bool {
        self.kind == 4
    }

    pub fn wall_kind(&self) -> Option<WallKind> {
        if self.kind != 3 {
            return None;
        }
        match self.id & 0xf {
            2 => Some(WallKind::Bridge),
            0 | 1 | 3 => Some(WallKind::Wall),
            _ => None,
        }
    }
}

/// One location's decoded record.
#[derive(Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    /// Raw (physical) tileset id.
    pub tileset: TilesetId,
    /// Tile-effects table id.
    pub tile_effects: u8,
    pub width: i32,
    pub height: i32,
    /// Raw screen ids, `screens[y][x]`.
    pub screens: Vec<Vec<ScreenId>>,
    pub entrances: Vec<Entrance>,
    pub exits: Vec<ExitRecord>,
    pub flags: Vec<FlagRecord>,
    pub pits: Vec<PitRecord>,
    pub spawns: Vec<Spawn>,
    /// Water maps traverse like flight and take no land monsters.
    pub swim: bool,
    /// Screen excluded from monster placement.
    pub boss_screen: Option<ScreenId>,
}

impl Location {
    pub fn new(id: LocationId, name: &str, tileset: TilesetId, tile_effects: u8, height: i32, width: i32) -> Self {
        Location {
            id,
            name: name.to_string(),
            tileset,
            tile_effects,
            width,
            height,
            screens: vec![vec![0; width as usize]; height as usize],
            entrances: Vec::new(),
            exits: Vec::new(),
            flags: Vec::new(),
            pits: Vec::new(),
            spawns: Vec::new(),
            swim: false,
            boss_screen: None,
        }
    }

    pub fn screen_at(&self, pos: Pos) -> ScreenId {
        self.screens[(pos >> 4) as usize][(pos & 0xf) as usize]
    }

    /// Returns the index of an entrance at (screen, coord), adding one if
    /// none exists yet.
    pub fn find_or_add_entrance(&mut self, screen: Pos, coord: u16) -> EntranceIdx {
        for (i, entrance) in self.entrances.iter().enumerate() {
            if entrance.screen == screen && entrance.coord == coord {
                return i;
            }
        }
        self.entrances.push(Entrance::new(screen, coord));
        self.entrances.len() - 1
    }

    /// Map of tiles (`pos << 8 | tile`) reachable from any used entrance, to
    /// the movement effects of each tile.
    ///
    /// Takes the tileset and per-screen flags into account: a flagged
    /// screen's blocked tiles are re-tested against the tileset's alternate
    /// metatile.  Exit tiles are never crossed.
    pub fn reachable_tiles(&self, game: &GameData, fly: bool) -> HashMap<TileId, u8> {
        let fly = fly || self.swim;
        let exits: HashSet<TileId> = self
            .exits
            .iter()
            .map(|e| e.screen << 8 | e.tile as i32)
            .collect();
        let tileset = &game.tilesets[&self.tileset];
        let effects = &game.tile_effects[&self.tile_effects].effects;
        let block_mask = if fly {
            EFFECT_IMPASSABLE
        } else {
            EFFECT_IMPASSABLE | EFFECT_NO_WALK
        };

        let mut passable: HashSet<TileId> = HashSet::new();
        let mut scan: Vec<TileId> = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let screen = &game.screens[&self.screens[y as usize][x as usize]];
                let pos = y << 4 | x;
                let flagged = self.flags.iter().any(|f| f.screen == pos);
                for t in 0..0xf0 {
                    let tile_id = pos << 8 | t;
                    if exits.contains(&tile_id) {
                        continue; // don't go past exits
                    }
                    let mut tile = screen.tiles[t as usize];
                    let mut blocked = effects[tile as usize] & block_mask;
                    if flagged
                        && blocked != 0
                        && tile < 0x20
                        && tileset.alternates[tile as usize] != tile
                    {
                        tile = tileset.alternates[tile as usize];
                        blocked = effects[tile as usize] & block_mask;
                    }
                    if blocked == 0 {
                        passable.insert(tile_id);
                        scan.push(tile_id);
                    }
                }
            }
        }

        let mut uf = UnionFind::new(0x10000);
        for &t in &scan {
            uf.union(&[t as u32]);
            let right = if t & 0x0f == 0x0f { t + 0xf1 } else { t + 1 };
            if passable.contains(&right) {
                uf.union(&[t as u32, right as u32]);
            }
            let below = if t & 0xf0 == 0xe0 { t + 0xf20 } else { t + 16 };
            if passable.contains(&below) {
                uf.union(&[t as u32, below as u32]);
            }
        }

        let sets = uf.sets();
        let mut set_of: HashMap<TileId, usize> = HashMap::new();
        for (i, set) in sets.iter().enumerate() {
            for &t in set {
                set_of.insert(t as TileId, i);
            }
        }
        let mut picked: HashSet<usize> = HashSet::new();
        for entrance in &self.entrances {
            if !entrance.used {
                continue;
            }
            let id = entrance.screen << 8 | entrance.tile() as i32;
            if let Some(&i) = set_of.get(&id) {
                picked.insert(i);
            }
        }

        let mut out: HashMap<TileId, u8> = HashMap::new();
        for &i in &picked {
            for &t in &sets[i] {
                let t = t as TileId;
                let sid = self.screens[(t >> 12) as usize][(t >> 8) as usize & 0xf];
                let screen = &game.screens[&sid];
                out.insert(t, effects[screen.tiles[(t & 0xff) as usize] as usize]);
            }
        }
        out
    }

    /// Builds the placement pools for re-siting monsters on this map.
    pub fn monster_placer(&self, game: &GameData) -> MonsterPlacer {
        let reachable = self.reachable_tiles(game, false);
        // Breadth-first extension of the reachable set to get a 1-norm
        // "distance from walkable" for every tile.
        let mut extended: HashMap<TileId, u32> = HashMap::new();
        let mut queue: VecDeque<TileId> = VecDeque::new();
        for &t in reachable.keys() {
            extended.insert(t, 0);
            queue.push_back(t);
        }
        let normal_terrain_mask = if self.swim { 0x25 } else { 0x27 };
        let mut normal = Vec::new();
        let mut moths = Vec::new();
        let mut birds = Vec::new();
        let mut plants = Vec::new();
        while let Some(t) = queue.pop_front() {
            let distance = extended[&t];
            let sid = self.screens[(t >> 12) as usize][(t >> 8) as usize & 0xf];
            if Some(sid) == self.boss_screen {
                continue;
            }
            for n in neighbors(t, self.width, self.height) {
                if let hashbrown::hash_map::Entry::Vacant(e) = extended.entry(n) {
                    e.insert(distance + 1);
                    queue.push_back(n);
                }
            }
            if distance == 0 && reachable[&t] & normal_terrain_mask == 0 {
                normal.push(t);
            }
            if (2..=4).contains(&distance) {
                plants.push(t);
            }
            if (3..=7).contains(&distance) {
                moths.push(t);
            }
            if distance >= 12 {
                birds.push(t);
            }
        }
        let entrances = self
            .entrances
            .iter()
            .filter(|e| e.used)
            .map(|e| (e.x() >> 4, e.y() >> 4))
            .collect();
        MonsterPlacer {
            normal,
            moths,
            birds,
            plants,
            placed: Vec::new(),
            entrances,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    Normal,
    Moth,
    Bird,
    Plant,
}

/// Placement profile for one monster type.
#[derive(Copy, Clone, Debug)]
pub struct MonsterInfo {
    pub placement: Placement,
    /// Minimum spacing radius, in tiles, against other placed monsters.
    pub clearance: i32,
}

/// Re-sites monsters one at a time, enforcing clearance against previously
/// placed monsters and against entrances.
pub struct MonsterPlacer {
    normal: Vec<TileId>,
    moths: Vec<TileId>,
    birds: Vec<TileId>,
    plants: Vec<TileId>,
    placed: Vec<(i32, i32, i32)>,
    entrances: Vec<(i32, i32)>,
}

impl MonsterPlacer {
    pub fn place(&mut self, monster: &MonsterInfo, rng: &mut StdRng) -> Option<TileId> {
        let mut pool = match monster.placement {
            Placement::Normal => self.normal.clone(),
            Placement::Moth => self.moths.clone(),
            Placement::Bird => self.birds.clone(),
            Placement::Plant => self.plants.clone(),
        };
        let r = monster.clearance;
        'pool: while !pool.is_empty() {
            let i = rng.gen_range(0..pool.len());
            let pos = pool.swap_remove(i);
            let x = (pos & 0xf00) >> 4 | pos & 0xf;
            let y = (pos & 0xf000) >> 8 | (pos & 0xf0) >> 4;
            for &(x1, y1, r1) in &self.placed {
                let z2 = (y - y1).pow(2) + (x - x1).pow(2);
                if z2 < (r + r1).pow(2) {
                    continue 'pool;
                }
            }
            for &(x1, y1) in &self.entrances {
                let z2 = (y - y1).pow(2) + (x - x1).pow(2);
                if z2 < (r + 1).pow(2) {
                    continue 'pool;
                }
            }
            self.placed.push((x, y, r));
            let scr = (y & 0xf0) | (x & 0xf0) >> 4;
            let tile = (y & 0x0f) << 4 | (x & 0x0f);
            return Some(scr << 8 | tile);
        }
        None
    }
}

/// Four-neighborhood of a tile, crossing 240px screen rows.
fn neighbors(tile: TileId, width: i32, height: i32) -> Vec<TileId> {
    let mut out = Vec::with_capacity(4);
    let y = tile & 0xf0f0;
    let x = tile & 0x0f0f;
    if y < (height - 1) << 12 | 0xe0 {
        out.push(if tile & 0xf0 == 0xe0 { tile + 0x0f20 } else { tile + 16 });
    }
    if y > 0 {
        out.push(if tile & 0xf0 == 0x00 { tile - 0x0f20 } else { tile - 16 });
    }
    if x < (width - 1) << 8 | 0x0f {
        out.push(if tile & 0x0f == 0x0f { tile + 0x00f1 } else { tile + 1 });
    }
    if x > 0 {
        out.push(if tile & 0x0f == 0x00 { tile - 0x00f1 } else { tile - 1 });
    }
    out
}
