//! Model of one location as a grid of metascreens, with its exit graph,
//! pit map, and flag bookkeeping.
//!
//! A `Metalocation` is built from a raw location record once, mutated in
//! place during randomization, and projected back with `MetaWorld::write`.
//! Each exit is co-owned by two metalocations, so every operation touching
//! both ends lives on `MetaWorld`; everything here is local to one location.

use anyhow::{bail, Context, Result};
use hashbrown::HashSet;
use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet};

use metamap_game::flags::FlagTable;
use metamap_game::location::Location;
use metamap_game::metascreen::{ConnectionType, ScreenFlag};
use metamap_game::{FlagId, GameData, LocPos, LocationId, MetascreenId, MetatilesetId, Pos, ScreenId};

/// Destination half of one exit-table entry.
pub type ExitSpec = (LocPos, ConnectionType);

#[derive(Clone)]
pub struct Metalocation {
    pub id: LocationId,
    pub tileset: MetatilesetId,
    height: i32,
    width: i32,
    /// Indexed by `pos` (`y << 4 | x`); length `height << 4`.
    screens: Vec<MetascreenId>,
    pub(crate) exits: BTreeMap<(Pos, ConnectionType), ExitSpec>,
    /// `pos` of the pit screen to `loc << 8 | pos` landing.
    pub(crate) pits: BTreeMap<Pos, LocPos>,
    pub custom_flags: BTreeMap<Pos, FlagId>,
    pub free_flags: BTreeSet<FlagId>,
    /// Connection type owning entrance index 0, when one was detected.
    pub(crate) entrance0: Option<ConnectionType>,
}

impl Metalocation {
    pub fn new(id: LocationId, tileset: MetatilesetId, height: i32, width: i32, game: &GameData) -> Self {
        let empty = game.metatileset(tileset).empty;
        Metalocation {
            id,
            tileset,
            height,
            width,
            screens: vec![empty; (height as usize) << 4],
            exits: BTreeMap::new(),
            pits: BTreeMap::new(),
            custom_flags: BTreeMap::new(),
            free_flags: BTreeSet::new(),
            entrance0: None,
        }
    }

    /// Parses a metalocation out of the given raw record.  Infers the
    /// tileset by elimination unless one is supplied.
    ///
    /// `locations` must contain every destination the record's exits refer
    /// to; only *this* record's screens are interpreted.
    pub fn of(
        locations: &BTreeMap<LocationId, Location>,
        id: LocationId,
        game: &GameData,
        flags: &FlagTable,
        tileset: Option<MetatilesetId>,
    ) -> Result<Metalocation> {
        let location = locations
            .get(&id)
            .with_context(|| format!("No location record {id:02x}"))?;
        let (width, height) = (location.width, location.height);
        let tileset = match tileset {
            Some(ts) => ts,
            None => infer_tileset(location, game)?,
        };

        // Tiles reachable from any entrance, assuming flight.  Used to pick
        // between redundant screen variants (e.g. double dead ends).
        let mut reachable = location.reachable_tiles(game, true);
        let mut reachable_screens: HashSet<Pos> = reachable.keys().map(|&t| t >> 8).collect();
        // Some entrances sit on impassable tiles (boat and shop fronts) but
        // their screens still matter.
        for entrance in &location.entrances {
            if entrance.used {
                reachable_screens.insert(entrance.screen);
            }
        }
        for exit in &location.exits {
            reachable_screens.insert(exit.screen);
            if exit.is_seamless() {
                // A seamless exit on a screen edge marks the neighbor
                // screen's center tile reachable so the variant match can
                // see across the seam.
                let y = exit.tile >> 4;
                if y == 0 {
                    reachable.insert((exit.screen - 16) << 8 | 0x88, 1);
                } else if y == 0xe {
                    reachable.insert(exit.screen << 8 | 0x88, 1);
                }
            }
        }

        let empty = game.metatileset(tileset).empty;
        let mut screens = vec![empty; (height as usize) << 4];
        for y in 0..height {
            for x in 0..width {
                let t0 = y << 4 | x;
                let sid = location.screens[y as usize][x as usize];
                let candidates = game.get_metascreens(tileset, sid);
                let picked = match candidates.len() {
                    0 => bail!(
                        "No metascreen for {sid:02x} in {} @ {t0:02x}",
                        location.name
                    ),
                    1 => candidates[0],
                    _ => pick_screen_variant(
                        game, flags, location, candidates, t0, y, x, &reachable,
                    )?,
                };
                screens[t0 as usize] = picked;
            }
        }

        // Figure out exits.
        let mut exits: BTreeMap<(Pos, ConnectionType), ExitSpec> = BTreeMap::new();
        let mut entrance0 = None;
        for exit in &location.exits {
            if exit.dest == 0xff {
                continue;
            }
            let mut src_pos = exit.screen;
            let mut tile = exit.tile;
            // A seamless exit recorded on a screen's top row may belong to
            // the screen above (stored one row down in the record, possibly
            // past the bottom of the grid).  Try the declared screen first;
            // fall back to the row above.
            if exit.is_seamless() && exit.yt() & 0xf == 0 && src_pos >= 0x10 {
                let declared = screens.get(src_pos as usize).map(|&mid| game.metascreen(mid));
                if declared.map_or(true, |scr| scr.find_exit_type(tile, height == 1).is_none()) {
                    src_pos -= 16;
                    tile |= 0xf0;
                }
            }
            if !reachable_screens.contains(&src_pos) {
                bail!(
                    "Exit screen {src_pos:02x} unreachable in {}",
                    location.name
                );
            }
            let src_screen = screens[src_pos as usize];
            let Some(src_exit) = game.metascreen(src_screen).find_exit_type(tile, height == 1)
            else {
                let wid = (id as u32) << 16 | (src_pos as u32) << 8 | exit.tile as u32;
                if game.exit_whitelist.contains(&wid) {
                    continue;
                }
                warn!(
                    "Unknown exit {:02x}: {} in {} @ {src_pos:02x}",
                    exit.tile,
                    game.metascreen(src_screen).name(),
                    location.name
                );
                continue;
            };
            let src_type = src_exit.ctype;
            if exits.contains_key(&(src_pos, src_type)) {
                continue; // already handled
            }
            let dest_loc = locations
                .get(&exit.dest)
                .with_context(|| format!("No destination location {:02x}", exit.dest))?;
            if src_type.is_seamless() {
                let down = src_type == ConnectionType::SeamlessDown;
                let t = *src_exit.exits.first().context("seamless exit with no tiles")? as i32
                    + if down { -16 } else { 16 };
                // Bottom-edge seamless is treated as landing on the same row.
                let dest_pos = src_pos + if t < 0 { -16 } else { 0 };
                let dest_type = if down {
                    ConnectionType::SeamlessUp
                } else {
                    ConnectionType::SeamlessDown
                };
                exits.insert((src_pos, src_type), ((dest_loc.id as i32) << 8 | dest_pos, dest_type));
                continue;
            }
            let entrance = dest_loc
                .entrances
                .get((exit.entrance & 0x1f) as usize)
                .with_context(|| {
                    format!(
                        "Missing entrance {:02x} in {}",
                        exit.entrance & 0x1f,
                        dest_loc.name
                    )
                })?;
            let mut dest_pos = entrance.screen;
            let mut dest_coord = entrance.coord as u32;
            if src_type == ConnectionType::Door && entrance.y() & 0xf0 == 0 {
                // Doorway straddling two screens: the exit is on the screen
                // above the rendered entrance.
                dest_pos -= 0x10;
                dest_coord += 0x10000;
            }
            let dest_sid = dest_loc.screen_at(dest_pos);
            let Some(dest_type) = find_entrance_type(game, dest_loc, dest_sid, dest_coord) else {
                warn!(
                    "Bad entrance {dest_coord:04x}: raw {dest_sid:02x} in {} @ {dest_pos:02x}",
                    dest_loc.name
                );
                continue;
            };
            exits.insert((src_pos, src_type), ((dest_loc.id as i32) << 8 | dest_pos, dest_type));

            if let Some(first) = location.entrances.first() {
                if first.screen == src_pos {
                    let coord = first.coord as i32;
                    let e = (src_exit.entrance & 0xffff) as i32;
                    let d = ((e & 0xff) - (coord & 0xff)).pow(2)
                        + ((e >> 8) - (coord >> 8)).pow(2);
                    // For single-height maps a bottom entrance may sit a
                    // couple tiles off from the exit definition.
                    if d <= 0x400 {
                        entrance0 = Some(src_type);
                    }
                }
            }
        }

        let mut pits = BTreeMap::new();
        for pit in &location.pits {
            pits.insert(pit.from_screen, (pit.dest as i32) << 8 | pit.to_screen);
        }

        let mut meta = Metalocation::new(id, tileset, height, width, game);
        meta.screens = screens;
        meta.exits = exits;
        meta.entrance0 = entrance0;
        meta.pits = pits;

        for f in &location.flags {
            let scr = game.metascreen(meta.screens[f.screen as usize]);
            match scr.data.flag {
                Some(ScreenFlag::CustomFalse) | Some(ScreenFlag::CustomTrue) => {
                    meta.custom_flags.insert(f.screen, f.flag);
                }
                None => {
                    meta.free_flags.insert(f.flag);
                }
                _ => {}
            }
        }
        Ok(meta)
    }

    pub fn get(&self, pos: Pos) -> MetascreenId {
        self.screens[pos as usize]
    }

    pub fn set(&mut self, pos: Pos, scr: Option<MetascreenId>, game: &GameData) {
        self.screens[pos as usize] = scr.unwrap_or(game.metatileset(self.tileset).empty);
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn set_height(&mut self, height: i32, game: &GameData) {
        let empty = game.metatileset(self.tileset).empty;
        self.screens.resize((height as usize) << 4, empty);
        self.height = height;
    }

    pub fn all_pos(&self) -> Vec<Pos> {
        let mut out = Vec::with_capacity((self.height * self.width) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(y << 4 | x);
            }
        }
        out
    }

    pub fn in_bounds(&self, pos: Pos) -> bool {
        metamap_game::pos::in_bounds(pos, self.height, self.width)
    }

    /// Force-overwrites a rectangle of screens anchored at `pos`.  `None`
    /// entries leave the existing screen in place.
    pub fn set2d(
        &mut self,
        pos: Pos,
        screens: &[Vec<Option<MetascreenId>>],
    ) {
        let mut row_pos = pos;
        for row in screens {
            for (dx, scr) in row.iter().enumerate() {
                if let Some(scr) = scr {
                    self.screens[(row_pos + dx as i32) as usize] = *scr;
                }
            }
            row_pos += 16;
        }
    }

    /// Checks edge compatibility of every adjacent non-empty screen pair.
    pub fn validate(&self, game: &GameData) -> Result<()> {
        for dir in 0..2 {
            for y in (1 - dir)..self.height {
                for x in dir..self.width {
                    let pos0 = y << 4 | x;
                    let pos1 = pos0 - if dir != 0 { 1 } else { 16 };
                    let scr0 = game.metascreen(self.screens[pos0 as usize]);
                    let scr1 = game.metascreen(self.screens[pos1 as usize]);
                    if scr0.is_empty() || scr1.is_empty() {
                        continue;
                    }
                    if !scr0.check_neighbor(scr1, dir as usize) {
                        bail!(
                            "bad neighbor {} ({pos1:02x}) {} {} ({pos0:02x})",
                            scr1.name(),
                            DIR_NAME[dir as usize],
                            scr0.name()
                        );
                    }
                }
            }
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////
    // Exit handling

    pub fn set_exit_one_way(&mut self, pos: Pos, ctype: ConnectionType, spec: ExitSpec) {
        self.exits.insert((pos, ctype), spec);
    }

    pub fn delete_exit(&mut self, pos: Pos, ctype: ConnectionType) {
        self.exits.remove(&(pos, ctype));
    }

    pub fn get_exit(&self, pos: Pos, ctype: ConnectionType) -> Option<ExitSpec> {
        self.exits.get(&(pos, ctype)).copied()
    }

    pub fn exits_vec(&self) -> Vec<(Pos, ConnectionType, ExitSpec)> {
        self.exits
            .iter()
            .map(|(&(pos, t), &spec)| (pos, t, spec))
            .collect()
    }

    pub fn exit_count(&self) -> usize {
        self.exits.len()
    }

    pub fn pit(&self, pos: Pos) -> Option<LocPos> {
        self.pits.get(&pos).copied()
    }

    pub fn set_pit(&mut self, pos: Pos, dest: LocPos) {
        self.pits.insert(pos, dest);
    }

    pub fn pits_vec(&self) -> Vec<(Pos, LocPos)> {
        self.pits.iter().map(|(&p, &d)| (p, d)).collect()
    }

    /// Metascreens in this tileset carrying an exit of the given type.
    pub fn exit_candidates(&self, game: &GameData, ctype: ConnectionType) -> Vec<MetascreenId> {
        let mut out = Vec::new();
        for &mid in &game.metatileset(self.tileset).screens {
            if game.metascreen(mid).data.exits.iter().any(|e| e.ctype == ctype) {
                out.push(mid);
            }
        }
        out
    }

    /// The single exit type present at `pos`, from the exit table if
    /// populated, otherwise from the screen's exit definitions.
    pub fn pick_type_from_exits(&self, pos: Pos, game: &GameData) -> Result<ConnectionType> {
        let types: Vec<ConnectionType> = self
            .exits
            .keys()
            .filter(|&&(p, _)| p == pos)
            .map(|&(_, t)| t)
            .collect();
        if types.is_empty() {
            return self.pick_type_from_screens(pos, game);
        }
        if types.len() > 1 {
            bail!("No single exit type for {pos:02x}: {types:?}");
        }
        Ok(types[0])
    }

    pub fn pick_type_from_screens(&self, pos: Pos, game: &GameData) -> Result<ConnectionType> {
        let scr = game.metascreen(self.screens[pos as usize]);
        let types: Vec<ConnectionType> = scr.data.exits.iter().map(|e| e.ctype).collect();
        if types.len() != 1 {
            bail!("No single screen exit type for {pos:02x}: {types:?}");
        }
        Ok(types[0])
    }

    ////////////////////////////////////////////////////////////////
    // Transfers local to one location

    /// Copies pit destinations from the original layout.  No safety check
    /// here: pit landings are validated by `shuffle_pits` afterwards.
    pub fn transfer_pits(&mut self, orig: &Metalocation) {
        self.pits = orig.pits.clone();
    }

    /// Carries flag bookkeeping over from the original layout: free flags
    /// copy directly; custom flags pool up per metascreen, shuffle, and land
    /// on the new layout's custom-flag screens.
    pub fn transfer_flags(
        &mut self,
        orig: &Metalocation,
        rng: &mut StdRng,
        game: &GameData,
    ) -> Result<()> {
        self.free_flags = orig.free_flags.clone();
        let mut customs: BTreeMap<MetascreenId, Vec<FlagId>> = BTreeMap::new();
        for (&pos, &flag) in &orig.custom_flags {
            customs.entry(orig.screens[pos as usize]).or_default().push(flag);
        }
        // The flags may differ per screen kind, so shuffle within each pool.
        for flags in customs.values_mut() {
            flags.shuffle(rng);
        }
        for pos in self.all_pos() {
            let mid = self.screens[pos as usize];
            let scr = game.metascreen(mid);
            if matches!(
                scr.data.flag,
                Some(ScreenFlag::CustomFalse) | Some(ScreenFlag::CustomTrue)
            ) {
                let flag = customs
                    .get_mut(&mid)
                    .and_then(|f| f.pop())
                    .with_context(|| {
                        format!("No flag for {} in {:02x} @ {pos:02x}", scr.name(), self.id)
                    })?;
                self.custom_flags.insert(pos, flag);
            }
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////
    // Debug dumps

    /// Three-row-per-screen ASCII rendering of the grid.
    pub fn show(&self, game: &GameData) -> String {
        let mut lines = Vec::new();
        let mut header = String::from("   ");
        for x in 0..self.width {
            header.push_str(&format!("{x:x}  "));
        }
        lines.push(header.trim_end().to_string());
        for y in 0..self.height {
            for r in 0..3 {
                let mut line = String::new();
                line.push(if r == 1 {
                    char::from_digit(y as u32, 16).unwrap_or('?')
                } else {
                    ' '
                });
                line.push(' ');
                for x in 0..self.width {
                    let scr = game.metascreen(self.screens[(y << 4 | x) as usize]);
                    match &scr.data.icon {
                        Some(icon) => line.push_str(icon[r]),
                        None => line.push_str(if r == 1 { " ? " } else { "   " }),
                    }
                }
                lines.push(line);
            }
        }
        lines.join("\n")
    }

    pub fn screen_names(&self, game: &GameData) -> String {
        let mut lines = Vec::new();
        for y in 0..self.height {
            let mut line = Vec::new();
            for x in 0..self.width {
                line.push(game.metascreen(self.screens[(y << 4 | x) as usize]).name());
            }
            lines.push(line.join(" "));
        }
        lines.join("\n")
    }

    /// Grid splice for `MetaWorld::splice_columns`: replaces `deleted`
    /// columns at `left` with `inserted` new ones.
    pub(crate) fn splice_columns_grid(
        &mut self,
        left: i32,
        deleted: i32,
        inserted: i32,
        screens: &[Vec<MetascreenId>],
        game: &GameData,
    ) {
        let empty = game.metatileset(self.tileset).empty;
        let delta = inserted - deleted;
        let old_width = self.width;
        let mut out = vec![empty; self.screens.len()];
        for y in 0..self.height {
            let row = (y as usize) << 4;
            for x in 0..left {
                out[row + x as usize] = self.screens[row + x as usize];
            }
            for i in 0..inserted {
                out[row + (left + i) as usize] = screens[y as usize][i as usize];
            }
            for x in (left + deleted)..old_width {
                out[row + (x + delta) as usize] = self.screens[row + x as usize];
            }
        }
        self.screens = out;
        self.width = old_width + delta;
    }
}

const DIR_NAME: [&str; 2] = ["above", "left of"];

fn infer_tileset(location: &Location, game: &GameData) -> Result<MetatilesetId> {
    // Start from every metatileset compatible with the raw tileset id, then
    // eliminate any that can't represent some used screen id.
    let mut tilesets: Vec<MetatilesetId> = game
        .metatilesets
        .iter()
        .filter(|t| t.tileset_id == location.tileset)
        .map(|t| t.id)
        .collect();
    let mut used: BTreeSet<ScreenId> = BTreeSet::new();
    for row in &location.screens {
        used.extend(row.iter().copied());
    }
    for &sid in &used {
        tilesets.retain(|&ts| !game.get_metascreens(ts, sid).is_empty());
        if tilesets.is_empty() {
            bail!("No tileset for {sid:02x} in {}", location.name);
        }
    }
    if tilesets.len() != 1 {
        let names: Vec<&str> = tilesets
            .iter()
            .map(|&t| game.metatileset(t).name)
            .collect();
        bail!(
            "Non-unique tileset for {}: [{}]; pass one explicitly",
            location.name,
            names.join(", ")
        );
    }
    Ok(tilesets[0])
}

#[allow(clippy::too_many_arguments)]
fn pick_screen_variant(
    game: &GameData,
    flags: &FlagTable,
    location: &Location,
    candidates: &[MetascreenId],
    t0: Pos,
    y: i32,
    x: i32,
    reachable: &hashbrown::HashMap<i32, u8>,
) -> Result<MetascreenId> {
    let flag = location.flags.iter().find(|f| f.screen == t0);
    let mut matchers: Vec<MetascreenId> = Vec::new();
    let mut best: Vec<MetascreenId> = Vec::new();
    for &mid in candidates {
        let s = game.metascreen(mid);
        if s.data.match_fn.is_some() {
            matchers.push(mid);
        } else if s.data.flag == Some(ScreenFlag::Always)
            && flag.map(|f| f.flag) == Some(flags.always_true)
            || s.data.flag.is_none() && s.data.wall.is_none() && flag.is_none()
        {
            best.insert(0, mid); // front-load matching flags
        } else {
            best.push(mid);
        }
    }
    let reach = |dy: i32, dx: i32| {
        let x0 = (x << 8) + dx;
        let y0 = (y << 8) + dy;
        let t = (y0 << 4) & 0xf000 | x0 & 0xf00 | y0 & 0xf0 | (x0 >> 4) & 0xf;
        reachable.contains_key(&t)
    };
    for &mid in &matchers {
        let match_fn = game.metascreen(mid).data.match_fn.unwrap();
        if match_fn(&reach, flag.is_some()) {
            return Ok(mid);
        }
    }
    best.first().copied().with_context(|| {
        format!(
            "No matching variant for {:02x} in {} @ {t0:02x}",
            game.metascreen(candidates[0]).sid(),
            location.name
        )
    })
}

fn find_entrance_type(
    game: &GameData,
    dest: &Location,
    sid: ScreenId,
    coord: u32,
) -> Option<ConnectionType> {
    for mts in &game.metatilesets {
        if mts.tileset_id != dest.tileset {
            continue;
        }
        for &mid in game.get_metascreens(mts.id, sid) {
            if let Some(t) = game.metascreen(mid).find_entrance_type(coord, dest.height == 1) {
                return Some(t);
            }
        }
    }
    None
}
