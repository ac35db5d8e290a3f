pub mod flags;
pub mod location;
pub mod metascreen;
pub mod pos;
pub mod tileset;
pub mod unionfind;

use hashbrown::{HashMap, HashSet};

use crate::location::MonsterInfo;
use crate::metascreen::{Metascreen, MetascreenData};
use crate::tileset::{Metatileset, Screen, TileEffects, Tileset};

pub type Pos = i32; // Packed grid position: row << 4 | col
pub type LocPos = i32; // location id << 8 | pos
pub type TileId = i32; // pos << 8 | (yt << 4 | xt) within the screen
pub type ScreenId = u8; // Raw screen id in the location record
pub type MetascreenId = usize; // Index into GameData.metascreens
pub type TilesetId = u8; // Raw (physical) tileset id
pub type MetatilesetId = usize; // Index into GameData.metatilesets
pub type LocationId = usize; // Location index (0..0x100)
pub type FlagId = usize; // Game flag id
pub type EntranceIdx = usize; // Index into a location's entrance table
pub type MonsterId = u8; // Monster object id

/// The screen catalog and physical tile data: everything immutable the map
/// engine consults.  Built once at init and passed around by reference.
pub struct GameData {
    pub metascreens: Vec<Metascreen>,
    pub metatilesets: Vec<Metatileset>,
    pub screens: HashMap<ScreenId, Screen>,
    pub tilesets: HashMap<TilesetId, Tileset>,
    pub tile_effects: HashMap<u8, TileEffects>,
    pub monsters: HashMap<MonsterId, MonsterInfo>,
    /// Platform-rider monster ids: [vertical, horizontal, crumbling
    /// vertical, crumbling horizontal].
    pub platform_monsters: [MonsterId; 4],
    pub statue_monster: Option<MonsterId>,
    /// Known-benign unresolvable raw exits (`loc << 16 | pos << 8 | tile`),
    /// skipped without a report during construction.
    pub exit_whitelist: HashSet<u32>,
    screens_by_sid: HashMap<(MetatilesetId, ScreenId), Vec<MetascreenId>>,
}

impl GameData {
    pub fn new() -> Self {
        GameData {
            metascreens: Vec::new(),
            metatilesets: Vec::new(),
            screens: HashMap::new(),
            tilesets: HashMap::new(),
            tile_effects: HashMap::new(),
            monsters: HashMap::new(),
            platform_monsters: [0; 4],
            statue_monster: None,
            exit_whitelist: HashSet::new(),
            screens_by_sid: HashMap::new(),
        }
    }

    pub fn add_metatileset(
        &mut self,
        name: &'static str,
        tileset_id: TilesetId,
        effects_id: u8,
    ) -> MetatilesetId {
        let id = self.metatilesets.len();
        self.metatilesets.push(Metatileset::new(id, name, tileset_id, effects_id));
        id
    }

    /// Registers a metascreen as a member of the given metatilesets.
    pub fn add_metascreen(
        &mut self,
        data: MetascreenData,
        tilesets: &[MetatilesetId],
    ) -> MetascreenId {
        let mid = self.metascreens.len();
        let sid = data.sid;
        self.metascreens.push(Metascreen::new(mid, data));
        for &ts in tilesets {
            self.metatilesets[ts].screens.push(mid);
            self.screens_by_sid.entry((ts, sid)).or_default().push(mid);
        }
        mid
    }

    /// Marks `mid` as the empty filler screen of a metatileset.
    pub fn set_empty_screen(&mut self, tileset: MetatilesetId, mid: MetascreenId) {
        self.metatilesets[tileset].empty = mid;
    }

    pub fn metascreen(&self, mid: MetascreenId) -> &Metascreen {
        &self.metascreens[mid]
    }

    pub fn metatileset(&self, id: MetatilesetId) -> &Metatileset {
        &self.metatilesets[id]
    }

    /// Ordered candidate metascreens for a raw screen id within a tileset.
    pub fn get_metascreens(&self, tileset: MetatilesetId, sid: ScreenId) -> &[MetascreenId] {
        self.screens_by_sid
            .get(&(tileset, sid))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn set_screen_tiles(&mut self, sid: ScreenId, tiles: Vec<u8>) {
        assert_eq!(tiles.len(), 0xf0);
        self.screens.insert(sid, Screen { sid, tiles });
    }

    pub fn set_tileset(&mut self, id: TilesetId, alternates: Vec<u8>) {
        assert_eq!(alternates.len(), 0x20);
        self.tilesets.insert(id, Tileset { id, alternates });
    }

    pub fn set_tile_effects(&mut self, id: u8, effects: Vec<u8>) {
        assert_eq!(effects.len(), 0x100);
        self.tile_effects.insert(id, TileEffects { id, effects });
    }
}

impl Default for GameData {
    fn default() -> Self {
        GameData::new()
    }
}
