//! Shared, immutable screen descriptors.
//!
//! A `Metascreen` describes one interchangeable screen tile: its symbolic
//! exits, edge profile, features, and the pre-classified connectivity
//! segments used by the structural traversal.  Metascreens are owned by
//! `GameData` and referenced everywhere by `MetascreenId`; several
//! metascreens may share one raw screen id (variants distinguished by flags
//! or by a match predicate).

use strum_macros::{Display, EnumString};

use crate::MetascreenId;
use crate::ScreenId;

/// Symbolic connection type of an exit or entrance.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString,
)]
pub enum ConnectionType {
    #[strum(serialize = "cave")]
    Cave,
    #[strum(serialize = "crypt")]
    Crypt,
    #[strum(serialize = "door")]
    Door,
    #[strum(serialize = "door2")]
    Door2,
    #[strum(serialize = "door3")]
    Door3,
    #[strum(serialize = "fortress")]
    Fortress,
    #[strum(serialize = "gate")]
    Gate,
    #[strum(serialize = "swamp")]
    Swamp,
    #[strum(serialize = "teleporter")]
    Teleporter,
    #[strum(serialize = "windmill")]
    Windmill,
    #[strum(serialize = "stair:up")]
    StairUp,
    #[strum(serialize = "stair:down")]
    StairDown,
    #[strum(serialize = "edge:top")]
    EdgeTop,
    #[strum(serialize = "edge:left")]
    EdgeLeft,
    #[strum(serialize = "edge:bottom")]
    EdgeBottom,
    #[strum(serialize = "edge:right")]
    EdgeRight,
    #[strum(serialize = "seamless:up")]
    SeamlessUp,
    #[strum(serialize = "seamless:down")]
    SeamlessDown,
}

impl ConnectionType {
    pub fn is_seamless(self) -> bool {
        matches!(self, ConnectionType::SeamlessUp | ConnectionType::SeamlessDown)
    }

    /// Edge direction for edge exits: 0=top, 1=left, 2=bottom, 3=right.
    pub fn edge_dir(self) -> Option<usize> {
        match self {
            ConnectionType::EdgeTop => Some(0),
            ConnectionType::EdgeLeft => Some(1),
            ConnectionType::EdgeBottom => Some(2),
            ConnectionType::EdgeRight => Some(3),
            _ => None,
        }
    }
}

/// One symbolic exit definition on a screen.
#[derive(Clone, Debug)]
pub struct Connection {
    pub ctype: ConnectionType,
    /// 0=up, 1=left, 2=down, 3=right.
    pub dir: u8,
    /// Entrance pixel coordinate within the screen (`YyXx`).  Bit 16 marks
    /// an entrance that actually sits on the screen below (a doorway
    /// straddling two screens).
    pub entrance: u32,
    /// Exit tile coordinates (`yt << 4 | xt`).  A tile in row `0xf` belongs
    /// to row 0 of the screen below.
    pub exits: Vec<u8>,
    /// Extra tiles accepted when matching a raw exit record.
    pub allowed_exits: Vec<u8>,
    pub manual: bool,
}

impl Connection {
    pub fn new(ctype: ConnectionType, dir: u8, entrance: u32, exits: Vec<u8>) -> Self {
        Connection {
            ctype,
            dir,
            entrance,
            exits,
            allowed_exits: Vec::new(),
            manual: false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Feature {
    #[strum(serialize = "arena")]
    Arena,
    #[strum(serialize = "bridge")]
    Bridge,
    #[strum(serialize = "empty")]
    Empty,
    #[strum(serialize = "pit")]
    Pit,
    #[strum(serialize = "river")]
    River,
    #[strum(serialize = "spikes")]
    Spikes,
    #[strum(serialize = "wall")]
    Wall,
    #[strum(serialize = "stair:up")]
    StairUp,
    #[strum(serialize = "stair:down")]
    StairDown,
}

impl Feature {
    pub fn mask(self) -> u32 {
        1 << (self as u32)
    }
}

/// What kind of flag a screen expects in the location's flag table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScreenFlag {
    /// Screen requires the always-true flag.
    Always,
    /// Screen requires the calmed-sea flag.
    Calm,
    /// Screen takes a location-specific flag, absent by default.
    CustomFalse,
    /// Screen takes a location-specific flag, falling back to always-true.
    CustomTrue,
}

/// Disambiguation predicate: given a local reachability probe
/// `reach(dy, dx)` (pixel offsets from the screen's top-left corner) and
/// whether the position carries a flag, decide whether this variant matches.
pub type MatchFn = fn(&dyn Fn(i32, i32) -> bool, bool) -> bool;

#[derive(Clone, Default)]
pub struct MetascreenData {
    pub name: &'static str,
    pub sid: ScreenId,
    pub exits: Vec<Connection>,
    /// Four edge-channel chars (top, left, bottom, right); `' '` = blank.
    pub edges: Option<String>,
    /// Compact per-mode connectivity spec; see `parse_connections`.
    pub connect: Option<String>,
    pub feature: Vec<Feature>,
    pub flag: Option<ScreenFlag>,
    /// Tile (`yt << 4 | xt`) of the wall/bridge obstacle, if any.
    pub wall: Option<u8>,
    /// Rows carrying statue spawn slots.
    pub statues: Vec<u8>,
    /// Points of interest: (priority 0..=5, dy, dx) pixel offsets.
    pub poi: Vec<(u8, u16, u16)>,
    pub match_fn: Option<MatchFn>,
    /// Placeholder screens that never take over exits or pits.
    pub delete: bool,
    /// Three-row ASCII icon for `show()`.
    pub icon: Option<[&'static str; 3]>,
}

pub struct Metascreen {
    pub mid: MetascreenId,
    pub data: MetascreenData,
    features: u32,
    /// Per traversal-mode connection segments.  Mode bitmask: bit 1 (2) =
    /// flight, bit 0 (1) = flags not asserted.  Each segment is a list of
    /// connection-point deltas to add to `pos << 8`.
    pub connections: [Vec<Vec<u16>>; 4],
}

// Segment separators per traversal mode.  '|' always splits; ':' is crossed
// only by flight; '=' is crossed once the screen's flag is asserted (broken
// wall / formed bridge); '-' is crossed by either.
const CONNECTION_BLOCKS: [&str; 4] = ["|:", "|:=-", "|", "|="];

fn is_block_char(c: char) -> bool {
    matches!(c, '|' | ':' | '=' | '-')
}

fn parse_connections(data: &MetascreenData) -> [Vec<Vec<u16>>; 4] {
    let mut cxn: [Vec<Vec<u16>>; 4] = Default::default();
    for (i, modes) in cxn.iter_mut().enumerate() {
        modes.push(Vec::new());
        let mut poi_index = 0u16;
        let mut exit_index = 0u16;
        for term in data.connect.as_deref().unwrap_or("").chars() {
            if CONNECTION_BLOCKS[i].contains(term) {
                modes.push(Vec::new());
                continue;
            }
            if is_block_char(term) {
                continue;
            }
            let delta = if term == 'p' {
                let d = 0xf0 | poi_index;
                poi_index += 1;
                d
            } else if term == 'x' {
                let d = 0xe0 | exit_index;
                exit_index += 1;
                d
            } else {
                let num = term.to_digit(16).expect("bad connect term") as u16;
                if num == 0 {
                    continue;
                }
                let channel = (num & 3) << (num & 4);
                let offset = if num & 8 != 0 {
                    if num & 4 != 0 {
                        0x0100
                    } else {
                        0x1000
                    }
                } else {
                    0
                };
                channel | offset
            };
            modes.last_mut().unwrap().push(delta);
        }
        // Any exits/POI not referenced by the connect string attach to the
        // final segment.
        let last = modes.last_mut().unwrap();
        while (poi_index as usize) < data.poi.len() {
            last.push(0xf0 | poi_index);
            poi_index += 1;
        }
        while (exit_index as usize) < data.exits.len() {
            last.push(0xe0 | exit_index);
            exit_index += 1;
        }
    }
    cxn
}

impl Metascreen {
    pub fn new(mid: MetascreenId, data: MetascreenData) -> Self {
        let mut features = 0u32;
        for &f in &data.feature {
            features |= f.mask();
        }
        for exit in &data.exits {
            if exit.ctype == ConnectionType::StairDown {
                features |= Feature::StairDown.mask();
            } else if exit.ctype == ConnectionType::StairUp {
                features |= Feature::StairUp.mask();
            }
        }
        let connections = parse_connections(&data);
        Metascreen {
            mid,
            data,
            features,
            connections,
        }
    }

    pub fn name(&self) -> &str {
        self.data.name
    }

    pub fn sid(&self) -> ScreenId {
        self.data.sid
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features & feature.mask() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.has_feature(Feature::Empty)
    }

    pub fn edge(&self, dir: usize) -> char {
        self.data
            .edges
            .as_deref()
            .and_then(|e| e.chars().nth(dir))
            .unwrap_or(' ')
    }

    /// If every non-blank edge carries `edge_type`, returns the bitmask of
    /// those edges (bit 0 = top .. bit 3 = right); otherwise `None`.
    pub fn edge_index(&self, edge_type: char) -> Option<u8> {
        let mut index = 0u8;
        for i in 0..4 {
            let c = self.edge(i);
            if c == ' ' {
                continue;
            }
            if c != edge_type {
                return None;
            }
            index |= 1 << i;
        }
        Some(index)
    }

    /// Whether `that` may sit next to `self`: `dir` 0 means `that` is above,
    /// 1 means `that` is to the left.
    pub fn check_neighbor(&self, that: &Metascreen, dir: usize) -> bool {
        if self.data.edges.is_none() || that.data.edges.is_none() {
            return false;
        }
        // `that` is on the top/left side, so its bottom/right edge must
        // match our top/left edge.
        let e0 = self.edge(dir);
        let e1 = that.edge(dir ^ 2);
        e1 != '*' && e0 == e1
    }

    /// Finds the symbolic exit type owning a raw exit tile.
    pub fn find_exit_type(&self, tile: u8, single_height: bool) -> Option<&Connection> {
        for exit in &self.data.exits {
            let t0 = if single_height && exit.ctype == ConnectionType::EdgeBottom && tile >= 0xc0 {
                tile as u16 + 0x20
            } else {
                tile as u16
            };
            let matches =
                |e: &u8| *e as u16 == t0;
            if exit.exits.iter().any(|e| matches(e)) || exit.allowed_exits.iter().any(|e| matches(e))
            {
                return Some(exit);
            }
        }
        None
    }

    /// Finds the symbolic exit type whose entrance matches a raw entrance
    /// coordinate.  Seamless exits have no rendered entrance and never match.
    pub fn find_entrance_type(&self, coord: u32, single_height: bool) -> Option<ConnectionType> {
        for exit in &self.data.exits {
            if exit.ctype.is_seamless() {
                continue;
            }
            let c0 = if single_height
                && exit.ctype == ConnectionType::EdgeBottom
                && coord >= 0xbf00
            {
                coord + 0x2000
            } else {
                coord
            };
            if exit.entrance == c0 {
                return Some(exit.ctype);
            }
        }
        None
    }

    pub fn find_exit_by_type(&self, ctype: ConnectionType) -> Option<&Connection> {
        self.data.exits.iter().find(|e| e.ctype == ctype)
    }
}
