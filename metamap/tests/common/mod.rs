//! Shared fixture: a small cavern/field catalog with physically consistent
//! screen tiles, plus a three-location world (two caves and an overworld)
//! wired together by a cave door and a staircase.

#![allow(dead_code)]

use metamap_game::location::{Entrance, ExitRecord, FlagRecord, Location, MonsterInfo, Placement, Spawn};
use metamap_game::metascreen::{Connection, ConnectionType, Feature, MetascreenData, ScreenFlag};
use metamap_game::{GameData, MetascreenId, MetatilesetId, Pos};
use metamap::world::MetaWorld;

pub const CAVE_A: usize = 0x10;
pub const CAVE_B: usize = 0x11;
pub const CAVE_C: usize = 0x12;
pub const OVERWORLD: usize = 0x20;

pub struct Fix {
    pub game: GameData,
    pub cavern: MetatilesetId,
    pub field: MetatilesetId,
    pub empty: MetascreenId,
    pub hall_ns: MetascreenId,
    pub hall_ns_dark: MetascreenId,
    pub hall_we: MetascreenId,
    pub hall4: MetascreenId,
    pub stair_down_n: MetascreenId,
    pub stair_up_s: MetascreenId,
    pub wall_ns: MetascreenId,
    pub bridge_we: MetascreenId,
    pub river_we: MetascreenId,
    pub pit_ns: MetascreenId,
    pub spikes_ns: MetascreenId,
    pub arena_n: MetascreenId,
    pub seam_down: MetascreenId,
    pub seam_up: MetascreenId,
    pub cave_n: MetascreenId,
    pub over_cave: MetascreenId,
    pub over_field: MetascreenId,
}

/// Entrance pixel coordinate at the center of tile (yt, xt).
pub fn coord(yt: u16, xt: u16) -> u32 {
    (yt << 12 | 0x800 | xt << 4 | 0x8) as u32
}

/// 240 tiles for a screen with the given edge profile: solid borders with
/// two-tile openings on each non-blank edge, floor inside.
fn tiles(edges: &str, extra: impl Fn(&mut Vec<u8>)) -> Vec<u8> {
    let mut t = vec![0u8; 0xf0];
    for xt in 0..16 {
        t[xt] = 1;
        t[0xe0 + xt] = 1;
    }
    for yt in 0..15 {
        t[yt * 16] = 1;
        t[yt * 16 + 15] = 1;
    }
    let e: Vec<char> = edges.chars().collect();
    if e[0] != ' ' {
        t[0x07] = 0;
        t[0x08] = 0;
    }
    if e[1] != ' ' {
        t[0x70] = 0;
        t[0x80] = 0;
    }
    if e[2] != ' ' {
        t[0xe7] = 0;
        t[0xe8] = 0;
    }
    if e[3] != ' ' {
        t[0x7f] = 0;
        t[0x8f] = 0;
    }
    extra(&mut t);
    t
}

fn exit(ctype: ConnectionType, dir: u8, entrance: u32, exits: Vec<u8>) -> Connection {
    Connection::new(ctype, dir, entrance, exits)
}

pub fn fixture() -> Fix {
    let mut game = GameData::new();
    let cavern = game.add_metatileset("cavern", 0x88, 0xb4);
    let field = game.add_metatileset("field", 0x80, 0xb0);

    // Metatile effects: 0 floor, 1 solid, 2 water, 4 breakable (wall/bridge).
    let mut effects = vec![0u8; 0x100];
    effects[0x01] = 0x06;
    effects[0x02] = 0x02;
    effects[0x04] = 0x06;
    game.set_tile_effects(0xb4, effects.clone());
    game.set_tile_effects(0xb0, effects);
    let mut alternates: Vec<u8> = (0..0x20).collect();
    alternates[0x04] = 0x00;
    game.set_tileset(0x88, alternates.clone());
    game.set_tileset(0x80, alternates);

    let empty = game.add_metascreen(
        MetascreenData {
            name: "empty",
            sid: 0x80,
            feature: vec![Feature::Empty],
            delete: true,
            ..Default::default()
        },
        &[cavern],
    );
    game.set_empty_screen(cavern, empty);
    game.set_screen_tiles(0x80, vec![1; 0xf0]);

    let hall_ns = game.add_metascreen(
        MetascreenData {
            name: "hallNS",
            sid: 0x81,
            edges: Some("c c ".into()),
            connect: Some("19".into()),
            ..Default::default()
        },
        &[cavern],
    );
    let hall_ns_dark = game.add_metascreen(
        MetascreenData {
            name: "hallNSDark",
            sid: 0x81,
            edges: Some("c c ".into()),
            connect: Some("19".into()),
            flag: Some(ScreenFlag::Always),
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x81, tiles("c c ", |_| {}));

    let hall_we = game.add_metascreen(
        MetascreenData {
            name: "hallWE",
            sid: 0x82,
            edges: Some(" c c".into()),
            connect: Some("5d".into()),
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x82, tiles(" c c", |_| {}));

    let hall4 = game.add_metascreen(
        MetascreenData {
            name: "hall4",
            sid: 0x83,
            edges: Some("cccc".into()),
            connect: Some("159d".into()),
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x83, tiles("cccc", |_| {}));

    let stair_down_n = game.add_metascreen(
        MetascreenData {
            name: "stairDownN",
            sid: 0x84,
            edges: Some("c   ".into()),
            connect: Some("1x".into()),
            exits: vec![exit(ConnectionType::StairDown, 2, coord(9, 7), vec![0xa7])],
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x84, tiles("c   ", |_| {}));

    let stair_up_s = game.add_metascreen(
        MetascreenData {
            name: "stairUpS",
            sid: 0x85,
            edges: Some("  c ".into()),
            connect: Some("9x".into()),
            exits: vec![exit(ConnectionType::StairUp, 0, coord(5, 7), vec![0x47])],
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x85, tiles("  c ", |_| {}));

    let wall_ns = game.add_metascreen(
        MetascreenData {
            name: "wallNS",
            sid: 0x86,
            edges: Some("c c ".into()),
            connect: Some("1=9".into()),
            feature: vec![Feature::Wall],
            wall: Some(0x77),
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(
        0x86,
        tiles("c c ", |t| {
            for xt in 0..16 {
                t[0x70 + xt] = 1;
            }
            t[0x77] = 4;
            t[0x78] = 4;
        }),
    );

    let bridge_we = game.add_metascreen(
        MetascreenData {
            name: "bridgeWE",
            sid: 0x87,
            edges: Some(" c c".into()),
            connect: Some("5-d".into()),
            feature: vec![Feature::Bridge],
            wall: Some(0x78),
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(
        0x87,
        tiles(" c c", |t| {
            for yt in 1..14 {
                t[yt * 16 + 7] = 2;
                t[yt * 16 + 8] = 2;
            }
            t[0x77] = 4;
            t[0x78] = 4;
            t[0x87] = 4;
            t[0x88] = 4;
        }),
    );

    let river_we = game.add_metascreen(
        MetascreenData {
            name: "riverWE",
            sid: 0x88,
            edges: Some(" c c".into()),
            connect: Some("5:d".into()),
            feature: vec![Feature::River],
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(
        0x88,
        tiles(" c c", |t| {
            for yt in 1..14 {
                t[yt * 16 + 7] = 2;
                t[yt * 16 + 8] = 2;
            }
        }),
    );

    let pit_ns = game.add_metascreen(
        MetascreenData {
            name: "pitNS",
            sid: 0x89,
            edges: Some("c c ".into()),
            connect: Some("19".into()),
            feature: vec![Feature::Pit],
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x89, tiles("c c ", |_| {}));

    let spikes_ns = game.add_metascreen(
        MetascreenData {
            name: "spikesNS",
            sid: 0x8a,
            edges: Some("s s ".into()),
            connect: Some("19".into()),
            feature: vec![Feature::Spikes],
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x8a, tiles("s s ", |_| {}));

    let arena_n = game.add_metascreen(
        MetascreenData {
            name: "arenaN",
            sid: 0x8b,
            edges: Some("c   ".into()),
            connect: Some("1p".into()),
            feature: vec![Feature::Arena],
            poi: vec![(0, 0x70, 0x78)],
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x8b, tiles("c   ", |_| {}));

    let seam_down = game.add_metascreen(
        MetascreenData {
            name: "seamDown",
            sid: 0x8c,
            edges: Some("c c ".into()),
            connect: Some("19x".into()),
            exits: vec![exit(ConnectionType::SeamlessDown, 2, 0, vec![0xf7])],
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x8c, tiles("c c ", |_| {}));

    let seam_up = game.add_metascreen(
        MetascreenData {
            name: "seamUp",
            sid: 0x8d,
            edges: Some("c c ".into()),
            connect: Some("19x".into()),
            exits: vec![exit(ConnectionType::SeamlessUp, 0, 0, vec![0x07])],
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x8d, tiles("c c ", |_| {}));

    let cave_n = game.add_metascreen(
        MetascreenData {
            name: "caveN",
            sid: 0x8e,
            edges: Some("  c ".into()),
            connect: Some("9x".into()),
            exits: vec![exit(ConnectionType::Cave, 0, coord(4, 8), vec![0x38])],
            poi: vec![(1, 0x70, 0x78)],
            ..Default::default()
        },
        &[cavern],
    );
    game.set_screen_tiles(0x8e, tiles("  c ", |_| {}));

    let over_cave = game.add_metascreen(
        MetascreenData {
            name: "overCave",
            sid: 0x90,
            edges: Some("cccc".into()),
            connect: Some("159dx".into()),
            exits: vec![exit(ConnectionType::Cave, 0, coord(6, 8), vec![0x58])],
            ..Default::default()
        },
        &[field],
    );
    game.set_screen_tiles(0x90, tiles("cccc", |_| {}));

    let over_field = game.add_metascreen(
        MetascreenData {
            name: "overField",
            sid: 0x91,
            edges: Some("cccc".into()),
            connect: Some("159d".into()),
            ..Default::default()
        },
        &[field],
    );
    game.set_empty_screen(field, over_field);
    game.set_screen_tiles(0x91, tiles("cccc", |_| {}));

    game.platform_monsters = [0x7e, 0x7f, 0x9f, 0x8d];
    game.statue_monster = Some(0x8f);
    game.monsters.insert(
        0xaa,
        MonsterInfo {
            placement: Placement::Normal,
            clearance: 1,
        },
    );

    Fix {
        game,
        cavern,
        field,
        empty,
        hall_ns,
        hall_ns_dark,
        hall_we,
        hall4,
        stair_down_n,
        stair_up_s,
        wall_ns,
        bridge_we,
        river_we,
        pit_ns,
        spikes_ns,
        arena_n,
        seam_down,
        seam_up,
        cave_n,
        over_cave,
        over_field,
    }
}

/// Cave A: a one-screen-wide, three-screen-tall cave with a door to the
/// overworld at the top and a staircase down to cave B at the bottom.
pub fn cave_a() -> Location {
    let mut loc = Location::new(CAVE_A, "Cave A", 0x88, 0xb4, 3, 1);
    loc.screens = vec![vec![0x8e], vec![0x86], vec![0x84]];
    loc.entrances = vec![
        Entrance::new(0x00, coord(4, 8) as u16),
        Entrance::new(0x20, coord(9, 7) as u16),
    ];
    loc.exits = vec![
        ExitRecord {
            screen: 0x00,
            tile: 0x38,
            dest: OVERWORLD,
            entrance: 0,
        },
        ExitRecord {
            screen: 0x20,
            tile: 0xa7,
            dest: CAVE_B,
            entrance: 0,
        },
    ];
    loc.flags = vec![FlagRecord {
        screen: 0x10,
        flag: 0x285,
    }];
    loc.spawns = vec![
        // Trigger just inside the door.
        Spawn::new(2, 0x8a, 0x04, 0x08),
        // Chest in the middle hall.
        Spawn::new(2, 0x31, 0x17, 0x07),
        // Wall obstacle.
        Spawn::new(3, 0x00, 0x18, 0x07),
    ];
    loc
}

/// Cave B: the lower cave, one staircase back up.
pub fn cave_b() -> Location {
    let mut loc = Location::new(CAVE_B, "Cave B", 0x88, 0xb4, 2, 1);
    loc.screens = vec![vec![0x85], vec![0x81]];
    loc.entrances = vec![Entrance::new(0x00, coord(5, 7) as u16)];
    loc.exits = vec![ExitRecord {
        screen: 0x00,
        tile: 0x47,
        dest: CAVE_A,
        entrance: 1,
    }];
    loc
}

/// Cave C: a single flagged hall screen, no exits.
pub fn cave_c(always_true: usize) -> Location {
    let mut loc = Location::new(CAVE_C, "Cave C", 0x88, 0xb4, 1, 1);
    loc.screens = vec![vec![0x81]];
    loc.flags = vec![FlagRecord {
        screen: 0x00,
        flag: always_true,
    }];
    loc
}

/// Overworld: a 2x2 field with the cave A doorway in the northeast.
pub fn overworld() -> Location {
    let mut loc = Location::new(OVERWORLD, "Overworld", 0x80, 0xb0, 2, 2);
    loc.screens = vec![vec![0x91, 0x90], vec![0x91, 0x91]];
    loc.entrances = vec![Entrance::new(0x01, coord(6, 8) as u16)];
    loc.exits = vec![ExitRecord {
        screen: 0x01,
        tile: 0x58,
        dest: CAVE_A,
        entrance: 0,
    }];
    loc
}

/// Builds the three-location world with all metalocations constructed.
pub fn world(fix: &Fix) -> MetaWorld {
    let mut world = MetaWorld::new();
    world.add_location(cave_a());
    world.add_location(cave_b());
    world.add_location(overworld());
    world.build_meta(CAVE_A, &fix.game, None).unwrap();
    world.build_meta(CAVE_B, &fix.game, None).unwrap();
    world.build_meta(OVERWORLD, &fix.game, None).unwrap();
    world
}

/// Asserts the exit-symmetry invariant over every installed metalocation:
/// resolving any entry's destination table yields the original entry.
pub fn assert_symmetric(world: &MetaWorld) {
    for (&id, meta) in &world.metas {
        for (pos, ctype, (dest_tile, dest_type)) in meta.exits_vec() {
            let dest = (dest_tile >> 8) as usize;
            let reciprocal = world
                .metas
                .get(&dest)
                .and_then(|m| m.get_exit(dest_tile & 0xff, dest_type));
            assert_eq!(
                reciprocal,
                Some(((id as Pos) << 8 | pos, ctype)),
                "asymmetric exit: {id:02x} @ {pos:02x} {ctype} -> {dest_tile:04x} {dest_type}"
            );
        }
    }
}
