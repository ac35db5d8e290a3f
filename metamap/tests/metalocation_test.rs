mod common;

use common::*;
use metamap_game::location::{Entrance, ExitRecord, Location};
use metamap_game::metascreen::ConnectionType;
use metamap::metalocation::Metalocation;
use metamap::world::MetaWorld;

#[test]
fn test_construction_infers_tileset_and_screens() {
    let fix = fixture();
    let world = world(&fix);

    let meta = world.meta(CAVE_A).unwrap();
    assert_eq!(meta.tileset, fix.cavern);
    assert_eq!(meta.width(), 1);
    assert_eq!(meta.height(), 3);
    assert_eq!(meta.get(0x00), fix.cave_n);
    assert_eq!(meta.get(0x10), fix.wall_ns);
    assert_eq!(meta.get(0x20), fix.stair_down_n);

    let over = world.meta(OVERWORLD).unwrap();
    assert_eq!(over.tileset, fix.field);
    assert_eq!(over.get(0x01), fix.over_cave);
}

#[test]
fn test_construction_exit_inference() {
    let fix = fixture();
    let world = world(&fix);

    let meta = world.meta(CAVE_A).unwrap();
    assert_eq!(
        meta.get_exit(0x00, ConnectionType::Cave),
        Some((((OVERWORLD as i32) << 8) | 0x01, ConnectionType::Cave))
    );
    assert_eq!(
        meta.get_exit(0x20, ConnectionType::StairDown),
        Some((((CAVE_B as i32) << 8) | 0x00, ConnectionType::StairUp))
    );
    assert_eq!(meta.exit_count(), 2);
    assert_symmetric(&world);
}

#[test]
fn test_construction_collects_free_flags() {
    let fix = fixture();
    let world = world(&fix);
    let meta = world.meta(CAVE_A).unwrap();
    assert!(meta.free_flags.contains(&0x285));
    assert!(meta.custom_flags.is_empty());
}

#[test]
fn test_variant_picked_by_flag() {
    let fix = fixture();
    let mut world = MetaWorld::new();
    let always = world.flags.always_true;
    world.add_location(cave_c(always));
    world.build_meta(CAVE_C, &fix.game, None).unwrap();
    // The flagged hall position selects the variant expecting the
    // always-true flag over the plain hall.
    assert_eq!(world.meta(CAVE_C).unwrap().get(0x00), fix.hall_ns_dark);

    // Without the flag record, the plain hall wins.
    let mut world2 = MetaWorld::new();
    let mut loc = cave_c(always);
    loc.flags.clear();
    world2.add_location(loc);
    world2.build_meta(CAVE_C, &fix.game, None).unwrap();
    assert_eq!(world2.meta(CAVE_C).unwrap().get(0x00), fix.hall_ns);
}

#[test]
fn test_construction_fails_on_unknown_screen() {
    let fix = fixture();
    let mut world = MetaWorld::new();
    let mut loc = Location::new(0x13, "Broken", 0x88, 0xb4, 1, 1);
    loc.screens = vec![vec![0x99]];
    world.add_location(loc);
    let err = world.build_meta(0x13, &fix.game, None);
    assert!(err.is_err(), "unknown screen id must fail construction");
}

#[test]
fn test_grid_bounds() {
    let fix = fixture();
    let world = world(&fix);
    for meta in world.metas.values() {
        for pos in meta.all_pos() {
            assert!(pos & 0xf < meta.width());
            assert!(pos >> 4 < meta.height());
            assert!(meta.in_bounds(pos));
        }
        assert_eq!(
            meta.all_pos().len(),
            (meta.width() * meta.height()) as usize
        );
    }
}

#[test]
fn test_validate_detects_bad_neighbor() {
    let fix = fixture();
    let mut meta = Metalocation::new(0x70, fix.cavern, 2, 1, &fix.game);
    meta.set(0x00, Some(fix.hall_ns), &fix.game);
    meta.set(0x10, Some(fix.hall_ns), &fix.game);
    assert!(meta.validate(&fix.game).is_ok());
    // A horizontal hall below a vertical one leaves a mismatched edge.
    meta.set(0x10, Some(fix.hall_we), &fix.game);
    assert!(meta.validate(&fix.game).is_err());
    // Empty screens are exempt.
    meta.set(0x10, None, &fix.game);
    assert!(meta.validate(&fix.game).is_ok());
}

#[test]
fn test_round_trip() {
    let fix = fixture();
    let mut world = world(&fix);
    let before: Vec<Location> = [CAVE_A, CAVE_B, OVERWORLD]
        .iter()
        .map(|&id| world.location(id).unwrap().clone())
        .collect();

    for &id in &[CAVE_A, CAVE_B, OVERWORLD] {
        world.write(id, &fix.game).unwrap();
        world.write_entrance0(id, &fix.game).unwrap();
    }

    for orig in &before {
        let loc = world.location(orig.id).unwrap();
        assert_eq!(loc.width, orig.width);
        assert_eq!(loc.height, orig.height);
        assert_eq!(loc.screens, orig.screens);
        assert_eq!(loc.tileset, orig.tileset);
        assert_eq!(loc.tile_effects, orig.tile_effects);
        assert_eq!(loc.entrances, orig.entrances);

        let mut exits = loc.exits.clone();
        let mut orig_exits = orig.exits.clone();
        let key = |e: &ExitRecord| (e.screen, e.tile, e.dest, e.entrance);
        exits.sort_by_key(key);
        orig_exits.sort_by_key(key);
        assert_eq!(exits, orig_exits, "exits differ in {}", orig.name);

        let mut flags = loc.flags.clone();
        let mut orig_flags = orig.flags.clone();
        flags.sort_by_key(|f| (f.screen, f.flag));
        orig_flags.sort_by_key(|f| (f.screen, f.flag));
        assert_eq!(flags, orig_flags, "flags differ in {}", orig.name);

        assert_eq!(loc.pits, orig.pits, "pits differ in {}", orig.name);
    }
}

#[test]
fn test_seamless_round_trip() {
    let fix = fixture();
    let mut world = MetaWorld::new();

    // An upper map whose bottom screen scrolls seamlessly into a lower map.
    // The raw record stores the exit on the phantom row below the grid.
    let mut upper = Location::new(0x35, "Upper", 0x88, 0xb4, 2, 1);
    upper.screens = vec![vec![0x8c], vec![0x81]];
    upper.entrances = vec![Entrance::new(0x00, coord(2, 7) as u16)];
    upper.exits = vec![ExitRecord {
        screen: 0x10,
        tile: 0x07,
        dest: 0x36,
        entrance: 0x20,
    }];
    let mut lower = Location::new(0x36, "Lower", 0x88, 0xb4, 2, 1);
    lower.screens = vec![vec![0x8d], vec![0x81]];
    lower.entrances = vec![Entrance::new(0x00, coord(2, 7) as u16)];
    lower.exits = vec![ExitRecord {
        screen: 0x00,
        tile: 0x07,
        dest: 0x35,
        entrance: 0x20,
    }];
    world.add_location(upper.clone());
    world.add_location(lower.clone());
    world.build_meta(0x35, &fix.game, None).unwrap();
    world.build_meta(0x36, &fix.game, None).unwrap();

    // The sentinel row resolved back onto the seamless screen itself.
    let meta = world.meta(0x35).unwrap();
    assert_eq!(
        meta.get_exit(0x00, ConnectionType::SeamlessDown),
        Some((0x3600, ConnectionType::SeamlessUp))
    );
    let meta = world.meta(0x36).unwrap();
    assert_eq!(
        meta.get_exit(0x00, ConnectionType::SeamlessUp),
        Some((0x3500, ConnectionType::SeamlessDown))
    );
    assert_symmetric(&world);

    world.write(0x35, &fix.game).unwrap();
    world.write(0x36, &fix.game).unwrap();
    assert_eq!(world.location(0x35).unwrap().exits, upper.exits);
    assert_eq!(world.location(0x36).unwrap().exits, lower.exits);
}

#[test]
fn test_show_and_screen_names() {
    let fix = fixture();
    let world = world(&fix);
    let meta = world.meta(CAVE_A).unwrap();
    let names = meta.screen_names(&fix.game);
    assert_eq!(names, "caveN\nwallNS\nstairDownN");
    let shown = meta.show(&fix.game);
    // Header plus three rows per screen.
    assert_eq!(shown.lines().count(), 1 + 3 * 3);
    assert!(shown.contains(" ? "));
}

#[test]
fn test_set_height_resizes() {
    let fix = fixture();
    let mut meta = Metalocation::new(0x71, fix.cavern, 2, 2, &fix.game);
    meta.set(0x00, Some(fix.hall_ns), &fix.game);
    meta.set_height(4, &fix.game);
    assert_eq!(meta.height(), 4);
    assert_eq!(meta.get(0x00), fix.hall_ns);
    assert_eq!(meta.get(0x30), fix.empty);
    meta.set_height(1, &fix.game);
    assert_eq!(meta.all_pos().len(), 2);
}

#[test]
fn test_pick_type_ambiguity_is_fatal() {
    let fix = fixture();
    let world = world(&fix);
    let meta = world.meta(CAVE_A).unwrap();
    // One exit at the stair screen: unambiguous.
    assert_eq!(
        meta.pick_type_from_exits(0x20, &fix.game).unwrap(),
        ConnectionType::StairDown
    );
    // The plain wall screen has no exits at all.
    assert!(meta.pick_type_from_exits(0x10, &fix.game).is_err());
}
