//! # Loopback Simulation
//!
//! Runs a server and one predicting client over a seeded lossy link and
//! reports how far the client's prediction ended up from the server.
//!
//! ```text
//! loopback_sim [session.toml] [seconds] [seed]
//! ```

use ghostwire_core::{Barrier, Item, Move, ObjectKind, Point, Ship, World};
use ghostwire_networking::{ClientSession, LinkConditions, LossyLink, ServerSession, SessionConfig};

fn arena() -> (World, ghostwire_core::ObjectId) {
    let mut world = World::new();
    for (x, y, w, h) in [
        (-620.0, -470.0, 20.0, 940.0),
        (600.0, -470.0, 20.0, 940.0),
        (-600.0, -470.0, 1200.0, 20.0),
        (-600.0, 450.0, 1200.0, 20.0),
    ] {
        world.add(ObjectKind::Barrier(Barrier::new(vec![
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ])));
    }
    for i in 0..6 {
        world.add(ObjectKind::Item(Item::new(Point::new(-250.0 + 100.0 * i as f32, 120.0), true)));
    }
    let ship = world.add(ObjectKind::Ship(Ship::new(Point::ZERO)));
    (world, ship)
}

fn input_for(tick: u32) -> Move {
    let phase = (tick / 40) % 4;
    Move {
        right: if phase == 0 { 1.0 } else { 0.0 },
        down: if phase == 1 { 1.0 } else { 0.0 },
        left: if phase == 2 { 1.0 } else { 0.0 },
        up: if phase == 3 { 1.0 } else { 0.0 },
        boost: tick % 90 > 70,
        ..Move::new()
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => match SessionConfig::from_toml_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load {path}: {err}");
                std::process::exit(2);
            }
        },
        None => SessionConfig::default(),
    };
    let seconds: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(20);
    let seed: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(7);

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         GHOSTWIRE LOOPBACK SIMULATION                            ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║  Link: POOR (100ms + 50ms jitter, 5% loss, 2% duplicates)        ║");
    println!("║  Duration: {seconds:>4} s   Seed: {seed:<20}                 ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");

    let (world, ship) = arena();
    let mut server = ServerSession::with_world(world, config.clone());
    let conn = server.connect(Some(ship));
    let mut client = ClientSession::new(config.clone());

    let mut up = LossyLink::new(LinkConditions::POOR, seed);
    let mut down = LossyLink::new(LinkConditions::POOR, seed.wrapping_add(1));

    let tick_ms = config.server_tick_ms.max(1);
    let ticks = seconds * 1000 / tick_ms;
    let mut errors = 0u32;

    for tick in 0..ticks {
        client.idle(tick_ms, input_for(tick));
        up.send(client.write_packet());

        for packet in up.advance(tick_ms) {
            if server.receive_packet(conn, &packet).is_err() {
                errors += 1;
            }
        }
        server.idle(tick_ms);
        match server.write_packet(conn) {
            Ok(packet) => down.send(packet),
            Err(_) => errors += 1,
        }
        for packet in down.advance(tick_ms) {
            if client.receive_packet(&packet).is_err() {
                errors += 1;
            }
        }
    }

    let server_pos = server
        .world()
        .get(ship)
        .and_then(|o| o.as_ship())
        .map(|s| s.mover.actual().pos);
    let client_pos = client
        .control_object()
        .and_then(|id| client.world().get(id))
        .and_then(|o| o.as_ship())
        .map(|s| s.mover.actual().pos);

    let up_stats = up.stats();
    let down_stats = down.stats();
    println!();
    println!("  Client → server: {} sent, {} dropped, {} duplicated", up_stats.sent, up_stats.dropped, up_stats.duplicated);
    println!("  Server → client: {} sent, {} dropped, {} duplicated", down_stats.sent, down_stats.dropped, down_stats.duplicated);
    println!("  Ghosts on client: {}", client.ghosts().len());
    println!("  Corrections:      {}", client.control().correction_count());
    println!("  Pending moves:    {}", client.control().pending_move_count());
    println!("  Packet errors:    {errors}");
    match (server_pos, client_pos) {
        (Some(s), Some(c)) => println!("  Prediction gap:   {:.3} units (server {s:?}, client {c:?})", s.distance(c)),
        _ => println!("  Prediction gap:   client never received its control object"),
    }

    if errors > 0 {
        std::process::exit(1);
    }
}
