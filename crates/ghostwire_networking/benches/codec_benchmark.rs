//! Ghost codec cost: full ship updates and a crowded server packet.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ghostwire_core::integrator::StateIndex;
use ghostwire_core::{Item, ObjectKind, Point, Ship, UpdateMask, World};
use ghostwire_networking::compression::{read_compressed_point, write_compressed_point};
use ghostwire_networking::replication::ConnectionView;
use ghostwire_networking::{GhostTable, Replicated, ServerSession, SessionConfig};
use ghostwire_shared::BitStream;

fn bench_ship_update(c: &mut Criterion) {
    let mut world = World::new();
    let mut ship = Ship::new(Point::new(120.0, -80.0));
    ship.mover.state_mut(StateIndex::Actual).vel = Point::new(210.0, -45.0);
    let id = world.add(ObjectKind::Ship(ship));
    let ghosts = GhostTable::new();
    let view = ConnectionView {
        ghosts: &ghosts,
        control: None,
        reference: Some(Point::ZERO),
        one_way_ms: 50,
    };

    c.bench_function("ship_full_update", |b| {
        let mut stream = BitStream::new();
        b.iter(|| {
            stream.clear();
            if let Some(obj) = world.get(id) {
                black_box(obj.pack_update(&view, UpdateMask::ALL, &mut stream));
            }
        });
    });
}

fn bench_compressed_point(c: &mut Criterion) {
    let reference = Some(Point::new(300.0, 200.0));
    c.bench_function("compressed_point_round", |b| {
        let mut stream = BitStream::new();
        b.iter(|| {
            stream.clear();
            write_compressed_point(&mut stream, black_box(Point::new(512.5, -133.25)), reference);
            stream.set_bit_position(0);
            black_box(read_compressed_point(&mut stream, reference).ok());
        });
    });
}

fn bench_initial_packet(c: &mut Criterion) {
    c.bench_function("initial_packet_300_items", |b| {
        b.iter_with_setup(
            || {
                let mut world = World::new();
                for i in 0..300u16 {
                    let pos = Point::new(f32::from(i % 20) * 30.0 - 300.0, f32::from(i / 20) * 30.0 + 100.0);
                    world.add(ObjectKind::Item(Item::new(pos, true)));
                }
                let ship = world.add(ObjectKind::Ship(Ship::new(Point::ZERO)));
                let mut server = ServerSession::with_world(world, SessionConfig::default());
                let conn = server.connect(Some(ship));
                (server, conn)
            },
            |(mut server, conn)| black_box(server.write_packet(conn).ok()),
        );
    });
}

criterion_group!(benches, bench_ship_update, bench_compressed_point, bench_initial_packet);
criterion_main!(benches);
