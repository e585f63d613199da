//! Ghost lifecycle over a lockstep server/client pair: creation under the
//! packet budget, mount references, loss recovery, and deletion.

use ghostwire_core::{Barrier, Item, ObjectId, ObjectKind, Point, Ship, World};
use ghostwire_networking::packet::PacketHeader;
use ghostwire_networking::{ClientSession, ConnectionId, NetError, ServerSession, SessionConfig, MAX_PACKET_SIZE};
use ghostwire_shared::BitStream;

struct Pair {
    server: ServerSession,
    client: ClientSession,
    conn: ConnectionId,
}

impl Pair {
    fn new(world: World, ship: ObjectId) -> Self {
        let mut server = ServerSession::with_world(world, SessionConfig::default());
        let conn = server.connect(Some(ship));
        Self {
            server,
            client: ClientSession::new(SessionConfig::default()),
            conn,
        }
    }

    fn down(&mut self) {
        let packet = self.server.write_packet(self.conn).unwrap();
        assert!(packet.len() <= MAX_PACKET_SIZE);
        self.client.receive_packet(&packet).unwrap();
    }

    fn up(&mut self) {
        let packet = self.client.write_packet();
        self.server.receive_packet(self.conn, &packet).unwrap();
    }

    fn round_trip(&mut self) {
        self.down();
        self.up();
    }

    fn client_items(&self) -> Vec<&Item> {
        self.client.world().iter().filter_map(|o| o.as_item()).collect()
    }
}

fn arena() -> (World, ObjectId) {
    let mut world = World::new();
    world.add(ObjectKind::Barrier(Barrier::new(vec![
        Point::new(-700.0, 560.0),
        Point::new(700.0, 560.0),
        Point::new(700.0, 580.0),
        Point::new(-700.0, 580.0),
    ])));
    let ship = world.add(ObjectKind::Ship(Ship::new(Point::ZERO)));
    (world, ship)
}

#[test]
fn crowded_scope_is_spread_over_several_packets() {
    let (mut world, ship) = arena();
    for row in 0..15u8 {
        for col in 0..20u8 {
            let pos = Point::new(-300.0 + f32::from(col) * 30.0, 100.0 + f32::from(row) * 30.0);
            world.add(ObjectKind::Item(Item::new(pos, true)));
        }
    }
    let total = world.len();
    let mut pair = Pair::new(world, ship);

    pair.round_trip();
    assert!(pair.client.world().len() < total);

    for _ in 0..20 {
        pair.round_trip();
    }
    assert_eq!(pair.client.world().len(), total);
    assert_eq!(pair.client.ghosts().len(), total);
    assert!(pair.client.control_object().is_some());
}

#[test]
fn mount_reference_resolves_once_carrier_is_ghosted() {
    let (mut world, ship) = arena();
    let item = world.add(ObjectKind::Item(Item::new(Point::new(60.0, 0.0), false)));
    world.mount_item(item, Some(ship));
    let mut pair = Pair::new(world, ship);

    // carrier not yet acknowledged: the item arrives unmounted
    pair.round_trip();
    assert_eq!(pair.client_items().len(), 1);
    assert!(!pair.client_items()[0].mounted);

    pair.down();
    let carrier = pair.client.control_object().unwrap();
    let mounted = pair.client_items()[0];
    assert!(mounted.mounted);
    assert_eq!(mounted.mount, Some(carrier));
    let ship = pair.client.world().get(carrier).unwrap().as_ship().unwrap();
    assert_eq!(ship.mounted_items.len(), 1);
}

#[test]
fn lost_update_is_resent() {
    let (mut world, ship) = arena();
    let item = world.add(ObjectKind::Item(Item::new(Point::new(-40.0, 20.0), true)));
    let mut pair = Pair::new(world, ship);
    pair.round_trip();
    pair.round_trip();

    pair.server.world_mut().set_item_actual_pos(item, Point::new(50.0, 50.0));
    let _lost = pair.server.write_packet(pair.conn).unwrap();
    // a later packet arrives, the ack reveals the gap, the update goes out again
    pair.down();
    assert_eq!(pair.client_items()[0].mover.actual().pos, Point::new(-40.0, 20.0));
    pair.up();
    pair.down();
    assert_eq!(pair.client_items()[0].mover.actual().pos, Point::new(50.0, 50.0));
}

#[test]
fn objects_leaving_scope_or_world_are_deleted() {
    let (mut world, ship) = arena();
    let far = world.add(ObjectKind::Item(Item::new(Point::new(100.0, 0.0), true)));
    let doomed = world.add(ObjectKind::Item(Item::new(Point::new(-100.0, 0.0), true)));
    let mut pair = Pair::new(world, ship);
    pair.round_trip();
    pair.round_trip();
    assert_eq!(pair.client_items().len(), 2);

    pair.server.world_mut().set_item_actual_pos(far, Point::new(5000.0, 0.0));
    pair.server.world_mut().remove(doomed);
    pair.round_trip();
    assert!(pair.client_items().is_empty());

    // the delete is acknowledged and the slot freed on the server
    pair.round_trip();
    let server_ghosts = pair.server.connection(pair.conn).unwrap().ghosts();
    assert!(server_ghosts.index_of(far).is_none());
    assert!(server_ghosts.index_of(doomed).is_none());

    // back in range: ghosted again from scratch
    pair.server.world_mut().set_item_actual_pos(far, Point::new(10.0, 90.0));
    pair.round_trip();
    assert_eq!(pair.client_items().len(), 1);
}

#[test]
fn unknown_ghost_class_is_rejected() {
    let mut stream = BitStream::new();
    PacketHeader {
        sequence: 1,
        ack: 0,
        ack_bits: 0,
    }
    .write(&mut stream);
    // control section: no ghost, no reference, absolute, no correction
    for _ in 0..4 {
        stream.write_flag(false);
    }
    stream.write_flag(true);
    stream.write_int(3, 10);
    stream.write_flag(false);
    stream.write_flag(true);
    stream.write_int(7, 3);

    let mut client = ClientSession::new(SessionConfig::default());
    let err = client.receive_packet(&stream.into_bytes()).unwrap_err();
    assert!(matches!(err, NetError::UnknownClass(7)));
}
