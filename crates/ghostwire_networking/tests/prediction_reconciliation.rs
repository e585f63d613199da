//! Move queue, time credit, correction and replay across real packets.

use ghostwire_core::integrator::StateIndex;
use ghostwire_core::{Barrier, GameObject, IdleCallPath, Item, Move, ObjectId, ObjectKind, Point, Ship, World};
use ghostwire_networking::control::ControlConnection;
use ghostwire_networking::{ClientSession, ConnectionId, GhostTable, ServerSession, SessionConfig, MAX_PENDING_MOVES};
use ghostwire_shared::BitStream;

const TICK: u32 = 32;

fn wall(x: f32) -> ObjectKind {
    ObjectKind::Barrier(Barrier::new(vec![
        Point::new(x, -400.0),
        Point::new(x + 40.0, -400.0),
        Point::new(x + 40.0, 400.0),
        Point::new(x, 400.0),
    ]))
}

struct Harness {
    server: ServerSession,
    client: ClientSession,
    conn: ConnectionId,
    ship: ObjectId,
}

impl Harness {
    fn new(extra: impl FnOnce(&mut World)) -> Self {
        let mut world = World::new();
        world.add(wall(300.0));
        extra(&mut world);
        let ship = world.add(ObjectKind::Ship(Ship::new(Point::ZERO)));
        let mut server = ServerSession::with_world(world, SessionConfig::default());
        let conn = server.connect(Some(ship));
        let client = ClientSession::new(SessionConfig::default());
        Self { server, client, conn, ship }
    }

    fn server_to_client(&mut self) {
        let packet = self.server.write_packet(self.conn).unwrap();
        self.client.receive_packet(&packet).unwrap();
    }

    fn client_to_server(&mut self) {
        let packet = self.client.write_packet();
        self.server.receive_packet(self.conn, &packet).unwrap();
    }

    /// Initial ghosts, their acknowledgement, then the control handoff.
    fn sync(&mut self) {
        self.server_to_client();
        self.client_to_server();
        self.server_to_client();
        assert!(self.client.control_object().is_some());
    }

    fn tick(&mut self, input: Move) {
        self.client.idle(TICK, input);
        self.server.idle(TICK);
        self.client_to_server();
        self.server_to_client();
    }

    fn server_ship(&self) -> (Point, Point) {
        let s = self.server.world().get(self.ship).unwrap().as_ship().unwrap().mover.actual();
        (s.pos, s.vel)
    }

    fn client_ship(&self) -> (Point, Point) {
        let id = self.client.control_object().unwrap();
        let s = self.client.world().get(id).unwrap().as_ship().unwrap().mover.actual();
        (s.pos, s.vel)
    }
}

fn thrust_right(boost: bool) -> Move {
    Move {
        right: 1.0,
        boost,
        ..Move::new()
    }
}

#[test]
fn lossless_prediction_needs_no_further_corrections() {
    let mut h = Harness::new(|_| {});
    h.sync();
    assert_eq!(h.client.control().correction_count(), 1);

    // runs into the wall at x = 300 and bounces
    for tick in 0..60 {
        h.tick(thrust_right(tick % 20 > 12));
        assert_eq!(h.client_ship(), h.server_ship(), "diverged at tick {tick}");
    }
    assert_eq!(h.client.control().correction_count(), 1);
    assert_eq!(h.client.control().pending_move_count(), 0);
}

#[test]
fn server_teleport_is_corrected_and_replayed() {
    let mut h = Harness::new(|_| {});
    h.sync();
    for _ in 0..5 {
        h.tick(thrust_right(false));
    }

    let ship = h.ship;
    h.server
        .world_mut()
        .get_mut(ship)
        .and_then(GameObject::as_ship_mut)
        .unwrap()
        .mover
        .state_mut(StateIndex::Actual)
        .pos = Point::new(-100.0, 80.0);

    // the client has a move in flight when the correction lands
    h.client.idle(TICK, thrust_right(false));
    h.server.idle(TICK);
    h.server_to_client();
    assert_eq!(h.client.control().correction_count(), 2);
    assert_eq!(h.client.control().pending_move_count(), 1);

    h.client_to_server();
    h.server_to_client();
    assert_eq!(h.client_ship(), h.server_ship());
    assert_eq!(h.client.control().correction_count(), 2);
}

#[test]
fn replayed_correction_matches_fresh_simulation() {
    // authoritative state the server sends
    let mut server_world = World::new();
    server_world.add(wall(150.0));
    let server_ship = server_world.add(ObjectKind::Ship(Ship::new(Point::new(40.0, -10.0))));
    {
        let ship = server_world.get_mut(server_ship).and_then(GameObject::as_ship_mut).unwrap();
        ship.mover.state_mut(StateIndex::Actual).vel = Point::new(220.0, 35.0);
        ship.energy = 40_000;
    }

    let moves: Vec<Move> = (0..12u32)
        .map(|i| {
            let mut m = Move {
                right: 1.0,
                up: if i % 3 == 0 { 0.6 } else { 0.0 },
                angle: 0.3 * i as f32,
                boost: i > 6,
                time: 20 + i * 7,
                ..Move::new()
            };
            m.prepare();
            m
        })
        .collect();

    // client: stale prediction, same geometry, all moves still queued
    let mut client_world = World::new();
    client_world.add(wall(150.0));
    let client_ship = client_world.add(ObjectKind::Ship(Ship::new(Point::new(-300.0, 200.0))));
    let mut ghosts = GhostTable::new();
    ghosts.bind(5, client_ship);
    let mut client = ControlConnection::new(0);
    for m in &moves {
        client.add_pending_move(*m);
    }

    let mut server = ControlConnection::new(0);
    server.set_control_object(Some(server_ship));
    let mut stream = BitStream::new();
    server.write_server_control(&mut stream, &server_world, Some(5));
    stream.set_bit_position(0);
    client.read_server_control(&mut stream, &mut client_world, &ghosts).unwrap();
    assert!(client.replay_pending());
    client.replay_moves(&mut client_world);

    // fresh run of the same moves from the authoritative state
    let mut fresh = server_world.clone();
    for m in &moves {
        fresh.get_mut(server_ship).unwrap().current_move = *m;
        fresh.integrate(server_ship, IdleCallPath::ServerIdleControlFromClient);
    }

    let replayed = *client_world.get(client_ship).unwrap().as_ship().unwrap().mover.actual();
    let expected = *fresh.get(server_ship).unwrap().as_ship().unwrap().mover.actual();
    assert_eq!(replayed.pos, expected.pos);
    assert_eq!(replayed.vel, expected.vel);
    let replayed_energy = client_world.get(client_ship).unwrap().as_ship().unwrap().energy;
    assert_eq!(replayed_energy, fresh.get(server_ship).unwrap().as_ship().unwrap().energy);
}

#[test]
fn pending_queue_never_exceeds_bound() {
    let mut h = Harness::new(|_| {});
    h.sync();
    for _ in 0..100 {
        h.client.idle(TICK, thrust_right(false));
    }
    assert_eq!(h.client.control().pending_move_count(), MAX_PENDING_MOVES);
}

#[test]
fn move_beyond_time_credit_is_dropped_and_corrected() {
    let mut h = Harness::new(|_| {});
    h.sync();
    let credit = |h: &Harness| h.server.connection(h.conn).unwrap().control().move_time_credit();
    assert_eq!(credit(&h), 0);

    h.server.idle(30);
    h.client.idle(50, thrust_right(false));
    h.client_to_server();
    assert_eq!(credit(&h), 30);
    assert_eq!(h.server_ship().1, Point::ZERO);

    // the client predicted a move the server refused: it gets pulled back
    h.server_to_client();
    assert_eq!(h.client.control().correction_count(), 2);
    assert_eq!(h.client_ship(), h.server_ship());
}

#[test]
fn points_stay_absolute_until_control_ghost_is_acknowledged() {
    let mut item = ObjectId(0);
    let mut h = Harness::new(|world| {
        item = world.add(ObjectKind::Item(Item::new(Point::new(123.25, -40.5), true)));
    });

    // first server packet is lost; the client acks nothing
    let _lost = h.server.write_packet(h.conn).unwrap();
    h.client_to_server();
    // initials still in flight: nothing to send, still absolute
    h.server_to_client();
    assert_eq!(h.client.control().compression_reference(), None);
    h.client_to_server();

    // initials re-sent after the loss was reported, still without a frame
    h.server_to_client();
    assert_eq!(h.client.control().compression_reference(), None);
    let client_item = h
        .client
        .world()
        .iter()
        .find_map(|o| o.as_item().map(|i| i.mover.actual().pos))
        .unwrap();
    assert_eq!(client_item, Point::new(123.25, -40.5));

    // once acknowledged, updates are relative to the reference and rounded
    h.client_to_server();
    h.server_to_client();
    assert_eq!(h.client.control().compression_reference(), Some(Point::ZERO));
    h.server.world_mut().set_item_actual_pos(item, Point::new(200.25, 10.75));
    h.server_to_client();
    let client_item = h
        .client
        .world()
        .iter()
        .find_map(|o| o.as_item().map(|i| i.mover.actual().pos))
        .unwrap();
    assert_eq!(client_item, Point::new(200.0, 11.0));
}
