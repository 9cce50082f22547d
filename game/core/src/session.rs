//! Game sessions: one isolated world, its systems and roster, plus the
//! outbound replication queue drained by the dispatcher at the tick barrier.

use crate::components::{
    Attached, Blob, BonusWeapon, Collider, Enemy, GameState, Health, HitFlash, InputState,
    Invulnerability, NetworkId, Player, Position, Powerup, Projectile, Score, Scrollable, Shield,
    SpeedBoost, Sprite, ToDestroy, Velocity, Wall, WaveController,
};
use crate::protocol::{Difficulty, EntityKind, EntityState, GameMode, Packet};
use crate::systems;
use flare::logging;
use hadron::entity::EntityId;
use hadron::prelude::{Scheduler, World};
use hashbrown::HashMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub type SessionId = u32;

/// Replication events published on the session world's bus. Every mutation
/// that is visible across peers produces exactly one of these.
pub mod events {
    use crate::protocol::EntityKind;

    #[derive(Debug, Clone)]
    pub struct Spawned {
        pub network_id: u32,
        pub kind: EntityKind,
        pub x: f32,
        pub y: f32,
        pub owner_player_id: u32,
    }

    #[derive(Debug, Clone)]
    pub struct Destroyed {
        pub network_id: u32,
    }

    #[derive(Debug, Clone)]
    pub struct ProjectileFired {
        pub network_id: u32,
        pub owner_player_id: u32,
        pub x: f32,
        pub y: f32,
        pub velocity_x: f32,
        pub velocity_y: f32,
    }

    #[derive(Debug, Clone)]
    pub struct Exploded {
        pub x: f32,
        pub y: f32,
        pub size: u8,
    }

    #[derive(Debug, Clone)]
    pub struct ScoreChanged {
        pub player_id: u32,
        pub score: u32,
    }

    #[derive(Debug, Clone)]
    pub struct WaveStarted {
        pub wave: u16,
    }

    #[derive(Debug, Clone)]
    pub struct WaveCompleted {
        pub wave: u16,
    }

    #[derive(Debug, Clone)]
    pub struct PlayerEaten {
        pub eater_player_id: u32,
        pub eaten_player_id: u32,
    }
}

/// Outbound traffic produced by a session, drained in production order at
/// the barrier step.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Reliable packet for every session member.
    Broadcast(Packet),
    /// Reliable packet for one member.
    To(u32, Packet),
    /// Unreliable packet for one member.
    Datagram(u32, Packet),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionState {
    Spawning,
    Running,
    Ending,
}

#[derive(Debug, Clone)]
pub struct SessionMember {
    pub player_id: u32,
    pub entity: EntityId,
    pub last_input_sequence: u32,
    pub connected: bool,
}

/// Which game the server runs; decides the system stack and spawn layout of
/// every session it creates.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionKind {
    /// Side-scroller: waves, shooting, scrolling scenery.
    Shooter,
    /// Blob arena: mass-based predation, last player standing.
    Blob,
}

/// Per-session tuning shared by the manager.
#[derive(Debug, Copy, Clone)]
pub struct SessionConfig {
    pub map_width: f32,
    pub map_height: f32,
    pub scroll_speed: f32,
    pub kind: SessionKind,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            map_width: 1920.0,
            map_height: 1080.0,
            scroll_speed: 40.0,
            kind: SessionKind::Shooter,
        }
    }
}

pub struct Session {
    id: SessionId,
    pub mode: GameMode,
    pub difficulty: Difficulty,
    pub map_id: u16,

    state: SessionState,
    paused: bool,

    world: World,
    scheduler: Scheduler,
    members: Vec<SessionMember>,

    server_tick: u32,

    outbound: Rc<RefCell<VecDeque<Outbound>>>,
    scores: Rc<RefCell<HashMap<u32, u32>>>,

    log: logging::Logger,
}

impl Session {
    pub fn new(
        id: SessionId,
        mode: GameMode,
        difficulty: Difficulty,
        map_id: u16,
        roster: &[u32],
        config: SessionConfig,
        log: &logging::Logger,
    ) -> Session {
        let session_log = log.new(logging::o!("session_id" => id));

        let mut world = World::new(&session_log);
        register_components(&mut world);

        let outbound = Rc::new(RefCell::new(VecDeque::new()));
        let scores = Rc::new(RefCell::new(HashMap::new()));
        subscribe_replication(&world, &outbound, &scores);

        let mut scheduler = Scheduler::new(&session_log);
        systems::register_all(&mut scheduler, difficulty, config);
        scheduler.build(&mut world);

        // One controller entity per world carries the end-of-game verdict,
        // plus the wave plan in shooter sessions. It has no NetworkId and is
        // never replicated.
        let controller = world.spawn();
        if config.kind == SessionKind::Shooter {
            world.add(controller, systems::waves::controller_for(difficulty));
        }
        world.add(controller, GameState::default());

        let mut members = Vec::with_capacity(roster.len());
        for (index, &player_id) in roster.iter().enumerate() {
            let entity = spawn_player(&mut world, player_id, index, roster.len(), &config);
            scores.borrow_mut().insert(player_id, 0);
            members.push(SessionMember {
                player_id,
                entity,
                last_input_sequence: 0,
                connected: true,
            });
        }

        logging::info!(session_log, "session created";
                       "context" => "new",
                       "mode" => ?mode,
                       "difficulty" => ?difficulty,
                       "members" => members.len());

        Session {
            id,
            mode,
            difficulty,
            map_id,
            state: SessionState::Spawning,
            paused: false,
            world,
            scheduler,
            members,
            server_tick: 0,
            outbound,
            scores,
            log: session_log,
        }
    }

    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn server_tick(&self) -> u32 {
        self.server_tick
    }

    #[inline]
    pub fn members(&self) -> &[SessionMember] {
        &self.members
    }

    #[inline]
    pub fn is_member(&self, player_id: u32) -> bool {
        self.members.iter().any(|m| m.player_id == player_id)
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Advance the session one fixed step. Queues every replication event the
    /// systems produced, then the per-member snapshots for this tick.
    pub fn step(&mut self, dt: f32) {
        match self.state {
            SessionState::Spawning => {
                self.state = SessionState::Running;
            }
            SessionState::Running => {
                if self.paused {
                    return;
                }

                self.scheduler.run(&mut self.world, dt);
                self.server_tick += 1;

                if self.verdict().over {
                    self.finish();
                    return;
                }

                self.queue_snapshots();
            }
            SessionState::Ending => (),
        }
    }

    /// Route a player's input intent into their entity. Stale or duplicate
    /// sequences are dropped; reconciliation is monotonic.
    pub fn apply_input(&mut self, player_id: u32, flags: u16, sequence: u32) {
        let member = match self
            .members
            .iter_mut()
            .find(|m| m.player_id == player_id && m.connected)
        {
            Some(member) => member,
            None => return,
        };

        if sequence <= member.last_input_sequence {
            return;
        }

        member.last_input_sequence = sequence;

        if let Some(mut input) = self.world.get_mut::<InputState>(member.entity) {
            input.flags = flags;
        }
    }

    /// Mark a departed player's entity for destruction. The destroy event is
    /// broadcast by the next tick; the session keeps running for the rest.
    pub fn remove_player(&mut self, player_id: u32) {
        if let Some(member) = self
            .members
            .iter_mut()
            .find(|m| m.player_id == player_id && m.connected)
        {
            member.connected = false;
            self.world.add(member.entity, ToDestroy);

            logging::info!(self.log, "player left session";
                           "context" => "remove_player",
                           "player_id" => player_id);
        }
    }

    /// Admin surface: flag every enemy for destruction.
    pub fn clear_enemies(&mut self) -> usize {
        let doomed: Vec<EntityId> = self
            .world
            .view::<Enemy>()
            .iter()
            .map(|(entity, _)| entity)
            .collect();

        for &entity in doomed.iter() {
            self.world.add(entity, ToDestroy);
        }

        doomed.len()
    }

    /// Drain the outbound queue in production order.
    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        self.outbound.borrow_mut().drain(..).collect()
    }

    /// Final score per roster member, for the leaderboard.
    pub fn final_scores(&self) -> Vec<(u32, u32)> {
        self.scores
            .borrow()
            .iter()
            .map(|(&player, &score)| (player, score))
            .collect()
    }

    /// Force the session into its terminal state, queueing one game_over per
    /// member. Used by the step loop and by server shutdown.
    pub fn finish(&mut self) {
        if self.state == SessionState::Ending {
            return;
        }

        let verdict = self.verdict();
        self.state = SessionState::Ending;

        let scores = self.scores.borrow();
        let mut queue = self.outbound.borrow_mut();

        for member in self.members.iter().filter(|m| m.connected) {
            queue.push_back(Outbound::To(
                member.player_id,
                Packet::GameOver {
                    victory: verdict.victory,
                    final_score: scores.get(&member.player_id).copied().unwrap_or(0),
                },
            ));
        }

        logging::info!(self.log, "session over";
                       "context" => "finish",
                       "victory" => verdict.victory,
                       "tick" => self.server_tick);
    }

    /// Tear down the world, running system shutdown hooks.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown(&mut self.world);
    }

    fn verdict(&self) -> GameState {
        self.world
            .view::<GameState>()
            .iter()
            .next()
            .map(|(_, state)| *state)
            .unwrap_or_default()
    }

    fn queue_snapshots(&mut self) {
        let entities = self.snapshot_entities();

        let mut queue = self.outbound.borrow_mut();

        for member in self.members.iter().filter(|m| m.connected) {
            queue.push_back(Outbound::Datagram(
                member.player_id,
                Packet::Snapshot {
                    server_tick: self.server_tick,
                    last_processed_input: member.last_input_sequence,
                    entities: entities.clone(),
                },
            ));
        }
    }

    /// Full state of every replicated entity at the current tick.
    fn snapshot_entities(&self) -> Vec<EntityState> {
        let network_ids = self.world.view::<NetworkId>();
        let positions = self.world.view::<Position>();
        let velocities = self.world.view::<Velocity>();
        let healths = self.world.view::<Health>();

        let mut entities = Vec::with_capacity(network_ids.len());

        for (entity, network_id) in network_ids.iter() {
            let position = match positions.get(entity) {
                Some(position) => *position,
                None => continue,
            };

            let velocity = velocities
                .get(entity)
                .copied()
                .unwrap_or(Velocity { x: 0.0, y: 0.0 });

            let health = healths
                .get(entity)
                .copied()
                .unwrap_or(Health { current: 0, max: 0 });

            entities.push(EntityState {
                entity_id: network_id.id,
                position_x: position.x,
                position_y: position.y,
                velocity_x: velocity.x,
                velocity_y: velocity.y,
                health: health.current,
                flags: self.entity_flags(entity),
                kind: self.entity_kind(entity),
            });
        }

        entities
    }

    fn entity_flags(&self, entity: EntityId) -> u8 {
        use crate::protocol::entity_flags;

        let mut flags = 0;

        if self.world.has::<HitFlash>(entity) {
            flags |= entity_flags::HIT_FLASH;
        }
        if self.world.has::<Invulnerability>(entity) {
            flags |= entity_flags::INVULNERABLE;
        }
        if self.world.has::<Shield>(entity) {
            flags |= entity_flags::SHIELD;
        }
        if self.world.has::<SpeedBoost>(entity) {
            flags |= entity_flags::SPEED_BOOST;
        }

        flags
    }

    fn entity_kind(&self, entity: EntityId) -> EntityKind {
        if self.world.has::<Player>(entity) {
            EntityKind::Player
        } else if self.world.has::<Enemy>(entity) {
            EntityKind::Enemy
        } else if self.world.has::<Projectile>(entity) {
            EntityKind::Projectile
        } else if self.world.has::<Wall>(entity) {
            EntityKind::Wall
        } else {
            EntityKind::Powerup
        }
    }

    #[cfg(test)]
    pub(crate) fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

fn register_components(world: &mut World) {
    world.register::<Blob>();
    world.register::<Position>();
    world.register::<Velocity>();
    world.register::<Collider>();
    world.register::<Health>();
    world.register::<Score>();
    world.register::<Sprite>();
    world.register::<InputState>();
    world.register::<NetworkId>();
    world.register::<Player>();
    world.register::<Enemy>();
    world.register::<Projectile>();
    world.register::<Wall>();
    world.register::<Powerup>();
    world.register::<Scrollable>();
    world.register::<ToDestroy>();
    world.register::<HitFlash>();
    world.register::<Invulnerability>();
    world.register::<Shield>();
    world.register::<SpeedBoost>();
    world.register::<Attached>();
    world.register::<WaveController>();
    world.register::<GameState>();
    world.register::<BonusWeapon>();
}

fn subscribe_replication(
    world: &World,
    outbound: &Rc<RefCell<VecDeque<Outbound>>>,
    scores: &Rc<RefCell<HashMap<u32, u32>>>,
) {
    let queue = Rc::clone(outbound);
    world.subscribe(move |ev: &events::Spawned| {
        queue.borrow_mut().push_back(Outbound::Broadcast(Packet::EntitySpawn {
            entity_id: ev.network_id,
            kind: ev.kind,
            x: ev.x,
            y: ev.y,
            owner_player_id: ev.owner_player_id,
        }));
    });

    let queue = Rc::clone(outbound);
    world.subscribe(move |ev: &events::Destroyed| {
        queue.borrow_mut().push_back(Outbound::Broadcast(Packet::EntityDestroy {
            entity_id: ev.network_id,
        }));
    });

    let queue = Rc::clone(outbound);
    world.subscribe(move |ev: &events::ProjectileFired| {
        queue
            .borrow_mut()
            .push_back(Outbound::Broadcast(Packet::ProjectileSpawn {
                entity_id: ev.network_id,
                owner_player_id: ev.owner_player_id,
                x: ev.x,
                y: ev.y,
                velocity_x: ev.velocity_x,
                velocity_y: ev.velocity_y,
            }));
    });

    let queue = Rc::clone(outbound);
    world.subscribe(move |ev: &events::Exploded| {
        queue.borrow_mut().push_back(Outbound::Broadcast(Packet::Explosion {
            x: ev.x,
            y: ev.y,
            size: ev.size,
        }));
    });

    let queue = Rc::clone(outbound);
    let tally = Rc::clone(scores);
    world.subscribe(move |ev: &events::ScoreChanged| {
        tally.borrow_mut().insert(ev.player_id, ev.score);
        queue.borrow_mut().push_back(Outbound::Broadcast(Packet::ScoreUpdate {
            player_id: ev.player_id,
            score: ev.score,
        }));
    });

    let queue = Rc::clone(outbound);
    world.subscribe(move |ev: &events::WaveStarted| {
        queue
            .borrow_mut()
            .push_back(Outbound::Broadcast(Packet::WaveStart { wave: ev.wave }));
    });

    let queue = Rc::clone(outbound);
    world.subscribe(move |ev: &events::WaveCompleted| {
        queue
            .borrow_mut()
            .push_back(Outbound::Broadcast(Packet::WaveComplete { wave: ev.wave }));
    });

    let queue = Rc::clone(outbound);
    world.subscribe(move |ev: &events::PlayerEaten| {
        queue.borrow_mut().push_back(Outbound::Broadcast(Packet::PlayerEaten {
            eater_player_id: ev.eater_player_id,
            eaten_player_id: ev.eaten_player_id,
        }));
    });
}

fn spawn_player(
    world: &mut World,
    player_id: u32,
    index: usize,
    roster_size: usize,
    config: &SessionConfig,
) -> EntityId {
    let entity = world.spawn();

    let spread = (index + 1) as f32 / (roster_size + 1) as f32;

    let (x, y, collider) = match config.kind {
        SessionKind::Shooter => (
            80.0,
            config.map_height * spread,
            Collider {
                width: 48.0,
                height: 24.0,
            },
        ),
        SessionKind::Blob => (
            config.map_width * spread,
            config.map_height * 0.5,
            systems::eating::collider(systems::eating::INITIAL_MASS),
        ),
    };

    world.add(entity, Position { x, y });
    world.add(entity, Velocity { x: 0.0, y: 0.0 });
    world.add(entity, collider);
    world.add(
        entity,
        Health {
            current: 100,
            max: 100,
        },
    );
    world.add(entity, Score { value: 0 });
    world.add(entity, InputState::default());
    world.add(entity, NetworkId { id: entity.raw() });
    world.add(entity, Player { player_id });

    if config.kind == SessionKind::Blob {
        world.add(
            entity,
            Blob {
                mass: systems::eating::INITIAL_MASS,
            },
        );
    }

    world.publish(&events::Spawned {
        network_id: entity.raw(),
        kind: EntityKind::Player,
        x,
        y,
        owner_player_id: player_id,
    });

    entity
}

/// Owns every running session. Worlds are strictly isolated: nothing crosses
/// from one session to another.
pub struct SessionManager {
    sessions: HashMap<SessionId, Session>,
    next_id: SessionId,
    config: SessionConfig,
    log: logging::Logger,
}

impl SessionManager {
    pub fn new(config: SessionConfig, log: &logging::Logger) -> SessionManager {
        SessionManager {
            sessions: HashMap::new(),
            next_id: 1,
            config,
            log: log.new(logging::o!()),
        }
    }

    pub fn create(
        &mut self,
        mode: GameMode,
        difficulty: Difficulty,
        map_id: u16,
        roster: &[u32],
    ) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;

        let session = Session::new(id, mode, difficulty, map_id, roster, self.config, &self.log);
        self.sessions.insert(id, session);

        id
    }

    pub fn step_all(&mut self, dt: f32) {
        for session in self.sessions.values_mut() {
            session.step(dt);
        }
    }

    #[inline]
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    #[inline]
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Destroy a session, releasing its world and entities.
    pub fn remove(&mut self, id: SessionId) {
        if let Some(mut session) = self.sessions.remove(&id) {
            session.shutdown();
            logging::info!(self.log, "session destroyed"; "context" => "remove", "session_id" => id);
        }
    }

    pub fn set_all_paused(&mut self, paused: bool) {
        for session in self.sessions.values_mut() {
            session.set_paused(paused);
        }
    }
}
