//! Runner: jump over obstacles for as long as you can.
//!
//! Space or a pointer press jumps; after a crash the same input restarts.
//! The best score is kept in the module store under `best`.
#![allow(clippy::arithmetic_side_effects)]

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use deepfly_hub::{
    Capabilities, Container, GameModule, KeyPhase, Keyboard, ListenerId, ModuleDescriptor,
    ModuleError, ModuleManifest, ModuleRegistry, MountHandle, Node, NodeId, Slug,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::frame_loop::FrameLoop;

/// Registry key.
pub const SLUG: &str = "runner";

/// Store key of the persisted best score.
pub const BEST_KEY: &str = "best";

const WIDTH: f32 = 160.0;
const HEIGHT: f32 = 90.0;
const GROUND_Y: f32 = HEIGHT - 10.0;
const GRAVITY: f32 = 0.2;
const JUMP_VELOCITY: f32 = -4.2;
const PLAYER_X: f32 = 20.0;
const PLAYER_SIZE: f32 = 8.0;
const OBSTACLE_W: f32 = 6.0;
const OBSTACLE_SPEED: f32 = 1.8;
const DUST_LIFE: u8 = 20;

/// Display metadata.
#[must_use]
pub fn manifest() -> ModuleManifest {
    ModuleManifest::new(slug(), "Runner")
        .with_caption("Прыгай и беги")
        .with_icon("🏃")
        .with_version("1.0.0")
        .with_players(1)
}

fn slug() -> Slug {
    Slug::new(SLUG).unwrap_or_else(|_| unreachable!("static slug is valid"))
}

/// Code unit entry: register the module.
pub fn register(registry: &ModuleRegistry) {
    registry.register(slug(), ModuleDescriptor::new(manifest(), Runner));
}

/// An obstacle sliding towards the player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    /// Left edge.
    pub x: f32,
    /// Height above the ground.
    pub h: f32,
}

impl Obstacle {
    fn top(&self) -> f32 {
        GROUND_Y - self.h
    }
}

#[derive(Debug, Clone, Copy)]
struct Dust {
    vy: f32,
    life: u8,
}

/// What happened on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// Nothing notable.
    Running,
    /// The player crashed. Carries a new best score if one was set.
    Crashed {
        /// Final score.
        score: u32,
        /// New best, if beaten.
        new_best: Option<u32>,
    },
}

/// The simulation, independent of any surface.
#[derive(Debug)]
pub struct RunnerState {
    /// Top of the player.
    pub player_y: f32,
    /// Vertical velocity.
    pub vy: f32,
    /// In the air.
    pub jumping: bool,
    /// Live obstacles.
    pub obstacles: Vec<Obstacle>,
    /// Frames until the next obstacle.
    pub spawn_timer: f32,
    /// Obstacles cleared this run.
    pub score: u32,
    /// Best score so far.
    pub best: u32,
    /// Crashed and waiting for a restart.
    pub game_over: bool,
    vfx: bool,
    dust: Vec<Dust>,
    rng: StdRng,
}

impl RunnerState {
    /// A fresh run with a known best score.
    #[must_use]
    pub fn new(best: u32, vfx: bool, rng: StdRng) -> Self {
        Self {
            player_y: GROUND_Y - PLAYER_SIZE,
            vy: 0.0,
            jumping: false,
            obstacles: Vec::new(),
            spawn_timer: 0.0,
            score: 0,
            best,
            game_over: false,
            vfx,
            dust: Vec::new(),
            rng,
        }
    }

    fn reset(&mut self) {
        self.player_y = GROUND_Y - PLAYER_SIZE;
        self.vy = 0.0;
        self.jumping = false;
        self.obstacles.clear();
        self.spawn_timer = 0.0;
        self.score = 0;
        self.game_over = false;
    }

    /// Jump, or restart after a crash.
    pub fn jump(&mut self) {
        if self.game_over {
            self.reset();
        } else if !self.jumping {
            self.vy = JUMP_VELOCITY;
            self.jumping = true;
        }
    }

    /// Advance one frame.
    pub fn step(&mut self) -> StepEvent {
        if self.game_over {
            return StepEvent::Running;
        }

        self.vy += GRAVITY;
        self.player_y += self.vy;
        if self.player_y >= GROUND_Y - PLAYER_SIZE {
            if self.jumping && self.vfx {
                for _ in 0..3 {
                    let vy = -self.rng.gen_range(0.0..1.0);
                    self.dust.push(Dust {
                        vy,
                        life: DUST_LIFE,
                    });
                }
            }
            self.player_y = GROUND_Y - PLAYER_SIZE;
            self.vy = 0.0;
            self.jumping = false;
        }
        for dust in &mut self.dust {
            dust.life = dust.life.saturating_sub(1);
            dust.vy += 0.05;
        }
        self.dust.retain(|d| d.life > 0);

        self.spawn_timer -= 1.0;
        if self.spawn_timer <= 0.0 {
            let h = 12.0 + f32::from(self.rng.gen_range(0u8..10));
            self.obstacles.push(Obstacle { x: WIDTH, h });
            self.spawn_timer = 80.0 + self.rng.gen_range(0.0..60.0);
        }

        let mut event = StepEvent::Running;
        for obstacle in &mut self.obstacles {
            obstacle.x -= OBSTACLE_SPEED;
        }
        if self.obstacles.iter().any(|o| self.collides(o)) {
            self.game_over = true;
            let new_best = (self.score > self.best).then_some(self.score);
            if let Some(best) = new_best {
                self.best = best;
            }
            event = StepEvent::Crashed {
                score: self.score,
                new_best,
            };
        }
        let before = self.obstacles.len();
        self.obstacles.retain(|o| o.x + OBSTACLE_W >= 0.0);
        if !self.game_over {
            let cleared = u32::try_from(before - self.obstacles.len()).unwrap_or(u32::MAX);
            self.score = self.score.saturating_add(cleared);
        }
        event
    }

    fn collides(&self, o: &Obstacle) -> bool {
        o.x < PLAYER_X + PLAYER_SIZE
            && o.x + OBSTACLE_W > PLAYER_X
            && o.top() < self.player_y + PLAYER_SIZE
            && o.top() + o.h > self.player_y
    }

    /// Score line.
    #[must_use]
    pub fn status_text(&self) -> String {
        if self.game_over {
            format!("Game over, score: {} (best: {})", self.score, self.best)
        } else {
            format!("Score: {}", self.score)
        }
    }

    /// One-line rendering of the playfield.
    #[must_use]
    pub fn frame_text(&self) -> String {
        let obstacles: Vec<String> = self
            .obstacles
            .iter()
            .map(|o| format!("{:.0}:{:.0}", o.x, o.h))
            .collect();
        format!(
            "player {:.0} obstacles [{}] dust {}",
            self.player_y,
            obstacles.join(" "),
            self.dust.len()
        )
    }
}

/// The module entry point.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runner;

#[async_trait]
impl GameModule for Runner {
    async fn mount(
        &self,
        container: Container,
        caps: Capabilities,
    ) -> Result<Box<dyn MountHandle>, ModuleError> {
        container.clear();
        let vfx = caps.store.get_or("settings.vfx", true).await;
        let best = caps.store.get_or(BEST_KEY, 0u32).await;

        let state = Arc::new(Mutex::new(RunnerState::new(
            best,
            vfx,
            StdRng::from_entropy(),
        )));
        let canvas = container.append(Node::new("canvas", "160x90"));
        let status = container.append(Node::new("score", "Score: 0"));

        // Store writes are async; frame callbacks are not.
        let (best_tx, mut best_rx) = mpsc::unbounded_channel::<u32>();
        let store = caps.store.clone();
        tokio::spawn(async move {
            while let Some(best) = best_rx.recv().await {
                match store.set_json(BEST_KEY, &best).await {
                    Ok(()) => info!(best, "runner best score saved"),
                    Err(e) => warn!(error = %e, "failed to save runner best score"),
                }
            }
        });

        let key_listener = {
            let state = Arc::clone(&state);
            caps.keyboard.add_listener(move |event| {
                if event.phase == KeyPhase::Down && event.key == " " {
                    state.lock().unwrap_or_else(PoisonError::into_inner).jump();
                }
            })
        };
        let pointer_listener = {
            let state = Arc::clone(&state);
            container.add_pointer_listener(move |_| {
                state.lock().unwrap_or_else(PoisonError::into_inner).jump();
            })
        };

        let frame_loop = {
            let state = Arc::clone(&state);
            let container = container.clone();
            let bus = caps.bus.clone();
            let best_tx = best_tx.clone();
            FrameLoop::start(caps.frames.clone(), move || {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if let StepEvent::Crashed { score, new_best } = state.step() {
                    debug!(score, ?new_best, "runner crashed");
                    bus.emit("game_over", json!({ "score": score, "best": state.best }));
                    if let Some(best) = new_best {
                        // The receiver only goes away with the runtime.
                        let _ = best_tx.send(best);
                    }
                }
                container.set_text(canvas, state.frame_text());
                container.set_text(status, state.status_text());
            })
        };

        debug!(vfx, best, "runner mounted");
        Ok(Box::new(RunnerHandle {
            frame_loop,
            keyboard: caps.keyboard,
            key_listener,
            container,
            pointer_listener,
            nodes: [canvas, status],
            best_tx,
        }))
    }
}

struct RunnerHandle {
    frame_loop: FrameLoop,
    keyboard: Keyboard,
    key_listener: ListenerId,
    container: Container,
    pointer_listener: ListenerId,
    nodes: [NodeId; 2],
    best_tx: mpsc::UnboundedSender<u32>,
}

impl MountHandle for RunnerHandle {
    fn unmount(self: Box<Self>) -> Result<(), ModuleError> {
        self.frame_loop.stop();
        if !self.keyboard.remove_listener(self.key_listener) {
            warn!("runner key listener already removed");
        }
        self.container.remove_pointer_listener(self.pointer_listener);
        for id in self.nodes {
            self.container.remove(id);
        }
        // The frame loop holds the other sender; once both are gone the
        // writer task drains pending saves and exits.
        drop(self.best_tx);
        Ok(())
    }
}
