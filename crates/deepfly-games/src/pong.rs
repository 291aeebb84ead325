//! Pong: two paddles, one ball, first to nowhere.
//!
//! Player one uses `W`/`S` or the pointer. Player two is the AI unless the
//! AI is switched off (`I`), in which case the arrow keys drive it.
#![allow(clippy::arithmetic_side_effects)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use deepfly_hub::{
    Capabilities, Container, GameModule, KeyEvent, KeyPhase, ListenerId, ModuleDescriptor,
    ModuleError, ModuleManifest, ModuleRegistry, MountHandle, Node, NodeId, PointerEvent, Slug,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{debug, warn};

use crate::frame_loop::FrameLoop;

/// Registry key.
pub const SLUG: &str = "pong";

const WIDTH: f32 = 160.0;
const HEIGHT: f32 = 100.0;
const PADDLE_W: f32 = 2.0;
const PADDLE_H: f32 = 16.0;
const BALL_SIZE: f32 = 2.0;
const BALL_VX: f32 = 1.8;
const BALL_VY: f32 = 1.2;
const PADDLE_STEP: f32 = 2.0;
const AI_FOLLOW: f32 = 0.05;
const POINTER_FOLLOW: f32 = 0.2;
const SPARK_LIFE: u8 = 20;
const SHAKE_FRAMES: u8 = 5;

/// Display metadata.
#[must_use]
pub fn manifest() -> ModuleManifest {
    ModuleManifest::new(slug(), "Pong")
        .with_caption("Классика 1v1")
        .with_icon("🏓")
        .with_version("1.0.0")
        .with_players(2)
}

fn slug() -> Slug {
    Slug::new(SLUG).unwrap_or_else(|_| unreachable!("static slug is valid"))
}

/// Code unit entry: register the module.
pub fn register(registry: &ModuleRegistry) {
    registry.register(slug(), ModuleDescriptor::new(manifest(), Pong));
}

/// A short-lived particle thrown off a paddle hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spark {
    /// Position.
    pub x: f32,
    /// Position.
    pub y: f32,
    vx: f32,
    vy: f32,
    life: u8,
}

/// Who scored on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Point {
    /// The left paddle scored.
    PlayerOne,
    /// The right paddle scored.
    PlayerTwo,
}

/// The simulation, independent of any surface.
#[derive(Debug)]
pub struct PongState {
    /// Top of the left paddle.
    pub p1_y: f32,
    /// Top of the right paddle.
    pub p2_y: f32,
    /// Left score.
    pub p1_score: u32,
    /// Right score.
    pub p2_score: u32,
    /// Ball position.
    pub ball: (f32, f32),
    /// Ball velocity.
    pub velocity: (f32, f32),
    /// Whether the AI drives the right paddle.
    pub ai: bool,
    vfx: bool,
    sparks: Vec<Spark>,
    shake: u8,
    keys: HashSet<String>,
    pointer_y: Option<f32>,
    rng: StdRng,
}

impl PongState {
    /// A fresh match. `vfx` enables sparks and screen shake.
    #[must_use]
    pub fn new(vfx: bool, rng: StdRng) -> Self {
        let paddle = HEIGHT / 2.0 - PADDLE_H / 2.0;
        Self {
            p1_y: paddle,
            p2_y: paddle,
            p1_score: 0,
            p2_score: 0,
            ball: (WIDTH / 2.0, HEIGHT / 2.0),
            velocity: (BALL_VX, BALL_VY),
            ai: true,
            vfx,
            sparks: Vec::new(),
            shake: 0,
            keys: HashSet::new(),
            pointer_y: None,
            rng,
        }
    }

    /// Track a key press or release.
    pub fn key(&mut self, event: &KeyEvent) {
        let key = event.key.to_lowercase();
        match event.phase {
            KeyPhase::Down => {
                if key == "i" && !self.keys.contains(&key) {
                    self.ai = !self.ai;
                }
                self.keys.insert(key);
            },
            KeyPhase::Up => {
                self.keys.remove(&key);
            },
        }
    }

    /// Pointer moved to `y` in `0.0..=1.0` of the surface height.
    pub fn pointer(&mut self, y: f32) {
        self.pointer_y = Some(y * HEIGHT);
    }

    fn held(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Advance one frame.
    pub fn step(&mut self) -> Option<Point> {
        if let Some(pointer_y) = self.pointer_y {
            let target = pointer_y - PADDLE_H / 2.0;
            self.p1_y += (target - self.p1_y) * POINTER_FOLLOW;
        } else {
            if self.held("w") {
                self.p1_y -= PADDLE_STEP;
            }
            if self.held("s") {
                self.p1_y += PADDLE_STEP;
            }
        }

        let (up, down) = (self.held("arrowup"), self.held("arrowdown"));
        if !self.ai && (up || down) {
            if up {
                self.p2_y -= PADDLE_STEP;
            }
            if down {
                self.p2_y += PADDLE_STEP;
            }
        } else {
            let target = self.ball.1 - PADDLE_H / 2.0;
            self.p2_y += (target - self.p2_y) * AI_FOLLOW;
        }
        self.p1_y = self.p1_y.clamp(0.0, HEIGHT - PADDLE_H);
        self.p2_y = self.p2_y.clamp(0.0, HEIGHT - PADDLE_H);

        self.ball.0 += self.velocity.0;
        self.ball.1 += self.velocity.1;
        if self.ball.1 <= 0.0 || self.ball.1 >= HEIGHT - BALL_SIZE {
            self.velocity.1 = -self.velocity.1;
            self.ball.1 = self.ball.1.clamp(0.0, HEIGHT - BALL_SIZE);
        }

        if self.ball.0 <= PADDLE_W && self.hits(self.p1_y) {
            self.velocity.0 = self.velocity.0.abs();
            self.velocity.1 = self.impact(self.p1_y) * 1.5;
            self.spark(1.0);
        }
        if self.ball.0 + BALL_SIZE >= WIDTH - PADDLE_W && self.hits(self.p2_y) {
            self.velocity.0 = -self.velocity.0.abs();
            self.velocity.1 = self.impact(self.p2_y) * 1.5;
            self.spark(-1.0);
        }

        self.update_sparks();
        self.shake = self.shake.saturating_sub(1);

        let point = if self.ball.0 < -BALL_SIZE {
            self.p2_score = self.p2_score.saturating_add(1);
            Some(Point::PlayerTwo)
        } else if self.ball.0 > WIDTH + BALL_SIZE {
            self.p1_score = self.p1_score.saturating_add(1);
            Some(Point::PlayerOne)
        } else {
            None
        };
        if point.is_some() {
            if self.vfx {
                self.shake = SHAKE_FRAMES;
            }
            self.reset_ball();
        }
        point
    }

    fn hits(&self, paddle_y: f32) -> bool {
        self.ball.1 + BALL_SIZE > paddle_y && self.ball.1 < paddle_y + PADDLE_H
    }

    fn impact(&self, paddle_y: f32) -> f32 {
        (self.ball.1 + BALL_SIZE / 2.0 - (paddle_y + PADDLE_H / 2.0)) / (PADDLE_H / 2.0)
    }

    fn spark(&mut self, direction: f32) {
        if !self.vfx {
            return;
        }
        for _ in 0..3 {
            let spark = Spark {
                x: self.ball.0,
                y: self.ball.1,
                vx: direction * self.rng.gen_range(0.0..1.0),
                vy: self.rng.gen_range(-0.5..0.5),
                life: SPARK_LIFE,
            };
            self.sparks.push(spark);
        }
    }

    fn update_sparks(&mut self) {
        for spark in &mut self.sparks {
            spark.life = spark.life.saturating_sub(1);
            spark.x += spark.vx;
            spark.y += spark.vy;
        }
        self.sparks.retain(|s| s.life > 0);
    }

    fn reset_ball(&mut self) {
        self.ball = (WIDTH / 2.0, HEIGHT / 2.0);
        let direction = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        self.velocity = (direction * BALL_VX, self.rng.gen_range(-1.0..1.0));
    }

    /// Live sparks.
    #[must_use]
    pub fn sparks(&self) -> &[Spark] {
        &self.sparks
    }

    /// Frames of screen shake left.
    #[must_use]
    pub fn shake(&self) -> u8 {
        self.shake
    }

    /// `"p1 : p2"`.
    #[must_use]
    pub fn score_text(&self) -> String {
        format!("{} : {}", self.p1_score, self.p2_score)
    }

    /// Label of the AI toggle.
    #[must_use]
    pub fn ai_label(&self) -> &'static str {
        if self.ai { "AI: on" } else { "AI: off" }
    }

    /// One-line rendering of the playfield.
    #[must_use]
    pub fn frame_text(&self) -> String {
        format!(
            "ball {:.0},{:.0} p1 {:.0} p2 {:.0} sparks {}",
            self.ball.0,
            self.ball.1,
            self.p1_y,
            self.p2_y,
            self.sparks.len()
        )
    }
}

/// The module entry point.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pong;

struct Nodes {
    canvas: NodeId,
    score: NodeId,
    ai: NodeId,
}

#[async_trait]
impl GameModule for Pong {
    async fn mount(
        &self,
        container: Container,
        caps: Capabilities,
    ) -> Result<Box<dyn MountHandle>, ModuleError> {
        container.clear();
        let vfx = caps.store.get_or("settings.vfx", true).await;

        let state = Arc::new(Mutex::new(PongState::new(vfx, StdRng::from_entropy())));
        let nodes = Nodes {
            canvas: container.append(Node::new("canvas", "160x100")),
            score: container.append(Node::new("score", "0 : 0")),
            ai: container.append(Node::new("button", "AI: on")),
        };

        let key_listener = {
            let state = Arc::clone(&state);
            let container = container.clone();
            let ai_node = nodes.ai;
            caps.keyboard.add_listener(move |event| {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.key(event);
                container.set_text(ai_node, state.ai_label());
            })
        };
        let pointer_listener = {
            let state = Arc::clone(&state);
            container.add_pointer_listener(move |event: PointerEvent| {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pointer(event.y);
            })
        };

        let frame_loop = {
            let state = Arc::clone(&state);
            let container = container.clone();
            let bus = caps.bus.clone();
            let Nodes { canvas, score, .. } = nodes;
            FrameLoop::start(caps.frames.clone(), move || {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(point) = state.step() {
                    debug!(?point, score = %state.score_text(), "pong point");
                    bus.emit(
                        "score",
                        json!({ "p1": state.p1_score, "p2": state.p2_score }),
                    );
                }
                container.set_text(canvas, state.frame_text());
                container.set_text(score, state.score_text());
            })
        };

        debug!(vfx, "pong mounted");
        Ok(Box::new(PongHandle {
            frame_loop,
            keyboard: caps.keyboard,
            key_listener,
            container,
            pointer_listener,
            nodes,
        }))
    }
}

struct PongHandle {
    frame_loop: FrameLoop,
    keyboard: deepfly_hub::Keyboard,
    key_listener: ListenerId,
    container: Container,
    pointer_listener: ListenerId,
    nodes: Nodes,
}

impl MountHandle for PongHandle {
    fn unmount(self: Box<Self>) -> Result<(), ModuleError> {
        self.frame_loop.stop();
        if !self.keyboard.remove_listener(self.key_listener) {
            warn!("pong key listener already removed");
        }
        self.container.remove_pointer_listener(self.pointer_listener);
        for id in [self.nodes.canvas, self.nodes.score, self.nodes.ai] {
            self.container.remove(id);
        }
        Ok(())
    }
}
