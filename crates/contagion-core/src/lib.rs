//! Core simulation types for the contagion workspace.
//!
//! The engine models emotional contagion across a population of spatially
//! situated person agents, plus a singleton media channel that captures
//! extreme emotions and rebroadcasts an amplified signal to everyone. One
//! tick activates every actor once in a freshly randomized order, then
//! appends an aggregate metrics snapshot. Everything is single-threaded and
//! deterministic for a fixed RNG seed; presentation and configuration layers
//! are read-only consumers of the accessor surface.

use contagion_grid::{CellCoord, GridError, MultiGrid, Topology};
use ordered_float::OrderedFloat;
use rand::{
    Rng, SeedableRng,
    rngs::SmallRng,
    seq::{IndexedRandom, SliceRandom},
};
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, trace};

new_key_type! {
    /// Stable handle for person agents backed by a generational slot map.
    pub struct PersonId;
}

/// Inclusive lower bound of the emotion scale.
pub const EMOTION_MIN: f64 = -1.0;
/// Inclusive upper bound of the emotion scale.
pub const EMOTION_MAX: f64 = 1.0;
/// Emotion magnitude beyond which a person is eligible for media capture.
pub const HIGH_IMPACT_THRESHOLD: f64 = 0.8;
/// Fatigue never pushes reactivity below this floor.
pub const REACTIVITY_FLOOR: f64 = 0.1;
/// Capture memory capacity of the media channel.
pub const MEDIA_MEMORY_CAPACITY: usize = 5;

// One-decimal quantization of [-1, 1]: the fixed normalization constant for
// the diversity metric, never the population size.
const EMOTION_LEVELS: f64 = 20.0;

fn clamp_emotion(value: f64) -> f64 {
    value.clamp(EMOTION_MIN, EMOTION_MAX)
}

/// Monotonic tick counter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Tick(pub u64);

impl Tick {
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Behavioral archetype assigned to a person at spawn.
///
/// Variants differ only in the capability constants returned by
/// [`PersonVariant::profile`]; the contagion algorithm itself is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PersonVariant {
    #[default]
    Default,
    PassiveObserver,
    Influencer,
    Resistor,
}

impl PersonVariant {
    // Spawn-time categorical distribution over variants.
    const SPAWN_WEIGHTS: [(PersonVariant, f64); 4] = [
        (PersonVariant::Default, 0.5),
        (PersonVariant::PassiveObserver, 0.3),
        (PersonVariant::Influencer, 0.1),
        (PersonVariant::Resistor, 0.1),
    ];

    /// Draw a variant from the fixed spawn distribution.
    fn sample<R: Rng>(rng: &mut R) -> Self {
        let mut roll = rng.random::<f64>();
        for (variant, weight) in Self::SPAWN_WEIGHTS {
            if roll < weight {
                return variant;
            }
            roll -= weight;
        }
        PersonVariant::Default
    }

    /// Fixed capability constants for this variant.
    #[must_use]
    pub const fn profile(self) -> VariantProfile {
        match self {
            Self::Default => VariantProfile {
                influence_factor: 1.0,
                resistance_level: 0.0,
                media_susceptibility: 1.0,
            },
            Self::PassiveObserver => VariantProfile {
                influence_factor: 0.5,
                resistance_level: 0.0,
                media_susceptibility: 0.5,
            },
            Self::Influencer => VariantProfile {
                influence_factor: 1.5,
                resistance_level: 0.0,
                media_susceptibility: 1.5,
            },
            Self::Resistor => VariantProfile {
                influence_factor: 1.0,
                resistance_level: 0.7,
                media_susceptibility: 0.5,
            },
        }
    }

    /// Marker shape the presentation layer draws for this variant.
    #[must_use]
    pub const fn glyph(self) -> Glyph {
        match self {
            Self::Default | Self::PassiveObserver => Glyph::Circle,
            Self::Influencer => Glyph::Star,
            Self::Resistor => Glyph::Rect,
        }
    }
}

/// Capability constants consumed by the single contagion code path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantProfile {
    /// Multiplier on the pull toward the neighborhood mean.
    pub influence_factor: f64,
    /// Fraction of the updated emotion damped away after contagion.
    pub resistance_level: f64,
    /// Multiplier on received media broadcasts.
    pub media_susceptibility: f64,
}

/// Marker shape for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Glyph {
    Circle,
    Star,
    Rect,
}

/// Bounded FIFO of past emotion values; the oldest entry is evicted first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionMemory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl EmotionMemory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest when full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Most recently pushed value.
    #[must_use]
    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stored values, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}

/// Full per-person simulation state.
///
/// The capability fields are copied from the variant profile at spawn so the
/// contagion path never branches on the variant tag; tests (and future
/// scenario tooling) may override them per person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonState {
    pub position: CellCoord,
    pub variant: PersonVariant,
    /// Always within `[EMOTION_MIN, EMOTION_MAX]`.
    pub emotion: f64,
    pub influence_factor: f64,
    pub resistance_level: f64,
    pub media_susceptibility: f64,
    /// Disagreements below this magnitude produce no emotional change.
    pub tolerance_threshold: f64,
    /// Always at least [`REACTIVITY_FLOOR`]; non-increasing over a run.
    pub reactivity: f64,
    pub memory: EmotionMemory,
}

impl PersonState {
    fn spawn<R: Rng>(
        variant: PersonVariant,
        position: CellCoord,
        memory_capacity: usize,
        rng: &mut R,
    ) -> Self {
        let profile = variant.profile();
        Self {
            position,
            variant,
            emotion: 0.0,
            influence_factor: profile.influence_factor,
            resistance_level: profile.resistance_level,
            media_susceptibility: profile.media_susceptibility,
            tolerance_threshold: rng.random::<f64>(),
            reactivity: 1.0,
            memory: EmotionMemory::new(memory_capacity),
        }
    }

    /// Contagion toward the neighborhood mean, gated by tolerance.
    ///
    /// The gate is the core nonlinearity: small disagreements are ignored
    /// entirely, so clusters polarize instead of smoothly averaging out.
    pub fn interact(&mut self, neighbor_mean: f64) {
        let delta = neighbor_mean - self.emotion;
        if delta.abs() <= self.tolerance_threshold {
            return;
        }
        self.emotion += delta * self.influence_factor * self.reactivity;
        self.emotion -= self.emotion * self.resistance_level;
        self.emotion = clamp_emotion(self.emotion);
    }

    /// Record the current emotion in bounded memory.
    pub fn remember(&mut self) {
        self.memory.push(self.emotion);
    }

    /// Fatigue: reactivity decays geometrically toward the floor.
    pub fn cool_down(&mut self, fatigue_rate: f64) {
        self.reactivity = (self.reactivity * fatigue_rate).max(REACTIVITY_FLOOR);
    }

    /// Apply a broadcast value from the media channel.
    ///
    /// Only [`Simulation`] calls this during the media actor's activation;
    /// peer contagion goes through [`PersonState::interact`].
    pub fn receive_media_influence(&mut self, media_emotion: f64) {
        self.emotion = clamp_emotion(self.emotion + media_emotion * self.media_susceptibility);
    }

    /// Whether this person is eligible for media capture.
    #[must_use]
    pub fn is_high_impact(&self) -> bool {
        self.emotion.abs() > HIGH_IMPACT_THRESHOLD
    }

    /// Diverging render color: red for negative emotion, green for positive.
    #[must_use]
    pub fn color(&self) -> [f32; 3] {
        [
            (-self.emotion).max(0.0) as f32,
            self.emotion.max(0.0) as f32,
            0.0,
        ]
    }
}

/// Singleton channel that amplifies extreme emotions back at the population.
///
/// Not placed on the grid: the channel neither moves nor takes part in
/// neighbor interactions, it only observes and broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaChannel {
    memory: EmotionMemory,
    amplification_factor: f64,
}

impl MediaChannel {
    fn new(amplification_factor: f64) -> Self {
        Self {
            memory: EmotionMemory::new(MEDIA_MEMORY_CAPACITY),
            amplification_factor,
        }
    }

    /// Amplify and store a captured emotion, returning the stored value.
    ///
    /// Stored values are deliberately not clamped; clamping happens per
    /// recipient in [`PersonState::receive_media_influence`].
    fn capture(&mut self, raw_emotion: f64) -> f64 {
        let amplified = raw_emotion * self.amplification_factor;
        self.memory.push(amplified);
        amplified
    }

    /// Most recently captured value; `None` until the first capture.
    #[must_use]
    pub fn latest(&self) -> Option<f64> {
        self.memory.latest()
    }

    /// Captured values, oldest first.
    #[must_use]
    pub fn memory(&self) -> &EmotionMemory {
        &self.memory
    }

    #[must_use]
    pub const fn amplification_factor(&self) -> f64 {
        self.amplification_factor
    }
}

/// One entry in a tick's activation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actor {
    Person(PersonId),
    Media,
}

/// Draws a fresh uniformly random activation order each tick.
///
/// The media actor is shuffled in together with the person agents rather
/// than pinned last, matching the reference dynamics. Within-tick order is
/// part of the specified behavior: an actor activated earlier changes what a
/// later actor observes, and reproducibility tests rely on it.
#[derive(Debug, Clone, Copy, Default)]
struct Scheduler;

impl Scheduler {
    fn draw(&self, rng: &mut SmallRng, people: &SlotMap<PersonId, PersonState>) -> Vec<Actor> {
        let mut order: Vec<Actor> = Vec::with_capacity(people.len() + 1);
        order.extend(people.keys().map(Actor::Person));
        order.push(Actor::Media);
        order.shuffle(rng);
        order
    }
}

/// Aggregate statistics recorded after every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub tick: Tick,
    /// Distinct one-decimal-rounded emotions divided by the fixed level count.
    pub diversity: f64,
    /// Mean emotion over the whole population; 0 when empty.
    pub mean_emotion: f64,
    /// Mean emotion over Influencer-variant agents; 0 when none exist.
    pub influencer_mean: f64,
    pub positive_count: usize,
    pub negative_count: usize,
    /// Exact-zero emotions. After the first contagion update floating-point
    /// arithmetic rarely lands here again; the exact predicate is kept from
    /// the reference model.
    pub neutral_count: usize,
}

/// Append-only per-tick metrics series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsCollector {
    snapshots: Vec<MetricsSnapshot>,
}

impl MetricsCollector {
    fn collect(&mut self, tick: Tick, people: &SlotMap<PersonId, PersonState>) {
        let mut distinct: HashSet<OrderedFloat<f64>> = HashSet::new();
        let mut sum = 0.0;
        let mut influencer_sum = 0.0;
        let mut influencer_count = 0usize;
        let mut positive_count = 0usize;
        let mut negative_count = 0usize;
        let mut neutral_count = 0usize;

        for person in people.values() {
            distinct.insert(OrderedFloat((person.emotion * 10.0).round() / 10.0));
            sum += person.emotion;
            if person.variant == PersonVariant::Influencer {
                influencer_sum += person.emotion;
                influencer_count += 1;
            }
            if person.emotion > 0.0 {
                positive_count += 1;
            } else if person.emotion < 0.0 {
                negative_count += 1;
            } else {
                neutral_count += 1;
            }
        }

        let mean_emotion = if people.is_empty() {
            0.0
        } else {
            sum / people.len() as f64
        };
        let influencer_mean = if influencer_count == 0 {
            0.0
        } else {
            influencer_sum / influencer_count as f64
        };

        self.snapshots.push(MetricsSnapshot {
            tick,
            diversity: distinct.len() as f64 / EMOTION_LEVELS,
            mean_emotion,
            influencer_mean,
            positive_count,
            negative_count,
            neutral_count,
        });
    }

    /// All snapshots, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> &[MetricsSnapshot] {
        &self.snapshots
    }

    /// Snapshot recorded for `tick`, if the simulation has reached it.
    #[must_use]
    pub fn at(&self, tick: Tick) -> Option<&MetricsSnapshot> {
        let index = usize::try_from(tick.0.checked_sub(1)?).ok()?;
        self.snapshots.get(index)
    }
}

/// Errors raised while constructing or driving a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Bubbled up from the spatial grid.
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Static configuration for a contagion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Requested population before density scaling.
    pub population_count: usize,
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Fraction of the requested population actually placed, in (0, 1].
    pub density: f64,
    /// Multiplier applied to captured emotions before storage and broadcast.
    pub media_amplification_factor: f64,
    /// Per-tick decay applied to reactivity, in (0, 1].
    pub fatigue_rate: f64,
    /// Edge behavior of the grid.
    pub topology: Topology,
    /// Moore radius used when gathering interaction partners; the center
    /// cell is always included.
    pub interaction_radius: u32,
    /// Capacity of each person's emotion memory.
    pub memory_capacity: usize,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            population_count: 50,
            width: 20,
            height: 20,
            density: 0.8,
            media_amplification_factor: 1.0,
            fatigue_rate: 0.99,
            topology: Topology::Torus,
            interaction_radius: 1,
            memory_capacity: 5,
            rng_seed: None,
        }
    }
}

impl SimulationConfig {
    /// Number of agents actually placed: the requested count scaled by
    /// density, rounded down.
    #[must_use]
    pub fn effective_population(&self) -> usize {
        (self.population_count as f64 * self.density).floor() as usize
    }

    fn validate(&self) -> Result<(), SimulationError> {
        if self.width == 0 || self.height == 0 {
            return Err(SimulationError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        if self.population_count == 0 {
            return Err(SimulationError::InvalidConfig(
                "population_count must be non-zero",
            ));
        }
        if !(self.density > 0.0 && self.density <= 1.0) {
            return Err(SimulationError::InvalidConfig(
                "density must be within (0, 1]",
            ));
        }
        if !(self.media_amplification_factor > 0.0) {
            return Err(SimulationError::InvalidConfig(
                "media_amplification_factor must be positive",
            ));
        }
        if !(self.fatigue_rate > 0.0 && self.fatigue_rate <= 1.0) {
            return Err(SimulationError::InvalidConfig(
                "fatigue_rate must be within (0, 1]",
            ));
        }
        if self.interaction_radius == 0 {
            return Err(SimulationError::InvalidConfig(
                "interaction_radius must be non-zero",
            ));
        }
        if self.memory_capacity == 0 {
            return Err(SimulationError::InvalidConfig(
                "memory_capacity must be non-zero",
            ));
        }
        let cells = u64::from(self.width) * u64::from(self.height);
        if self.effective_population() as u64 > cells {
            return Err(SimulationError::InvalidConfig(
                "scaled population exceeds the capacity implied by density and grid area",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        }
    }
}

/// Aggregate simulation state; owns every component and the RNG.
pub struct Simulation {
    config: SimulationConfig,
    tick: Tick,
    rng: SmallRng,
    grid: MultiGrid<PersonId>,
    people: SlotMap<PersonId, PersonState>,
    media: MediaChannel,
    scheduler: Scheduler,
    metrics: MetricsCollector,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("person_count", &self.people.len())
            .finish()
    }
}

impl Simulation {
    /// Construct and populate a simulation from the supplied configuration.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let mut grid = MultiGrid::new(config.width, config.height, config.topology)?;
        let population = config.effective_population();
        let mut people = SlotMap::with_capacity_and_key(population);
        for _ in 0..population {
            let variant = PersonVariant::sample(&mut rng);
            let coord = CellCoord::new(
                rng.random_range(0..config.width),
                rng.random_range(0..config.height),
            );
            let person = PersonState::spawn(variant, coord, config.memory_capacity, &mut rng);
            let id = people.insert(person);
            grid.place(id, coord)?;
        }
        debug!(population, width = config.width, height = config.height, "simulation populated");
        Ok(Self {
            media: MediaChannel::new(config.media_amplification_factor),
            config,
            tick: Tick::zero(),
            rng,
            grid,
            people,
            scheduler: Scheduler,
            metrics: MetricsCollector::default(),
        })
    }

    /// Advance the simulation by one tick.
    ///
    /// Every person and the media channel activate once, in a fresh random
    /// order, then a metrics snapshot is appended. State is only observable
    /// between ticks.
    pub fn step(&mut self) {
        let order = self.scheduler.draw(&mut self.rng, &self.people);
        for actor in order {
            match actor {
                Actor::Person(id) => self.step_person(id),
                Actor::Media => self.step_media(),
            }
        }
        self.tick = self.tick.next();
        self.metrics.collect(self.tick, &self.people);
    }

    fn step_person(&mut self, id: PersonId) {
        self.move_person(id);
        self.interact_person(id);
        if let Some(person) = self.people.get_mut(id) {
            person.remember();
            person.cool_down(self.config.fatigue_rate);
        }
    }

    /// Uniform random move into the Moore neighborhood; staying put when the
    /// neighborhood is empty is normal, not an error.
    fn move_person(&mut self, id: PersonId) {
        let Some(position) = self.people.get(id).map(|person| person.position) else {
            return;
        };
        let candidates = self.grid.neighborhood(position, 1, false);
        let Some(&destination) = candidates.choose(&mut self.rng) else {
            return;
        };
        // Destinations come from `neighborhood`, which only yields valid
        // cells; a rejection here is an internal invariant violation.
        match self.grid.relocate(id, destination) {
            Ok(placed) => {
                if let Some(person) = self.people.get_mut(id) {
                    person.position = placed;
                }
            }
            Err(err) => {
                error!(%err, ?id, "grid rejected a neighborhood-sourced move");
            }
        }
    }

    fn interact_person(&mut self, id: PersonId) {
        let Some(position) = self.people.get(id).map(|person| person.position) else {
            return;
        };
        let neighbors = self
            .grid
            .occupants_in_neighborhood(position, self.config.interaction_radius);
        let mut sum = 0.0;
        let mut count = 0usize;
        for other in neighbors {
            if other == id {
                continue;
            }
            if let Some(state) = self.people.get(other) {
                sum += state.emotion;
                count += 1;
            }
        }
        if count == 0 {
            return;
        }
        if let Some(person) = self.people.get_mut(id) {
            person.interact(sum / count as f64);
        }
    }

    fn step_media(&mut self) {
        self.media_capture();
        self.media_broadcast();
    }

    /// Sample one high-impact person uniformly at random and store their
    /// amplified emotion. An empty high-impact set is normal control flow.
    fn media_capture(&mut self) {
        let high_impact: Vec<PersonId> = self
            .people
            .iter()
            .filter(|(_, person)| person.is_high_impact())
            .map(|(id, _)| id)
            .collect();
        let Some(&selected) = high_impact.choose(&mut self.rng) else {
            return;
        };
        if let Some(person) = self.people.get(selected) {
            let stored = self.media.capture(person.emotion);
            debug!(person = ?selected, stored, "media captured a high-impact emotion");
        }
    }

    /// Deliver the most recent captured value to the whole population; a
    /// no-op while the capture memory is empty.
    fn media_broadcast(&mut self) {
        let Some(media_emotion) = self.media.latest() else {
            return;
        };
        trace!(media_emotion, recipients = self.people.len(), "media broadcast");
        for person in self.people.values_mut() {
            person.receive_media_influence(media_emotion);
        }
    }

    /// Spawn an additional person at `coord`, returning its handle.
    pub fn spawn_person(
        &mut self,
        variant: PersonVariant,
        coord: CellCoord,
    ) -> Result<PersonId, SimulationError> {
        let person = PersonState::spawn(variant, coord, self.config.memory_capacity, &mut self.rng);
        let id = self.people.insert(person);
        match self.grid.place(id, coord) {
            Ok(placed) => {
                if let Some(person) = self.people.get_mut(id) {
                    person.position = placed;
                }
                Ok(id)
            }
            Err(err) => {
                self.people.remove(id);
                Err(err.into())
            }
        }
    }

    /// Returns an immutable reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Number of live person agents.
    #[must_use]
    pub fn person_count(&self) -> usize {
        self.people.len()
    }

    /// Read-only view of every person in stable handle order.
    pub fn people(&self) -> impl Iterator<Item = (PersonId, &PersonState)> + '_ {
        self.people.iter()
    }

    /// Borrow the state of a specific person.
    #[must_use]
    pub fn person(&self, id: PersonId) -> Option<&PersonState> {
        self.people.get(id)
    }

    /// Mutably borrow the state of a specific person.
    #[must_use]
    pub fn person_mut(&mut self, id: PersonId) -> Option<&mut PersonState> {
        self.people.get_mut(id)
    }

    /// Per-tick metrics series, indexable by tick number.
    #[must_use]
    pub fn metrics_history(&self) -> &[MetricsSnapshot] {
        self.metrics.snapshots()
    }

    /// The metrics collector itself, for tick-indexed lookups.
    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Read-only access to the media channel.
    #[must_use]
    pub fn media(&self) -> &MediaChannel {
        &self.media
    }

    /// Read-only access to the spatial grid.
    #[must_use]
    pub fn grid(&self) -> &MultiGrid<PersonId> {
        &self.grid
    }

    /// Borrow the simulation RNG mutably for deterministic sampling.
    #[must_use]
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SimulationConfig {
        SimulationConfig {
            rng_seed: Some(7),
            ..SimulationConfig::default()
        }
    }

    fn person_with(emotion: f64, variant: PersonVariant) -> PersonState {
        let profile = variant.profile();
        PersonState {
            position: CellCoord::new(0, 0),
            variant,
            emotion,
            influence_factor: profile.influence_factor,
            resistance_level: profile.resistance_level,
            media_susceptibility: profile.media_susceptibility,
            tolerance_threshold: 0.5,
            reactivity: 1.0,
            memory: EmotionMemory::new(5),
        }
    }

    #[test]
    fn memory_evicts_oldest_first() {
        let mut memory = EmotionMemory::new(5);
        for value in [0.1, 0.2, 0.3, 0.4, 0.5] {
            memory.push(value);
        }
        assert_eq!(memory.len(), 5);
        memory.push(0.6);
        assert_eq!(memory.len(), 5);
        let stored: Vec<f64> = memory.iter().collect();
        assert_eq!(stored, vec![0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(memory.latest(), Some(0.6));
    }

    #[test]
    fn tolerance_gates_small_disagreements() {
        let mut person = person_with(0.0, PersonVariant::Default);
        person.tolerance_threshold = 0.5;
        person.interact(0.3);
        assert_eq!(person.emotion, 0.0);
    }

    #[test]
    fn contagion_applies_full_influence() {
        let mut person = person_with(0.0, PersonVariant::Default);
        person.tolerance_threshold = 0.1;
        person.influence_factor = 1.0;
        person.resistance_level = 0.0;
        person.reactivity = 1.0;
        person.interact(0.6);
        assert_eq!(person.emotion, 0.6);
    }

    #[test]
    fn resistance_damps_updated_emotion() {
        let mut person = person_with(0.0, PersonVariant::Default);
        person.tolerance_threshold = 0.1;
        person.resistance_level = 0.5;
        person.interact(0.6);
        assert_eq!(person.emotion, 0.3);
    }

    #[test]
    fn reactivity_scales_contagion() {
        let mut person = person_with(0.0, PersonVariant::Default);
        person.tolerance_threshold = 0.1;
        person.reactivity = 0.5;
        person.interact(0.6);
        assert_eq!(person.emotion, 0.3);
    }

    #[test]
    fn contagion_clamps_to_bounds() {
        let mut person = person_with(0.9, PersonVariant::Influencer);
        person.tolerance_threshold = 0.0;
        person.interact(1.0);
        assert!(person.emotion <= EMOTION_MAX);
        let mut person = person_with(-0.9, PersonVariant::Influencer);
        person.tolerance_threshold = 0.0;
        person.interact(-1.0);
        assert!(person.emotion >= EMOTION_MIN);
    }

    #[test]
    fn cool_down_floors_at_minimum_reactivity() {
        let mut person = person_with(0.0, PersonVariant::Default);
        for _ in 0..2_000 {
            person.cool_down(0.99);
        }
        assert_eq!(person.reactivity, REACTIVITY_FLOOR);
    }

    #[test]
    fn media_influence_scales_with_susceptibility_and_clamps() {
        let mut person = person_with(0.2, PersonVariant::Resistor);
        person.receive_media_influence(0.4);
        assert!((person.emotion - 0.4).abs() < 1e-12);

        let mut person = person_with(0.9, PersonVariant::Default);
        person.receive_media_influence(1.8);
        assert_eq!(person.emotion, EMOTION_MAX);
    }

    #[test]
    fn variant_profiles_match_reference_constants() {
        let default = PersonVariant::Default.profile();
        assert_eq!(default.influence_factor, 1.0);
        assert_eq!(default.resistance_level, 0.0);
        assert_eq!(default.media_susceptibility, 1.0);

        let observer = PersonVariant::PassiveObserver.profile();
        assert_eq!(observer.influence_factor, 0.5);
        assert_eq!(observer.media_susceptibility, 0.5);

        let influencer = PersonVariant::Influencer.profile();
        assert_eq!(influencer.influence_factor, 1.5);
        assert_eq!(influencer.media_susceptibility, 1.5);

        let resistor = PersonVariant::Resistor.profile();
        assert_eq!(resistor.resistance_level, 0.7);
        assert_eq!(resistor.media_susceptibility, 0.5);
    }

    #[test]
    fn variant_glyphs_for_rendering() {
        assert_eq!(PersonVariant::Default.glyph(), Glyph::Circle);
        assert_eq!(PersonVariant::PassiveObserver.glyph(), Glyph::Circle);
        assert_eq!(PersonVariant::Influencer.glyph(), Glyph::Star);
        assert_eq!(PersonVariant::Resistor.glyph(), Glyph::Rect);
    }

    #[test]
    fn emotion_color_is_diverging() {
        let positive = person_with(0.5, PersonVariant::Default).color();
        assert_eq!(positive, [0.0, 0.5, 0.0]);
        let negative = person_with(-0.25, PersonVariant::Default).color();
        assert_eq!(negative, [0.25, 0.0, 0.0]);
    }

    #[test]
    fn diversity_counts_distinct_rounded_levels() {
        let mut people: SlotMap<PersonId, PersonState> = SlotMap::with_key();
        for emotion in [0.05, 0.06, -0.2, 0.2] {
            people.insert(person_with(emotion, PersonVariant::Default));
        }
        let mut collector = MetricsCollector::default();
        collector.collect(Tick(1), &people);
        let snapshot = &collector.snapshots()[0];
        // 0.05 and 0.06 both round to 0.1, leaving three distinct levels.
        assert!((snapshot.diversity - 3.0 / 20.0).abs() < 1e-12);
    }

    #[test]
    fn metrics_on_empty_population_are_zero() {
        let people: SlotMap<PersonId, PersonState> = SlotMap::with_key();
        let mut collector = MetricsCollector::default();
        collector.collect(Tick(1), &people);
        let snapshot = &collector.snapshots()[0];
        assert_eq!(snapshot.mean_emotion, 0.0);
        assert_eq!(snapshot.influencer_mean, 0.0);
        assert_eq!(snapshot.diversity, 0.0);
        assert_eq!(snapshot.neutral_count, 0);
    }

    #[test]
    fn metrics_counts_and_means() {
        let mut people: SlotMap<PersonId, PersonState> = SlotMap::with_key();
        people.insert(person_with(0.4, PersonVariant::Default));
        people.insert(person_with(-0.4, PersonVariant::Resistor));
        people.insert(person_with(0.0, PersonVariant::PassiveObserver));
        people.insert(person_with(0.6, PersonVariant::Influencer));
        people.insert(person_with(-0.2, PersonVariant::Influencer));

        let mut collector = MetricsCollector::default();
        collector.collect(Tick(1), &people);
        let snapshot = &collector.snapshots()[0];
        assert_eq!(snapshot.positive_count, 2);
        assert_eq!(snapshot.negative_count, 2);
        assert_eq!(snapshot.neutral_count, 1);
        assert!((snapshot.mean_emotion - 0.08).abs() < 1e-12);
        assert!((snapshot.influencer_mean - 0.2).abs() < 1e-12);
    }

    #[test]
    fn metrics_lookup_by_tick() {
        let people: SlotMap<PersonId, PersonState> = SlotMap::with_key();
        let mut collector = MetricsCollector::default();
        collector.collect(Tick(1), &people);
        collector.collect(Tick(2), &people);
        assert_eq!(collector.at(Tick(2)).map(|s| s.tick), Some(Tick(2)));
        assert!(collector.at(Tick(0)).is_none());
        assert!(collector.at(Tick(3)).is_none());
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let cases = [
            SimulationConfig {
                width: 0,
                ..test_config()
            },
            SimulationConfig {
                population_count: 0,
                ..test_config()
            },
            SimulationConfig {
                density: 0.0,
                ..test_config()
            },
            SimulationConfig {
                density: 1.5,
                ..test_config()
            },
            SimulationConfig {
                media_amplification_factor: 0.0,
                ..test_config()
            },
            SimulationConfig {
                fatigue_rate: 0.0,
                ..test_config()
            },
            SimulationConfig {
                fatigue_rate: 1.01,
                ..test_config()
            },
            SimulationConfig {
                interaction_radius: 0,
                ..test_config()
            },
            SimulationConfig {
                memory_capacity: 0,
                ..test_config()
            },
            SimulationConfig {
                population_count: 1_000,
                density: 1.0,
                width: 4,
                height: 4,
                ..test_config()
            },
        ];
        for config in cases {
            let err = Simulation::new(config).unwrap_err();
            assert!(matches!(err, SimulationError::InvalidConfig(_)));
        }
    }

    #[test]
    fn construction_scales_population_by_density() {
        let simulation = Simulation::new(test_config()).expect("simulation");
        // 50 requested at density 0.8.
        assert_eq!(simulation.person_count(), 40);
        assert_eq!(simulation.grid().occupant_count(), 40);
        for (id, person) in simulation.people() {
            assert_eq!(person.emotion, 0.0);
            assert_eq!(person.reactivity, 1.0);
            assert!((0.0..1.0).contains(&person.tolerance_threshold));
            assert_eq!(simulation.grid().position_of(id), Some(person.position));
        }
    }

    #[test]
    fn spawn_distribution_produces_every_variant() {
        let config = SimulationConfig {
            population_count: 300,
            density: 1.0,
            ..test_config()
        };
        let simulation = Simulation::new(config).expect("simulation");
        for variant in [
            PersonVariant::Default,
            PersonVariant::PassiveObserver,
            PersonVariant::Influencer,
            PersonVariant::Resistor,
        ] {
            assert!(
                simulation.people().any(|(_, p)| p.variant == variant),
                "expected at least one {variant:?}"
            );
        }
    }

    #[test]
    fn capture_requires_strictly_high_impact() {
        let mut simulation = Simulation::new(SimulationConfig {
            population_count: 1,
            density: 1.0,
            ..test_config()
        })
        .expect("simulation");
        let id = simulation
            .spawn_person(PersonVariant::Default, CellCoord::new(3, 3))
            .expect("spawn");
        simulation.person_mut(id).expect("person").emotion = HIGH_IMPACT_THRESHOLD;
        simulation.media_capture();
        assert!(simulation.media().latest().is_none());

        simulation.person_mut(id).expect("person").emotion = 0.9;
        simulation.media_capture();
        assert_eq!(simulation.media().latest(), Some(0.9));
    }

    #[test]
    fn capture_amplifies_before_storage() {
        let mut simulation = Simulation::new(SimulationConfig {
            population_count: 1,
            density: 1.0,
            media_amplification_factor: 2.0,
            ..test_config()
        })
        .expect("simulation");
        let id = simulation
            .spawn_person(PersonVariant::Default, CellCoord::new(0, 0))
            .expect("spawn");
        simulation.person_mut(id).expect("person").emotion = 0.9;
        simulation.media_capture();
        // Stored values are not clamped; recipients clamp on receipt.
        assert_eq!(simulation.media().latest(), Some(1.8));
    }

    #[test]
    fn media_memory_respects_capacity() {
        let mut simulation = Simulation::new(SimulationConfig {
            population_count: 1,
            density: 1.0,
            ..test_config()
        })
        .expect("simulation");
        let id = simulation
            .spawn_person(PersonVariant::Default, CellCoord::new(0, 0))
            .expect("spawn");
        simulation.person_mut(id).expect("person").emotion = 0.9;
        for _ in 0..8 {
            simulation.media_capture();
        }
        assert_eq!(simulation.media().memory().len(), MEDIA_MEMORY_CAPACITY);
        assert_eq!(
            simulation.media().memory().capacity(),
            MEDIA_MEMORY_CAPACITY
        );
    }

    #[test]
    fn broadcast_with_empty_memory_changes_nothing() {
        let mut simulation = Simulation::new(test_config()).expect("simulation");
        let ids: Vec<PersonId> = simulation.people().map(|(id, _)| id).collect();
        for (index, id) in ids.iter().enumerate() {
            simulation.person_mut(*id).expect("person").emotion = index as f64 * 0.01;
        }
        let before: Vec<f64> = simulation.people().map(|(_, p)| p.emotion).collect();
        simulation.media_broadcast();
        let after: Vec<f64> = simulation.people().map(|(_, p)| p.emotion).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn broadcast_reaches_every_person() {
        let mut simulation = Simulation::new(SimulationConfig {
            population_count: 1,
            density: 1.0,
            ..test_config()
        })
        .expect("simulation");
        let source = simulation
            .spawn_person(PersonVariant::Default, CellCoord::new(0, 0))
            .expect("spawn");
        let listener = simulation
            .spawn_person(PersonVariant::Resistor, CellCoord::new(5, 5))
            .expect("spawn");
        simulation.person_mut(source).expect("person").emotion = 0.9;
        simulation.step_media();
        // Resistor susceptibility is 0.5: 0.9 broadcast lands as 0.45.
        let received = simulation.person(listener).expect("person").emotion;
        assert!((received - 0.45).abs() < 1e-12);
    }

    #[test]
    fn step_advances_tick_and_appends_metrics() {
        let mut simulation = Simulation::new(test_config()).expect("simulation");
        assert_eq!(simulation.tick(), Tick::zero());
        simulation.step();
        simulation.step();
        assert_eq!(simulation.tick(), Tick(2));
        assert_eq!(simulation.metrics_history().len(), 2);
        assert_eq!(simulation.metrics_history()[1].tick, Tick(2));
        assert_eq!(simulation.metrics().at(Tick(1)).map(|s| s.tick), Some(Tick(1)));
    }

    #[test]
    fn grid_occupancy_stays_consistent_across_steps() {
        let mut simulation = Simulation::new(test_config()).expect("simulation");
        for _ in 0..10 {
            simulation.step();
        }
        assert_eq!(
            simulation.grid().occupant_count(),
            simulation.person_count()
        );
        for (id, person) in simulation.people() {
            assert_eq!(simulation.grid().position_of(id), Some(person.position));
        }
    }
}
