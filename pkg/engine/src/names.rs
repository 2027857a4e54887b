//! Lease name and PIN generation.

use pkg_constants::lease::{NAME_ALLOCATION_ATTEMPTS, PIN_LENGTH};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tracing::debug;

use crate::error::LeaseError;

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brave", "brisk", "calm", "clever", "cosmic", "crimson", "daring", "eager",
    "fierce", "gentle", "golden", "grand", "hidden", "hollow", "icy", "jolly", "keen", "lively",
    "lucky", "mellow", "misty", "noble", "quiet", "rapid", "rusty", "silent", "silver", "sly",
    "steady", "stormy", "sunny", "swift", "tidy", "vivid", "wild", "witty", "young", "zesty",
];

const NOUNS: &[&str] = &[
    "badger", "beacon", "bison", "canyon", "comet", "condor", "coyote", "falcon", "ferret",
    "fjord", "gecko", "glacier", "harbor", "hawk", "heron", "ibex", "jackal", "lagoon", "lynx",
    "marmot", "meadow", "mesa", "moose", "narwhal", "ocelot", "orca", "otter", "panda", "pike",
    "quail", "raven", "reef", "salmon", "summit", "tapir", "tundra", "viper", "walrus", "yak",
    "zebra",
];

/// Source of candidate lease names.
pub trait NameGenerator: Send + Sync {
    fn candidate(&self) -> String;
}

/// Random `adjective-noun` names.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodenameGenerator;

impl NameGenerator for CodenameGenerator {
    fn candidate(&self) -> String {
        let mut rng = rand::rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("plain");
        let noun = NOUNS.choose(&mut rng).copied().unwrap_or("lease");
        format!("{}-{}", adjective, noun)
    }
}

/// Yields a fixed sequence of names, then repeats the last one.
#[derive(Debug)]
pub struct ScriptedNames {
    queue: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(names.into_iter().map(Into::into).collect()),
            last: Mutex::new("scripted".to_string()),
        }
    }
}

impl NameGenerator for ScriptedNames {
    fn candidate(&self) -> String {
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        let Ok(mut last) = self.last.lock() else {
            return next.unwrap_or_default();
        };
        if let Some(name) = next {
            *last = name;
        }
        last.clone()
    }
}

/// Picks a name not used by any live instance or cache record.
pub struct NameAllocator {
    generator: Box<dyn NameGenerator>,
    attempts: usize,
}

impl NameAllocator {
    pub fn new(generator: Box<dyn NameGenerator>) -> Self {
        Self {
            generator,
            attempts: NAME_ALLOCATION_ATTEMPTS,
        }
    }

    /// Try up to the attempt bound; a candidate colliding with either set is
    /// discarded.
    pub fn allocate(&self, live: &[String], cached: &[String]) -> Result<String, LeaseError> {
        let taken: HashSet<&str> = live
            .iter()
            .chain(cached.iter())
            .map(String::as_str)
            .collect();
        for attempt in 1..=self.attempts {
            let candidate = self.generator.candidate();
            if !candidate.is_empty() && !taken.contains(candidate.as_str()) {
                return Ok(candidate);
            }
            debug!(
                "Name candidate {} already taken (attempt {}/{})",
                candidate, attempt, self.attempts
            );
        }
        Err(LeaseError::NameExhausted {
            attempts: self.attempts,
        })
    }
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self::new(Box::new(CodenameGenerator))
    }
}

/// Numeric access PIN, uniformly random per digit.
pub fn generate_pin() -> String {
    let mut rng = rand::rng();
    (0..PIN_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
