use rand::{seq::SliceRandom, Rng};
use thiserror::Error;

pub const DEFAULT_TRAP_PROBABILITY: f64 = 0.2;

pub const DEFAULT_TRAP_CATALOG: [&str; 5] = [
    "The capital of France is Berlin.",
    "2 + 2 equals 5.",
    "Water boils at 50 degrees Celsius.",
    "The sun revolves around the Earth.",
    "Python was created in 2010.",
];

#[derive(Debug, Error, PartialEq)]
pub enum TrapError {
    #[error("Trap catalog must contain at least one statement")]
    EmptyCatalog,
    #[error("Trap probability {0} is outside [0, 1]")]
    Probability(f64),
}

/// What the user gets to see for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub ai_message: String,
    pub is_trap: bool,
}

/// Plausible-but-false statements. Never empty.
#[derive(Debug, Clone)]
pub struct TrapCatalog {
    entries: Vec<String>,
}

impl TrapCatalog {
    pub fn new<I, S>(entries: I) -> Result<Self, TrapError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<String> = entries
            .into_iter()
            .map(Into::into)
            .filter(|e: &String| !e.trim().is_empty())
            .collect();

        if entries.is_empty() {
            return Err(TrapError::EmptyCatalog);
        }
        Ok(Self { entries })
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.iter().any(|e| e == text)
    }

    /// Uniform pick.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.entries.choose(rng).map_or(DEFAULT_TRAP_CATALOG[0], String::as_str)
    }

    /// Maps a selector in `[0, 1)` onto an entry with equal weight per entry.
    fn pick(&self, selector: f64) -> &str {
        let idx = (selector * self.entries.len() as f64) as usize;
        &self.entries[idx.min(self.entries.len() - 1)]
    }
}

impl Default for TrapCatalog {
    fn default() -> Self {
        Self {
            entries: DEFAULT_TRAP_CATALOG.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Content-blind gate that swaps the draft answer for a catalog falsehood with
/// fixed probability.
#[derive(Debug, Clone)]
pub struct TrapGate {
    probability: f64,
    catalog: TrapCatalog,
}

impl TrapGate {
    pub fn new(probability: f64, catalog: TrapCatalog) -> Result<Self, TrapError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(TrapError::Probability(probability));
        }
        Ok(Self { probability, catalog })
    }

    pub fn catalog(&self) -> &TrapCatalog {
        &self.catalog
    }

    /// `draw` and `selector` are both expected in `[0, 1)`.
    pub fn decide(&self, draft: String, draw: f64, selector: f64) -> TurnOutcome {
        if draw < self.probability {
            TurnOutcome {
                ai_message: self.catalog.pick(selector).to_string(),
                is_trap: true,
            }
        } else {
            TurnOutcome { ai_message: draft, is_trap: false }
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, draft: String, rng: &mut R) -> TurnOutcome {
        if rng.gen::<f64>() < self.probability {
            TurnOutcome {
                ai_message: self.catalog.choose(rng).to_string(),
                is_trap: true,
            }
        } else {
            TurnOutcome { ai_message: draft, is_trap: false }
        }
    }
}

impl Default for TrapGate {
    fn default() -> Self {
        Self {
            probability: DEFAULT_TRAP_PROBABILITY,
            catalog: TrapCatalog::default(),
        }
    }
}
