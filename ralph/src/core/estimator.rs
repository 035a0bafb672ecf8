//! Heuristic effort sizing. Pure: same `(type, body length, table)` in, same estimate out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::Complexity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effort {
    pub steps: u32,
    pub minutes: u32,
}

/// Lookup table and body-length multipliers, supplied through configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorTable {
    pub long_body_chars: usize,
    pub very_long_body_chars: usize,
    pub long_multiplier: f64,
    pub very_long_multiplier: f64,
    /// Used for task types missing from `types`.
    pub default: Effort,
    pub types: BTreeMap<String, Effort>,
}

impl Default for EstimatorTable {
    fn default() -> Self {
        let types = [
            ("email", 2, 5),
            ("whatsapp", 2, 5),
            ("file_drop", 3, 10),
            ("twitter_post", 3, 10),
            ("linkedin_post", 4, 15),
            ("facebook_post", 4, 15),
            ("instagram_post", 4, 15),
            ("invoice", 5, 20),
            ("accounting", 5, 30),
        ]
        .into_iter()
        .map(|(name, steps, minutes)| (name.to_string(), Effort { steps, minutes }))
        .collect();
        Self {
            long_body_chars: 1000,
            very_long_body_chars: 2000,
            long_multiplier: 1.5,
            very_long_multiplier: 2.0,
            default: Effort {
                steps: 3,
                minutes: 10,
            },
            types,
        }
    }
}

impl EstimatorTable {
    pub fn validate(&self) -> Result<(), String> {
        if self.long_body_chars > self.very_long_body_chars {
            return Err("estimator.long_body_chars must be <= very_long_body_chars".to_string());
        }
        if !(self.long_multiplier >= 1.0 && self.very_long_multiplier >= 1.0) {
            return Err("estimator multipliers must be >= 1.0".to_string());
        }
        Ok(())
    }

    fn base_for(&self, task_type: &str) -> Effort {
        self.types
            .get(&task_type.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default)
    }

    fn multiplier_for(&self, body_chars: usize) -> f64 {
        if body_chars > self.very_long_body_chars {
            self.very_long_multiplier
        } else if body_chars > self.long_body_chars {
            self.long_multiplier
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub task_type: String,
    pub estimated_steps: u32,
    pub estimated_minutes: u32,
    pub complexity: Complexity,
    pub body_length: usize,
    pub multiplier: f64,
}

/// Size a task from its type and body length (in characters).
pub fn estimate(table: &EstimatorTable, task_type: &str, body_chars: usize) -> Estimate {
    let base = table.base_for(task_type);
    let multiplier = table.multiplier_for(body_chars);
    let steps = scale(base.steps, multiplier);
    let minutes = scale(base.minutes, multiplier);
    Estimate {
        task_type: task_type.to_string(),
        estimated_steps: steps,
        estimated_minutes: minutes,
        complexity: classify(steps),
        body_length: body_chars,
        multiplier,
    }
}

pub fn classify(steps: u32) -> Complexity {
    match steps {
        0..=3 => Complexity::Low,
        4..=5 => Complexity::Medium,
        _ => Complexity::High,
    }
}

fn scale(value: u32, multiplier: f64) -> u32 {
    (f64::from(value) * multiplier).ceil() as u32
}
