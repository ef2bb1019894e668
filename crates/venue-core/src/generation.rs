// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Call generations for cancelling stale pagination

use parking_lot::Mutex;
use serde::Serialize;

/// Handle of one nearby search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Generation(usize);

impl Generation {
    /// Position in the generation array
    pub fn index(self) -> usize {
        self.0
    }
}

/// One flag per search ever started; only the newest is current
#[derive(Debug, Default)]
pub struct CallGenerations {
    flags: Mutex<Vec<bool>>,
}

impl CallGenerations {
    /// No generation started yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a generation, superseding all earlier ones
    pub fn begin(&self) -> Generation {
        let mut flags = self.flags.lock();
        flags.iter_mut().for_each(|flag| *flag = false);
        flags.push(true);
        Generation(flags.len() - 1)
    }

    /// Whether `generation` has not been superseded
    pub fn is_current(&self, generation: Generation) -> bool {
        self.flags
            .lock()
            .get(generation.0)
            .copied()
            .unwrap_or(false)
    }

    /// Supersede every generation without starting a new one
    pub fn cancel_all(&self) {
        self.flags.lock().iter_mut().for_each(|flag| *flag = false);
    }
}
