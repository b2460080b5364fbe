use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Rotation {
    Random,
    RoundRobin,
}

/// User-Agent strings handed out one per request.
#[derive(Debug)]
pub struct UserAgentPool {
    agents: Vec<String>,
    rotation: Rotation,
    cursor: AtomicUsize,
}

impl UserAgentPool {
    /// An empty list falls back to [`DEFAULT_USER_AGENTS`].
    pub fn new(agents: Vec<String>, rotation: Rotation) -> Self {
        let agents = if agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect()
        } else {
            agents
        };

        Self {
            agents,
            rotation,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn next(&self) -> &str {
        match self.rotation {
            Rotation::RoundRobin => {
                let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.agents.len();
                &self.agents[i]
            }
            Rotation::Random => self
                .agents
                .choose(&mut rand::thread_rng())
                .map(String::as_str)
                .unwrap_or(DEFAULT_USER_AGENTS[0]),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self::new(Vec::new(), Rotation::Random)
    }
}
