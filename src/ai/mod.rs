//! Computer opponents.
//!
//! Every strategy answers the same question, "which column for the side to
//! move in this [`SearchState`]?", and is picked through the [`Strategy`]
//! variant rather than a type hierarchy. The two minimax flavours share one
//! recursion ([`Searcher`]) parameterised by a [`Pruning`] policy, so for an
//! identical state and depth they always choose the same column.

pub mod heuristic;
mod random;
mod search;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::configuration::Configuration;
use crate::game::Move;

pub use random::RandomChoice;
pub use search::{NodeKind, Pruning, SearchNode, SearchState, SearchStats, Searcher};

/// Opponent requested by a single-player client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AiKind {
    Random,
    Minimax,
    MinimaxAlphaBeta,
}

/// A move-selection strategy for a computer seat.
#[derive(Debug)]
pub enum Strategy {
    Random(RandomChoice),
    Minimax { depth: usize },
    AlphaBeta { depth: usize },
}

impl Strategy {
    /// Strategy for `kind`, with search depths taken from `config`.
    pub fn from_kind(kind: AiKind, config: &Configuration) -> Strategy {
        match kind {
            AiKind::Random => Strategy::Random(RandomChoice::new()),
            AiKind::Minimax => Strategy::Minimax {
                depth: config.minimax_depth,
            },
            AiKind::MinimaxAlphaBeta => Strategy::AlphaBeta {
                depth: config.alpha_beta_depth,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Random(_) => "random",
            Strategy::Minimax { .. } => "minimax",
            Strategy::AlphaBeta { .. } => "minimax-alpha-beta",
        }
    }

    /// Column to play, `None` if the state offers no move.
    pub fn next_move(&mut self, state: &SearchState) -> Option<Move> {
        self.next_move_with_stats(state).0
    }

    pub fn next_move_with_stats(&mut self, state: &SearchState) -> (Option<Move>, SearchStats) {
        let (pruning, depth) = match self {
            Strategy::Random(random) => {
                let mv = if state.is_terminal() {
                    None
                } else {
                    random.choose(state.board())
                };
                return (mv, SearchStats::default());
            }
            Strategy::Minimax { depth } => (Pruning::Exhaustive, *depth),
            Strategy::AlphaBeta { depth } => (Pruning::AlphaBeta, *depth),
        };

        let mut searcher = Searcher::new(state.to_move(), pruning, depth);
        let mv = searcher.best_move(*state);
        let stats = searcher.stats();
        debug!(strategy = self.name(), ?mv, nodes = stats.nodes, "search done");
        (mv, stats)
    }
}
