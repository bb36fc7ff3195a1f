use crate::game::{Board, Color, GameEngine, Move, WinnerChecker};

use super::heuristic;

/// Column ordering: center-first so alpha-beta meets strong moves early.
/// Both search variants expand children in this order, which also fixes how
/// ties are broken.
const MOVE_ORDER: [usize; 7] = [3, 2, 4, 1, 5, 0, 6];

/// Board snapshot plus the color to move. Plain value: every copy owns its
/// board, so searching never touches the live match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchState {
    board: Board,
    to_move: Color,
}

impl SearchState {
    pub fn new(board: Board, to_move: Color) -> Self {
        SearchState { board, to_move }
    }

    pub fn from_engine(engine: &GameEngine) -> Self {
        SearchState::new(*engine.board(), engine.turn())
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn to_move(&self) -> Color {
        self.to_move
    }

    /// Board full or a four-in-a-row already on it.
    pub fn is_terminal(&self) -> bool {
        self.board.is_full() || WinnerChecker::has_winner(&self.board)
    }

    /// State after `to_move` drops into `col`, or `None` if the column is full.
    fn play(&self, col: usize) -> Option<SearchState> {
        let mut board = self.board;
        board.add_piece(col, self.to_move).ok()?;
        Some(SearchState::new(board, self.to_move.other()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The searching side is to move.
    Max,
    Min,
}

impl NodeKind {
    fn flip(self) -> NodeKind {
        match self {
            NodeKind::Max => NodeKind::Min,
            NodeKind::Min => NodeKind::Max,
        }
    }
}

/// One position of the game tree. Built fresh on every search; children are
/// only generated when the node is actually explored.
#[derive(Debug, Clone)]
pub struct SearchNode {
    state: SearchState,
    kind: NodeKind,
    produced_by: Option<Move>,
    terminal: bool,
    score: i32,
}

impl SearchNode {
    /// Root of a search run for the side to move in `state`.
    pub fn root(state: SearchState) -> SearchNode {
        let ai = state.to_move();
        SearchNode::new(state, NodeKind::Max, None, ai)
    }

    fn new(state: SearchState, kind: NodeKind, produced_by: Option<Move>, ai: Color) -> SearchNode {
        SearchNode {
            terminal: state.is_terminal(),
            score: heuristic::evaluate(state.board(), ai),
            state,
            kind,
            produced_by,
        }
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn produced_by(&self) -> Option<Move> {
        self.produced_by
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Static score until searched, then the backed-up minimax value.
    pub fn score(&self) -> i32 {
        self.score
    }

    /// One child per open column, in [`MOVE_ORDER`].
    fn expand(&self, ai: Color) -> Vec<SearchNode> {
        let kind = self.kind.flip();
        MOVE_ORDER
            .iter()
            .filter_map(|&col| {
                let next = self.state.play(col)?;
                Some(SearchNode::new(next, kind, Some(Move::new(col)), ai))
            })
            .collect()
    }
}

/// Whether the shared recursion may abandon dominated branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pruning {
    Exhaustive,
    AlphaBeta,
}

/// Counters of one search run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes: u64,
    pub max_depth_reached: usize,
}

/// Minimax over [`SearchNode`]s. `alpha` is the best score MAX can already
/// force, `beta` the best MIN can; with [`Pruning::AlphaBeta`] a node stops
/// exploring children once `alpha >= beta`.
pub struct Searcher {
    ai: Color,
    pruning: Pruning,
    depth: usize,
    stats: SearchStats,
}

impl Searcher {
    pub fn new(ai: Color, pruning: Pruning, depth: usize) -> Self {
        Searcher {
            ai,
            pruning,
            depth,
            stats: SearchStats::default(),
        }
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Best move for the side to move in `state`; `None` when the state is
    /// terminal or the depth budget is zero.
    pub fn best_move(&mut self, state: SearchState) -> Option<Move> {
        debug_assert_eq!(state.to_move(), self.ai);
        let best = self.search(SearchNode::root(state), self.depth, i32::MIN, i32::MAX);
        best.produced_by()
    }

    /// Returns `node` itself when it is a leaf (terminal, depth exhausted or no
    /// open column), otherwise its best child carrying the backed-up score.
    pub fn search(&mut self, node: SearchNode, depth: usize, mut alpha: i32, mut beta: i32) -> SearchNode {
        self.stats.nodes += 1;
        let ply = self.depth.saturating_sub(depth);
        self.stats.max_depth_reached = self.stats.max_depth_reached.max(ply);

        if node.is_terminal() || depth == 0 {
            return node;
        }

        let kind = node.kind();
        let mut best: Option<SearchNode> = None;

        for child in node.expand(self.ai) {
            let mut candidate = child.clone();
            candidate.score = self.search(child, depth - 1, alpha, beta).score();

            let improves = match (&best, kind) {
                (None, _) => true,
                (Some(b), NodeKind::Max) => candidate.score > b.score,
                (Some(b), NodeKind::Min) => candidate.score < b.score,
            };
            if improves {
                best = Some(candidate);
            }

            if self.pruning == Pruning::AlphaBeta {
                if let Some(b) = &best {
                    match kind {
                        NodeKind::Max => alpha = alpha.max(b.score),
                        NodeKind::Min => beta = beta.min(b.score),
                    }
                }
                if alpha >= beta {
                    break;
                }
            }
        }

        // no open column: treat as a leaf
        best.unwrap_or(node)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::game::COLS;

    fn state_after(moves: &[usize]) -> SearchState {
        let mut engine = GameEngine::new();
        for &col in moves {
            engine.apply(Move::new(col)).unwrap();
        }
        SearchState::from_engine(&engine)
    }

    fn best(state: SearchState, pruning: Pruning, depth: usize) -> (Option<Move>, SearchStats) {
        let mut searcher = Searcher::new(state.to_move(), pruning, depth);
        let mv = searcher.best_move(state);
        (mv, searcher.stats())
    }

    #[test]
    fn takes_winning_move() {
        // red 0,1,2 on the bottom row, yellow stacked on top
        let state = state_after(&[0, 0, 1, 1, 2, 2]);
        for pruning in [Pruning::Exhaustive, Pruning::AlphaBeta] {
            let (mv, _) = best(state, pruning, 4);
            assert_eq!(mv, Some(Move::new(3)), "{pruning:?}");
        }
    }

    #[test]
    fn blocks_opponent_win() {
        // yellow holds 0,1,2 on the bottom row, red must answer in column 3
        let state = state_after(&[6, 0, 6, 1, 5, 2]);
        let (mv, _) = best(state, Pruning::AlphaBeta, 4);
        assert_eq!(mv, Some(Move::new(3)));
    }

    #[test]
    fn terminal_root_has_no_move() {
        let state = state_after(&[0, 0, 1, 1, 2, 2, 3]);
        assert!(state.is_terminal());
        let (mv, stats) = best(state, Pruning::AlphaBeta, 6);
        assert_eq!(mv, None);
        assert_eq!(stats.nodes, 1);
    }

    #[test]
    fn zero_depth_has_no_move() {
        let (mv, _) = best(state_after(&[]), Pruning::Exhaustive, 0);
        assert_eq!(mv, None);
    }

    #[test]
    fn search_does_not_touch_the_live_board() {
        let mut engine = GameEngine::new();
        engine.apply(Move::new(3)).unwrap();
        let before = engine;
        let _ = best(SearchState::from_engine(&engine), Pruning::Exhaustive, 3);
        assert_eq!(engine, before);
    }

    #[test]
    fn pruning_keeps_the_choice_and_visits_fewer_nodes() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..12 {
            let mut engine = GameEngine::new();
            let plies = rng.random_range(0..14);
            for _ in 0..plies {
                let open: Vec<usize> = engine.board().open_columns().collect();
                let col = open[rng.random_range(0..open.len())];
                engine.apply(Move::new(col)).unwrap();
                if engine.is_terminal() {
                    break;
                }
            }
            if engine.is_terminal() {
                continue;
            }
            let state = SearchState::from_engine(&engine);

            let (plain, plain_stats) = best(state, Pruning::Exhaustive, 4);
            let (pruned, pruned_stats) = best(state, Pruning::AlphaBeta, 4);
            assert_eq!(plain, pruned, "different choice on\n{}", engine.board());
            assert!(pruned_stats.nodes <= plain_stats.nodes);
        }
    }

    #[test]
    fn exhaustive_visits_every_node() {
        // empty board, depth 2: root + 7 + 49
        let (_, stats) = best(state_after(&[]), Pruning::Exhaustive, 2);
        assert_eq!(stats.nodes, 1 + COLS as u64 + (COLS * COLS) as u64);
    }
}
