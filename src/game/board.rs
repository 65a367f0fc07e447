use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::generator::{Cell, Grid, Operation};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Operation,
    Result,
}

impl CardKind {
    fn prefix(self) -> &'static str {
        match self {
            CardKind::Operation => "op",
            CardKind::Result => "re",
        }
    }
}

/// 卡牌标识，显示为 `card-op-1-2` / `card-re-0-0`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardRef {
    pub kind: CardKind,
    pub row: usize,
    pub col: usize,
}

impl CardRef {
    pub fn operation(row: usize, col: usize) -> Self {
        Self {
            kind: CardKind::Operation,
            row,
            col,
        }
    }

    pub fn result(row: usize, col: usize) -> Self {
        Self {
            kind: CardKind::Result,
            row,
            col,
        }
    }

    pub fn is_operation(&self) -> bool {
        self.kind == CardKind::Operation
    }
}

impl fmt::Display for CardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "card-{}-{}-{}", self.kind.prefix(), self.row, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed card id `{0}`")]
pub struct CardRefParseError(pub String);

impl FromStr for CardRef {
    type Err = CardRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CardRefParseError(s.to_string());
        let mut parts = s.trim().split('-');
        if parts.next() != Some("card") {
            return Err(malformed());
        }
        let kind = match parts.next() {
            Some("op") => CardKind::Operation,
            Some("re") => CardKind::Result,
            _ => return Err(malformed()),
        };
        let row = parts
            .next()
            .and_then(|value| value.parse().ok())
            .ok_or_else(malformed)?;
        let col = parts
            .next()
            .and_then(|value| value.parse().ok())
            .ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(Self { kind, row, col })
    }
}

/// 翻开一张牌时玩家得到的信息。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealedFact {
    pub card: CardRef,
    pub display_text: String,
    pub result: i32,
    pub is_operation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum BoardError {
    #[error("result layout is not a permutation of the grid cells")]
    NotAPermutation,
}

/// 打乱后的结果位置及其来源格子的下标。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultSlot {
    pub value: i32,
    pub origin: usize,
}

/// 结果牌布局，是所有格子结果的一个排列。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultLayout {
    slots: Vec<ResultSlot>,
}

impl ResultLayout {
    pub fn shuffled<R: Rng + ?Sized>(grid: &Grid, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..grid.len()).collect();
        order.shuffle(rng);
        Self::from_order(grid, &order)
    }

    /// 把第 `order[i]` 个格子的结果放到位置 `i`，`order` 必须是格子下标的排列。
    pub fn from_permutation(grid: &Grid, order: &[usize]) -> Result<Self, BoardError> {
        let mut seen = vec![false; grid.len()];
        if order.len() != grid.len() {
            return Err(BoardError::NotAPermutation);
        }
        for &index in order {
            match seen.get_mut(index) {
                Some(flag) if !*flag => *flag = true,
                _ => return Err(BoardError::NotAPermutation),
            }
        }
        Ok(Self::from_order(grid, order))
    }

    fn from_order(grid: &Grid, order: &[usize]) -> Self {
        let slots = order
            .iter()
            .filter_map(|&origin| {
                grid.cell(origin).map(|cell| ResultSlot {
                    value: cell.result,
                    origin,
                })
            })
            .collect();
        Self { slots }
    }

    pub fn slot(&self, index: usize) -> Option<&ResultSlot> {
        self.slots.get(index)
    }

    pub fn values(&self) -> impl Iterator<Item = i32> + '_ {
        self.slots.iter().map(|slot| slot.value)
    }
}

/// 题目网格及打乱后的结果布局，构建后不可变。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Board {
    grid: Grid,
    layout: ResultLayout,
}

impl Board {
    pub fn from_grid(grid: Grid) -> Self {
        let mut rng = rand::thread_rng();
        Self::from_grid_with_rng(grid, &mut rng)
    }

    pub fn from_grid_with_rng<R: Rng + ?Sized>(grid: Grid, rng: &mut R) -> Self {
        let layout = ResultLayout::shuffled(&grid, rng);
        Self { grid, layout }
    }

    pub fn with_layout(grid: Grid, order: &[usize]) -> Result<Self, BoardError> {
        let layout = ResultLayout::from_permutation(&grid, order)?;
        Ok(Self { grid, layout })
    }

    pub fn symbol_for(operation: Operation) -> &'static str {
        operation.symbol()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn layout(&self) -> &ResultLayout {
        &self.layout
    }

    pub fn rows(&self) -> usize {
        self.grid.rows()
    }

    pub fn cols(&self) -> usize {
        self.grid.cols()
    }

    pub fn total_pairs(&self) -> usize {
        self.grid.len()
    }

    pub fn contains(&self, card: &CardRef) -> bool {
        self.grid.index_of(card.row, card.col).is_some()
    }

    pub fn operation_card(&self, row: usize, col: usize) -> Option<&Cell> {
        self.grid.get(row, col)
    }

    pub fn result_card(&self, row: usize, col: usize) -> Option<i32> {
        self.result_slot(row, col).map(|slot| slot.value)
    }

    /// 按行优先顺序找到第一个结果等于该位置数值的格子。
    pub fn resolve_result_card(&self, row: usize, col: usize) -> Option<&Cell> {
        let value = self.result_card(row, col)?;
        self.grid.cells().iter().find(|cell| cell.result == value)
    }

    /// 洗牌时把结果放到该位置的来源格子。
    pub fn result_origin(&self, row: usize, col: usize) -> Option<&Cell> {
        let slot = self.result_slot(row, col)?;
        self.grid.cell(slot.origin)
    }

    pub fn result_value(&self, card: &CardRef) -> Option<i32> {
        match card.kind {
            CardKind::Operation => self.operation_card(card.row, card.col).map(|cell| cell.result),
            CardKind::Result => self.result_card(card.row, card.col),
        }
    }

    pub fn display_text(&self, card: &CardRef) -> Option<String> {
        match card.kind {
            CardKind::Operation => self
                .operation_card(card.row, card.col)
                .map(Cell::display_text),
            CardKind::Result => self
                .result_card(card.row, card.col)
                .map(|value| value.to_string()),
        }
    }

    /// 牌面颜色所对应的运算。
    pub fn tint(&self, card: &CardRef) -> Option<Operation> {
        let cell = match card.kind {
            CardKind::Operation => self.operation_card(card.row, card.col),
            CardKind::Result => self.result_origin(card.row, card.col),
        };
        cell.map(|cell| cell.operation)
    }

    pub fn reveal(&self, card: &CardRef) -> Option<RevealedFact> {
        Some(RevealedFact {
            card: *card,
            display_text: self.display_text(card)?,
            result: self.result_value(card)?,
            is_operation: card.is_operation(),
        })
    }

    pub fn cards(&self, kind: CardKind) -> impl Iterator<Item = CardRef> + '_ {
        let cols = self.cols();
        (0..self.grid.len()).map(move |index| CardRef {
            kind,
            row: index / cols,
            col: index % cols,
        })
    }

    fn result_slot(&self, row: usize, col: usize) -> Option<&ResultSlot> {
        self.grid
            .index_of(row, col)
            .and_then(|index| self.layout.slot(index))
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows() {
            let line: Vec<String> = (0..self.cols())
                .filter_map(|col| self.operation_card(row, col))
                .map(|cell| {
                    format!(
                        "{:>3} {} {:>3} = {:>3}",
                        cell.operand1,
                        cell.operation.symbol(),
                        cell.operand2,
                        cell.result
                    )
                })
                .collect();
            writeln!(f, "{}", line.join("\t"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::generator::PuzzleGenerator;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn sorted(values: impl Iterator<Item = i32>) -> Vec<i32> {
        let mut values: Vec<i32> = values.collect();
        values.sort_unstable();
        values
    }

    #[test]
    fn shuffled_layout_is_a_permutation_of_results() {
        for seed in 0..25 {
            let grid = PuzzleGenerator::with_seed(seed)
                .generate(4, 3, &Operation::ALL)
                .expect("grid");
            let mut rng = SmallRng::seed_from_u64(seed + 100);
            let board = Board::from_grid_with_rng(grid.clone(), &mut rng);
            assert_eq!(sorted(grid.results()), sorted(board.layout().values()));
            for index in 0..grid.len() {
                let slot = board.layout().slot(index).expect("slot");
                assert_eq!(grid.cell(slot.origin).map(|c| c.result), Some(slot.value));
            }
        }
    }

    fn duplicate_result_grid() -> Grid {
        // 3+3 and 2×3 both produce 6.
        Grid::from_cells(
            1,
            3,
            vec![
                Cell::new(0, 0, 3, 3, Operation::Add).expect("cell"),
                Cell::new(0, 1, 2, 3, Operation::Multiply).expect("cell"),
                Cell::new(0, 2, 9, 4, Operation::Subtract).expect("cell"),
            ],
        )
        .expect("grid")
    }

    #[test]
    fn reverse_lookup_takes_first_match_while_origin_is_exact() {
        let board = Board::with_layout(duplicate_result_grid(), &[2, 1, 0]).expect("board");
        assert_eq!(board.result_card(0, 1), Some(6));

        let scanned = board.resolve_result_card(0, 1).expect("scan hit");
        assert_eq!((scanned.row, scanned.col), (0, 0));
        assert_eq!(scanned.operation, Operation::Add);

        let origin = board.result_origin(0, 1).expect("origin");
        assert_eq!(origin.operation, Operation::Multiply);
        assert_eq!(board.tint(&CardRef::result(0, 1)), Some(Operation::Multiply));
    }

    #[test]
    fn layout_rejects_non_permutations() {
        let grid = duplicate_result_grid();
        assert_eq!(
            Board::with_layout(grid.clone(), &[0, 0, 1]),
            Err(BoardError::NotAPermutation)
        );
        assert!(Board::with_layout(grid, &[0, 1]).is_err());
    }

    #[test]
    fn reveal_describes_both_card_kinds() {
        let board = Board::with_layout(duplicate_result_grid(), &[2, 1, 0]).expect("board");
        let op = board.reveal(&CardRef::operation(0, 1)).expect("op fact");
        assert_eq!(op.display_text, "2×3");
        assert_eq!(op.result, 6);
        assert!(op.is_operation);

        let result = board.reveal(&CardRef::result(0, 0)).expect("result fact");
        assert_eq!(result.display_text, "5");
        assert!(!result.is_operation);

        assert!(board.reveal(&CardRef::result(1, 0)).is_none());
    }

    #[test]
    fn card_ids_round_trip_through_text() {
        let card = CardRef::result(3, 2);
        assert_eq!(card.to_string(), "card-re-3-2");
        assert_eq!("card-op-0-1".parse::<CardRef>(), Ok(CardRef::operation(0, 1)));
        assert!("card-xx-0-1".parse::<CardRef>().is_err());
        assert!("card-op-0".parse::<CardRef>().is_err());
    }

    #[test]
    fn symbols_match_display_glyphs() {
        assert_eq!(Board::symbol_for(Operation::Add), "+");
        assert_eq!(Board::symbol_for(Operation::Subtract), "-");
        assert_eq!(Board::symbol_for(Operation::Multiply), "×");
        assert_eq!(Board::symbol_for(Operation::Divide), "÷");
    }

    #[test]
    fn printout_lists_each_row() {
        let board = Board::with_layout(duplicate_result_grid(), &[0, 1, 2]).expect("board");
        let printed = board.to_string();
        assert_eq!(
            printed,
            "  3 +   3 =   6\t  2 ×   3 =   6\t  9 -   4 =   5\n"
        );
    }
}
