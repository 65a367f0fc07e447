use std::fmt;
use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const ADD_OPERAND_MAX: i32 = 100;
const SUBTRACT_OPERAND_MAX: i32 = 200;
const MULTIPLY_OPERAND_MAX: i32 = 10;
const DIVISOR_MAX: i32 = 30;
const QUOTIENT_MAX: i32 = 10;
pub const MAX_CELLS: usize = 10_000;

/// 算式牌上的四则运算。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    /// 枚举顺序；余下的格子优先分给靠前的运算。
    pub const ALL: [Operation; 4] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Operation::Add => "+",
            Operation::Subtract => "-",
            Operation::Multiply => "×",
            Operation::Divide => "÷",
        }
    }

    /// 界面上该运算卡牌的颜色。
    pub fn color(self) -> &'static str {
        match self {
            Operation::Add => "#4A90E2",
            Operation::Subtract => "#7ED321",
            Operation::Multiply => "#F5A623",
            Operation::Divide => "#9013FE",
        }
    }

    /// 整数求值，除法只在整除时成功。
    pub fn apply(self, lhs: i32, rhs: i32) -> Option<i32> {
        match self {
            Operation::Add => lhs.checked_add(rhs),
            Operation::Subtract => lhs.checked_sub(rhs),
            Operation::Multiply => lhs.checked_mul(rhs),
            Operation::Divide => {
                if rhs == 0 || lhs % rhs != 0 {
                    None
                } else {
                    Some(lhs / rhs)
                }
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Divide => "divide",
        };
        f.write_str(name)
    }
}

impl FromStr for Operation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" | "addition" | "sum" | "+" => Ok(Operation::Add),
            "subtract" | "subtraction" | "sub" | "-" => Ok(Operation::Subtract),
            "multiply" | "multiplication" | "mul" | "*" | "x" | "×" => Ok(Operation::Multiply),
            "divide" | "division" | "div" | "/" | "÷" => Ok(Operation::Divide),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum GeneratorError {
    #[error(
        "board dimensions must be positive and at most {max} cells, got {rows}x{cols}",
        max = MAX_CELLS
    )]
    InvalidDimensions { rows: usize, cols: usize },
    #[error("{dividend} is not an exact multiple of {divisor}")]
    ImpossibleDivision { dividend: i32, divisor: i32 },
    #[error("cell ({row}, {col}) does not satisfy its operation")]
    InconsistentCell { row: usize, col: usize },
}

/// 一道算式及其结果。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub operand1: i32,
    pub operand2: i32,
    pub result: i32,
    pub operation: Operation,
}

impl Cell {
    pub fn new(
        row: usize,
        col: usize,
        operand1: i32,
        operand2: i32,
        operation: Operation,
    ) -> Option<Self> {
        let result = operation.apply(operand1, operand2)?;
        Some(Self {
            row,
            col,
            operand1,
            operand2,
            result,
            operation,
        })
    }

    /// 算式牌上显示的文字，如 `12+7`。
    pub fn display_text(&self) -> String {
        format!("{}{}{}", self.operand1, self.operation.symbol(), self.operand2)
    }

    pub fn is_consistent(&self) -> bool {
        let arithmetic = self.operation.apply(self.operand1, self.operand2) == Some(self.result);
        match self.operation {
            Operation::Subtract => arithmetic && self.operand1 > self.operand2,
            _ => arithmetic,
        }
    }
}

/// 按行存储的 `rows × cols` 格子矩阵。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// 由给定格子构建网格，格子须按行排列且算式成立。
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<Cell>) -> Result<Self, GeneratorError> {
        if cells.len() != cell_count(rows, cols)? {
            return Err(GeneratorError::InvalidDimensions { rows, cols });
        }
        for (index, cell) in cells.iter().enumerate() {
            if cell.row != index / cols || cell.col != index % cols || !cell.is_consistent() {
                return Err(GeneratorError::InconsistentCell {
                    row: index / cols,
                    col: index % cols,
                });
            }
        }
        Ok(Self { rows, cols, cells })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn index_of(&self, row: usize, col: usize) -> Option<usize> {
        if row < self.rows && col < self.cols {
            Some(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.index_of(row, col).and_then(|index| self.cells.get(index))
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn results(&self) -> impl Iterator<Item = i32> + '_ {
        self.cells.iter().map(|cell| cell.result)
    }

    pub fn count_operation(&self, operation: Operation) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.operation == operation)
            .count()
    }
}

/// 校验行列数并返回格子总数，乘积溢出或超过 [`MAX_CELLS`] 时报错。
pub fn cell_count(rows: usize, cols: usize) -> Result<usize, GeneratorError> {
    rows.checked_mul(cols)
        .filter(|total| (1..=MAX_CELLS).contains(total))
        .ok_or(GeneratorError::InvalidDimensions { rows, cols })
}

/// 规整运算集合：去重、恢复枚举顺序，空集合退回 `{Add}`。
pub fn normalize_operations(operations: &[Operation]) -> Vec<Operation> {
    let normalized: Vec<Operation> = Operation::ALL
        .iter()
        .copied()
        .filter(|operation| operations.contains(operation))
        .collect();
    if normalized.is_empty() {
        warn!("empty operation set requested, falling back to addition");
        return vec![Operation::Add];
    }
    normalized
}

/// 把 `total` 个格子均分给各运算，数量相差不超过一，
/// 前 `total % len` 个运算各多分一格。
pub fn distribute_operations(total: usize, operations: &[Operation]) -> Vec<Operation> {
    let operations = normalize_operations(operations);
    let base = total / operations.len();
    let remainder = total % operations.len();

    let mut labels = Vec::with_capacity(total);
    for (index, operation) in operations.iter().enumerate() {
        let count = if index < remainder { base + 1 } else { base };
        labels.extend(std::iter::repeat(*operation).take(count));
    }
    labels
}

pub struct PuzzleGenerator {
    rng: SmallRng,
}

impl PuzzleGenerator {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn generate(
        &mut self,
        rows: usize,
        cols: usize,
        operations: &[Operation],
    ) -> Result<Grid, GeneratorError> {
        let total = cell_count(rows, cols)?;
        let mut labels = distribute_operations(total, operations);
        labels.shuffle(&mut self.rng);

        let mut cells = Vec::with_capacity(labels.len());
        for (index, operation) in labels.into_iter().enumerate() {
            cells.push(self.generate_cell(index / cols, index % cols, operation)?);
        }

        debug!(rows, cols, cells = cells.len(), "puzzle grid generated");
        Ok(Grid { rows, cols, cells })
    }

    fn generate_cell(
        &mut self,
        row: usize,
        col: usize,
        operation: Operation,
    ) -> Result<Cell, GeneratorError> {
        let (operand1, operand2) = match operation {
            Operation::Add => (
                self.rng.gen_range(0..=ADD_OPERAND_MAX),
                self.rng.gen_range(0..=ADD_OPERAND_MAX),
            ),
            Operation::Subtract => loop {
                let minuend = self.rng.gen_range(0..=SUBTRACT_OPERAND_MAX);
                let subtrahend = self.rng.gen_range(0..=SUBTRACT_OPERAND_MAX);
                if minuend > subtrahend {
                    break (minuend, subtrahend);
                }
            },
            Operation::Multiply => (
                self.rng.gen_range(1..=MULTIPLY_OPERAND_MAX),
                self.rng.gen_range(1..=MULTIPLY_OPERAND_MAX),
            ),
            Operation::Divide => {
                let divisor = self.rng.gen_range(1..=DIVISOR_MAX);
                let quotient = self.rng.gen_range(1..=QUOTIENT_MAX);
                (divisor * quotient, divisor)
            }
        };

        Cell::new(row, col, operand1, operand2, operation).ok_or(
            GeneratorError::ImpossibleDivision {
                dividend: operand1,
                divisor: operand2,
            },
        )
    }
}

impl Default for PuzzleGenerator {
    fn default() -> Self {
        Self::new()
    }
}
