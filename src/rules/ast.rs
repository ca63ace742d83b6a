#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// True when any operand holds
    Or(Vec<Condition>),
    /// True when every operand holds
    And(Vec<Condition>),
    Equals {
        left: Operand,
        right: Operand,
        negated: bool,
    },
    Matches {
        subject: Operand,
        pattern: Pattern,
    },
    /// A lone operand: true when its value is non-empty
    Present(Operand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Variable(String),
    Literal(String),
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub source: String,
    pub flags: String,
}
